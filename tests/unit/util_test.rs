//! Tests for utility functions

use prometheus_weaver::util::{init_tracing, init_tracing_with_level, LOG_ENV};
use tracing::Level;

#[test]
fn test_log_env_name() {
    assert_eq!(LOG_ENV, "WEAVER_LOG");
}

#[test]
fn test_init_tracing_is_repeatable() {
    init_tracing();
    init_tracing();
    init_tracing_with_level(Level::DEBUG);
    tracing::info!("tracing initialized twice without panicking");
}
