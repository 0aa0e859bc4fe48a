//! Telemetry helpers for structured logging and tracing.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "WEAVER_LOG";

/// Initialize tracing. Users can install their own subscriber; this helper
/// installs a default fmt subscriber if none is set, filtered by
/// `WEAVER_LOG`, then `RUST_LOG`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::from_default_env());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Debug-verbosity hook: install a fmt subscriber showing this crate's
/// events up to `level`. Does nothing if a subscriber is already set.
pub fn init_tracing_with_level(level: Level) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::new(format!("{}={level}", env!("CARGO_CRATE_NAME")));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
