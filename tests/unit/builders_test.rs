//! Tests for builder modules

use std::sync::Arc;

use prometheus_weaver::builders::WeaverBuilder;
use prometheus_weaver::config::WeaverConfig;
use prometheus_weaver::core::{WeaverError, WeaverObserver, WeaverState};

struct Quiet;

impl WeaverObserver for Quiet {}

#[test]
fn test_weaver_builder_defaults() {
    let weaver = WeaverBuilder::new().build().expect("build weaver");
    assert_eq!(
        weaver.maximum_number_of_threads(),
        WeaverConfig::default().max_threads
    );
    assert_eq!(weaver.thread_count(), 0);
    assert_eq!(weaver.state(), WeaverState::WorkingHard);
}

#[test]
fn test_weaver_builder_from_config() {
    let config = WeaverConfig::new()
        .with_max_threads(3)
        .with_thread_name_prefix("pool");
    let weaver = WeaverBuilder::from_config(config)
        .observer(Arc::new(Quiet))
        .build()
        .expect("build weaver");
    assert_eq!(weaver.maximum_number_of_threads(), 3);
    assert_eq!(weaver.config().thread_name_prefix, "pool");
}

#[test]
fn test_weaver_builder_rejects_invalid_config() {
    let result = WeaverBuilder::new().thread_stack_size(16).build();
    assert!(matches!(result, Err(WeaverError::InvalidConfig(_))));
}

#[test]
fn test_weaver_builder_debug() {
    let builder = WeaverBuilder::new().observer(Arc::new(Quiet));
    let rendered = format!("{builder:?}");
    assert!(rendered.contains("WeaverBuilder"));
    assert!(rendered.contains("observers: 1"));
}
