//! Tests for configuration validation

use prometheus_weaver::config::{WeaverConfig, ENV_MAX_THREADS, ENV_THREAD_STACK_SIZE};

#[test]
fn test_weaver_config_validation() {
    let valid = WeaverConfig::new()
        .with_max_threads(8)
        .with_thread_stack_size(256 * 1024)
        .with_thread_name_prefix("io");
    assert!(valid.validate().is_ok());
}

#[test]
fn test_weaver_config_invalid_max_threads() {
    let invalid = WeaverConfig::new().with_max_threads(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_weaver_config_invalid_stack_size() {
    let invalid = WeaverConfig::new().with_thread_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_weaver_config_invalid_prefix() {
    let invalid = WeaverConfig::new().with_thread_name_prefix("  ");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_weaver_config_from_json() {
    let json = r#"{ "max_threads": 3, "thread_name_prefix": "render" }"#;
    let cfg = WeaverConfig::from_json_str(json).expect("valid json config");
    assert_eq!(cfg.max_threads, 3);
    assert_eq!(cfg.thread_name_prefix, "render");
    assert_eq!(cfg.thread_stack_size, None);
}

#[test]
fn test_weaver_config_from_json_invalid() {
    assert!(WeaverConfig::from_json_str(r#"{ "max_threads": 0 }"#).is_err());
    assert!(WeaverConfig::from_json_str("not json").is_err());
}

#[test]
fn test_weaver_config_from_lookup() {
    let cfg = WeaverConfig::from_lookup(|key| match key {
        k if k == ENV_MAX_THREADS => Some("6".to_string()),
        k if k == ENV_THREAD_STACK_SIZE => Some(" 131072 ".to_string()),
        _ => None,
    })
    .expect("valid lookup config");
    assert_eq!(cfg.max_threads, 6);
    assert_eq!(cfg.thread_stack_size, Some(131_072));
}

#[test]
fn test_weaver_config_serde_roundtrip_keeps_defaults() {
    let cfg = WeaverConfig::default();
    let json = serde_json::to_string(&cfg).expect("serialize");
    let back: WeaverConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.max_threads, cfg.max_threads);
    assert_eq!(back.thread_name_prefix, cfg.thread_name_prefix);
}
