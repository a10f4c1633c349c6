//! Tests for configuration validation

use workstage::config::{DebounceConfig, TimeboundConfig, ToolkitConfig, WorkerPoolConfig};

#[test]
fn test_worker_pool_config_defaults() {
    let config = WorkerPoolConfig::default();
    assert!(config.worker_count >= 1);
    assert_eq!(config.max_queue_depth, None);
    assert_eq!(config.thread_name_prefix, "workstage-worker");
    assert!(config.validate().is_ok());
}

#[test]
fn test_worker_pool_config_builder() {
    let config = WorkerPoolConfig::new()
        .with_worker_count(3)
        .with_max_queue_depth(64)
        .with_thread_name_prefix("tiles")
        .with_thread_stack_size(4 * 1024 * 1024);
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.max_queue_depth, Some(64));
    assert_eq!(config.thread_name_prefix, "tiles");
    assert_eq!(config.thread_stack_size, Some(4 * 1024 * 1024));
    assert!(config.validate().is_ok());
}

#[test]
fn test_worker_pool_config_invalid() {
    assert!(WorkerPoolConfig::new().with_worker_count(0).validate().is_err());
    assert!(WorkerPoolConfig::new().with_max_queue_depth(0).validate().is_err());
    assert!(WorkerPoolConfig::new().with_thread_name_prefix("").validate().is_err());
}

#[test]
fn test_debounce_config_bounds() {
    let ok = DebounceConfig {
        min_delay_ms: 200,
        max_delay_ms: Some(500),
    };
    assert!(ok.validate().is_ok());

    let negative = DebounceConfig {
        min_delay_ms: -1,
        max_delay_ms: None,
    };
    assert!(negative.validate().is_err());

    let inverted = DebounceConfig {
        min_delay_ms: 500,
        max_delay_ms: Some(200),
    };
    assert!(inverted.validate().is_err());
}

#[test]
fn test_timebound_config_zero_invalid() {
    assert!(TimeboundConfig { time_limit_ms: 0 }.validate().is_err());
    assert!(TimeboundConfig { time_limit_ms: 36 }.validate().is_ok());
}

#[test]
fn test_toolkit_config_from_json() {
    let json = r#"
    {
        "pools": {
            "ingest": { "worker_count": 4, "max_queue_depth": 1000 },
            "render": { "worker_count": 2, "thread_name_prefix": "render" }
        },
        "debounce": { "min_delay_ms": 100, "max_delay_ms": 500 },
        "timebound": { "time_limit_ms": 36 }
    }
    "#;

    let config = ToolkitConfig::from_json_str(json).expect("valid config");
    assert_eq!(config.pools.len(), 2);
    assert_eq!(config.pools["ingest"].max_queue_depth, Some(1000));
    assert_eq!(config.pools["ingest"].thread_name_prefix, "workstage-worker");
    assert_eq!(config.pools["render"].thread_name_prefix, "render");
    assert_eq!(config.debounce.map(|d| d.max_delay_ms), Some(Some(500)));
    assert_eq!(config.timebound.map(|t| t.time_limit_ms), Some(36));
}

#[test]
fn test_toolkit_config_rejects_invalid_sections() {
    assert!(ToolkitConfig::from_json_str(r#"{ "pools": {} }"#).is_err());
    assert!(ToolkitConfig::from_json_str(r#"{ "pools": { "a": { "worker_count": 0 } } }"#).is_err());
    let err = ToolkitConfig::from_json_str(
        r#"{ "pools": { "a": { "worker_count": 1 } }, "debounce": { "min_delay_ms": -10 } }"#,
    )
    .unwrap_err();
    assert!(err.contains("debounce"));
    assert!(ToolkitConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}
