//! Tests for configuration parsing and validation

use std::time::Duration;

use prometheus_worker_pool::config::WorkerPoolConfig;

#[test]
fn test_default_config_is_valid() {
    let cfg = WorkerPoolConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.min_threads >= 1);
    assert!(cfg.max_threads >= cfg.min_threads);
    assert_eq!(cfg.max_queue_depth, cfg.max_threads * cfg.max_threads);
    assert_eq!(cfg.thread_name_prefix, "pool-worker");
}

#[test]
fn test_builder_setters() {
    let cfg = WorkerPoolConfig::new()
        .with_fixed_threads(3)
        .with_idle_timeout(Duration::from_millis(250))
        .with_max_queue_depth(0)
        .with_default_handler("resize")
        .with_shutdown_timeout(Duration::from_secs(1));

    assert_eq!((cfg.min_threads, cfg.max_threads), (3, 3));
    assert_eq!(cfg.idle_timeout(), Duration::from_millis(250));
    assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(1));
    assert_eq!(cfg.default_handler.as_deref(), Some("resize"));
    // A zero-depth queue only disables buffering.
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_config_invalid_max_threads() {
    let cfg = WorkerPoolConfig::new().with_min_threads(0).with_max_threads(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_min_above_max() {
    let err = WorkerPoolConfig::new()
        .with_min_threads(4)
        .with_max_threads(2)
        .validate()
        .unwrap_err();
    assert!(err.contains("min_threads"));
}

#[test]
fn test_config_invalid_per_worker_limit() {
    let cfg = WorkerPoolConfig::new().with_max_concurrent_tasks_per_worker(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_invalid_thread_name() {
    let cfg = WorkerPoolConfig::new().with_thread_name_prefix("bad\0name");
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_from_json_partial() {
    let cfg = WorkerPoolConfig::from_json_str(
        r#"{"min_threads": 1, "max_threads": 2, "idle_timeout_ms": 500,
            "default_handler": "echo"}"#,
    )
    .unwrap();
    assert_eq!(cfg.min_threads, 1);
    assert_eq!(cfg.max_threads, 2);
    assert_eq!(cfg.idle_timeout(), Duration::from_millis(500));
    assert_eq!(cfg.default_handler.as_deref(), Some("echo"));
    // Unspecified fields keep their defaults.
    assert_eq!(
        cfg.max_concurrent_tasks_per_worker,
        WorkerPoolConfig::default().max_concurrent_tasks_per_worker
    );
}

#[test]
fn test_config_from_json_rejects_invalid() {
    let err =
        WorkerPoolConfig::from_json_str(r#"{"min_threads": 5, "max_threads": 1}"#).unwrap_err();
    assert!(err.contains("min_threads"));

    let err = WorkerPoolConfig::from_json_str("{not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_config_serialization() {
    let cfg = WorkerPoolConfig::new().with_fixed_threads(2).with_max_queue_depth(8);
    let json = serde_json::to_string(&cfg).unwrap();
    let parsed = WorkerPoolConfig::from_json_str(&json).unwrap();
    assert_eq!(parsed.max_queue_depth, 8);
    assert_eq!(parsed.thread_stack_size, cfg.thread_stack_size);
}
