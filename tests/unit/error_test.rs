//! Tests for error types and their messages

use prometheus_worker_pool::core::{CancelReason, LoadError, PoolError, TaskError};

#[test]
fn test_pool_error_display() {
    let err = PoolError::QueueFull { depth: 4, max_depth: 4 };
    assert_eq!(err.to_string(), "task queue is full (4/4)");

    assert_eq!(PoolError::PoolShutdown.to_string(), "pool has been shut down");
    assert!(PoolError::InvalidConfig("max_threads must be greater than 0".into())
        .to_string()
        .contains("max_threads"));
}

#[test]
fn test_load_error_converts_into_pool_error() {
    let err: PoolError = LoadError::MissingHandler("resize".into()).into();
    assert!(matches!(
        err,
        PoolError::ModuleLoad(LoadError::MissingHandler(ref name)) if name == "resize"
    ));
    assert_eq!(err.to_string(), "module load failed: module does not export handler `resize`");
}

#[test]
fn test_load_error_failed() {
    let err = LoadError::failed(std::io::Error::other("disk gone"));
    assert_eq!(err, LoadError::Failed("disk gone".into()));
}

#[test]
fn test_task_error_classification() {
    let cancelled = TaskError::Cancelled(CancelReason::DeadlineExceeded);
    assert!(cancelled.is_cancelled());
    assert!(!cancelled.is_worker_crash());
    assert_eq!(cancelled.to_string(), "task cancelled: deadline exceeded");

    let crashed = TaskError::WorkerCrashed {
        worker_id: 3,
        reason: "boom".into(),
    };
    assert!(crashed.is_worker_crash());
    assert_eq!(crashed.to_string(), "worker 3 crashed: boom");

    let failed = TaskError::Handler(anyhow::anyhow!("bad input"));
    assert_eq!(failed.handler_error().map(ToString::to_string).as_deref(), Some("bad input"));
    assert!(!failed.is_cancelled());

    let unloadable = TaskError::ModuleLoad(LoadError::failed("transient"));
    assert!(!unloadable.is_worker_crash());
    assert!(!unloadable.is_cancelled());
    assert_eq!(unloadable.to_string(), "no worker could load the module: transient");
}

#[test]
fn test_cancel_reason_serialization() {
    let json = serde_json::to_string(&CancelReason::DeadlineExceeded).unwrap();
    assert_eq!(json, "\"deadline_exceeded\"");
    let parsed: CancelReason = serde_json::from_str("\"shutdown\"").unwrap();
    assert_eq!(parsed, CancelReason::Shutdown);
}
