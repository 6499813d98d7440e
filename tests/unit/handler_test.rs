//! Tests for handler tables and the module contract

use async_trait::async_trait;
use prometheus_worker_pool::core::{
    handler_fn, Handler, HandlerTable, LoadError, PoolEvent, TaskContext,
};

struct Upper;

#[async_trait]
impl Handler<String, String> for Upper {
    async fn call(&self, payload: String, _ctx: TaskContext) -> anyhow::Result<String> {
        Ok(payload.to_uppercase())
    }
}

fn echo() -> impl Handler<String, String> {
    handler_fn(|payload: String, _ctx: TaskContext| async move { Ok(payload) })
}

#[test]
fn test_empty_table_has_no_entry_points() {
    let table: HandlerTable<String, String> = HandlerTable::new();
    assert_eq!(table.validate(None), Err(LoadError::NoEntryPoints));
}

#[test]
fn test_named_only_table_is_valid() {
    let table: HandlerTable<String, String> = HandlerTable::new().with_handler("upper", Upper);
    assert!(table.validate(None).is_ok());
    assert!(table.resolve(None, None).is_none());
    assert!(table.resolve(Some("upper"), None).is_some());
}

#[test]
fn test_required_default_must_be_exported() {
    let table = HandlerTable::single(echo()).with_handler("upper", Upper);
    assert!(table.validate(Some("upper")).is_ok());
    assert_eq!(
        table.validate(Some("lower")),
        Err(LoadError::MissingHandler("lower".into()))
    );
}

#[test]
fn test_resolution_order() {
    let table = HandlerTable::single(echo())
        .with_handler("upper", Upper)
        .with_handler("echo", echo());

    assert_eq!(table.names(), vec!["echo", "upper"]);
    assert!(table.contains("upper"));
    // An explicit name wins over the configured default.
    assert!(table.resolve(Some("upper"), Some("echo")).is_some());
    assert!(table.resolve(Some("missing"), Some("echo")).is_none());
    // Without a name the configured default is used, then the table default.
    assert!(table.resolve(None, Some("missing")).is_none());
    assert!(table.resolve(None, None).is_some());
}

#[test]
fn test_event_serialization() {
    let json = serde_json::to_value(PoolEvent::WorkerStarted { worker_id: 2 }).unwrap();
    assert_eq!(json["event"], "worker_started");
    assert_eq!(json["worker_id"], 2);

    let json = serde_json::to_value(PoolEvent::Saturated { depth: 3, max_depth: 3 }).unwrap();
    assert_eq!(json["event"], "saturated");
}
