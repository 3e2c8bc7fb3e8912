//! Tests for identifiers and request options

use std::collections::BTreeSet;

use process_orchestrator::util::{BillId, ExecuteOptions, ExecutionMode, JobId, QuotationId};

#[test]
fn test_ids_are_unique() {
    let ids: BTreeSet<JobId> = (0..100).map(|_| JobId::new()).collect();
    assert_eq!(ids.len(), 100);
    assert_ne!(QuotationId::new(), QuotationId::default());
}

#[test]
fn test_id_parse_and_display() {
    let id = JobId::new();
    let parsed: JobId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
    assert_eq!(id.to_string(), id.as_uuid().to_string());
    assert!("not-a-uuid".parse::<BillId>().is_err());
}

#[test]
fn test_id_serializes_as_plain_string() {
    let id = QuotationId::new();
    let json = serde_json::to_value(id).unwrap();
    assert_eq!(json, serde_json::Value::String(id.to_string()));
}

#[test]
fn test_execution_mode_wire_format() {
    assert_eq!(serde_json::to_string(&ExecutionMode::Auto).unwrap(), "\"auto\"");
    let mode: ExecutionMode = serde_json::from_str("\"sync\"").unwrap();
    assert_eq!(mode, ExecutionMode::Sync);
    assert_eq!(ExecutionMode::default(), ExecutionMode::Async);
    assert_eq!(ExecutionMode::Async.to_string(), "async");
}

#[test]
fn test_execute_options_defaults() {
    let opts: ExecuteOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(opts, ExecuteOptions::asynchronous());

    let opts: ExecuteOptions =
        serde_json::from_str(r#"{ "mode": "sync", "timeout_secs": 3 }"#).unwrap();
    assert_eq!(opts, ExecuteOptions::synchronous(Some(3)));
}
