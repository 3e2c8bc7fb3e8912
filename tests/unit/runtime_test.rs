//! Tests for runtime adapters and API models

use process_orchestrator::core::OrchestratorError;
use process_orchestrator::runtime::{ErrorResponse, ExecuteRequest, TokioSpawner};
use process_orchestrator::util::{ExecuteOptions, ExecutionMode};
use serde_json::json;

#[test]
fn test_spawner_from_explicit_handle() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let spawner = TokioSpawner::new(rt.handle().clone());
    let handle = spawner.spawn(async { "spawned" });
    assert_eq!(rt.block_on(handle).unwrap(), "spawned");
}

#[tokio::test]
async fn test_spawner_handle_spawns_on_current_runtime() {
    let spawner = TokioSpawner::try_current().unwrap();
    let value = spawner.handle().spawn(async { 21 * 2 }).await.unwrap();
    assert_eq!(value, 42);
}

#[test]
fn test_execute_request_defaults() {
    let req: ExecuteRequest = serde_json::from_value(json!({ "process_id": "echo" })).unwrap();
    assert_eq!(req.params, json!(null));
    assert_eq!(req.options, ExecuteOptions::default());

    let req: ExecuteRequest = serde_json::from_value(json!({
        "process_id": "echo",
        "params": { "n": 1 },
        "options": { "mode": "auto" }
    }))
    .unwrap();
    assert_eq!(req.options.mode, ExecutionMode::Auto);
    assert_eq!(req.options.timeout_secs, None);
}

#[test]
fn test_error_response_carries_code() {
    let body = ErrorResponse::from(OrchestratorError::QueueFull);
    assert_eq!(body.code, "ServerBusy");
    assert_eq!(body.message, "scheduler queue is full");

    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(
        json,
        json!({ "code": "ServerBusy", "message": "scheduler queue is full" })
    );
}
