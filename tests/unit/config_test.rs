//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use process_orchestrator::config::{
    JobSchedulerConfig, OrchestratorConfig, ResultStoreConfig, MAX_SYNC_TIMEOUT_SECS,
};

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = OrchestratorConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.scheduler.worker_count >= 1);
    assert_eq!(cfg.sync_timeout(), Duration::from_secs(120));
    assert_eq!(cfg.quotation_ttl(), Duration::from_secs(3600));
    assert_eq!(cfg.progress_throttle(), Duration::from_millis(200));
    assert_eq!(cfg.result_store, ResultStoreConfig::InMemory);
}

#[test]
fn test_scheduler_config_validation() {
    assert!(JobSchedulerConfig::new().validate().is_ok());
    assert!(JobSchedulerConfig::new().with_worker_count(0).validate().is_err());
    assert!(JobSchedulerConfig::new().with_max_queue_depth(0).validate().is_err());
    assert!(JobSchedulerConfig::new()
        .with_thread_stack_size(1024)
        .validate()
        .is_err());
}

#[test]
fn test_orchestrator_config_invalid_values() {
    let zero_timeout = OrchestratorConfig::new().with_default_sync_timeout_secs(0);
    assert!(zero_timeout.validate().unwrap_err().contains("default_sync_timeout_secs"));

    let longest = OrchestratorConfig::new().with_default_sync_timeout_secs(MAX_SYNC_TIMEOUT_SECS);
    assert!(longest.validate().is_ok());
    let endless = OrchestratorConfig::new().with_default_sync_timeout_secs(u64::MAX);
    assert!(endless.validate().unwrap_err().contains("must not exceed"));

    let zero_ttl = OrchestratorConfig::new().with_quotation_ttl_secs(0);
    assert!(zero_ttl.validate().unwrap_err().contains("quotation_ttl_secs"));

    let bad_scheduler = OrchestratorConfig::new()
        .with_scheduler(JobSchedulerConfig::new().with_worker_count(0));
    assert!(bad_scheduler.validate().unwrap_err().starts_with("scheduler invalid"));

    let empty_dir = OrchestratorConfig::new().with_result_store(ResultStoreConfig::File {
        dir: PathBuf::new(),
    });
    assert!(empty_dir.validate().is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = OrchestratorConfig::from_json_str(
        r#"{
            "scheduler": { "worker_count": 3 },
            "quotation_ttl_secs": 60,
            "result_store": { "backend": "file", "dir": "/var/lib/jobs" }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.scheduler.worker_count, 3);
    assert_eq!(cfg.scheduler.max_queue_depth, JobSchedulerConfig::default().max_queue_depth);
    assert_eq!(cfg.quotation_ttl_secs, 60);
    assert_eq!(cfg.default_sync_timeout_secs, 120);
    assert_eq!(
        cfg.result_store,
        ResultStoreConfig::File {
            dir: PathBuf::from("/var/lib/jobs")
        }
    );
}

#[test]
fn test_from_json_str_rejects_bad_input() {
    let err = OrchestratorConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));

    let err = OrchestratorConfig::from_json_str(r#"{ "quotation_ttl_secs": 0 }"#).unwrap_err();
    assert!(err.contains("quotation_ttl_secs"));
}

#[test]
fn test_from_lookup_reads_prefixed_variables() {
    let cfg = OrchestratorConfig::from_lookup(lookup_from(&[
        ("ORCHESTRATOR_WORKER_COUNT", "2"),
        ("ORCHESTRATOR_MAX_QUEUE_DEPTH", " 16 "),
        ("ORCHESTRATOR_SYNC_TIMEOUT_SECS", "5"),
        ("ORCHESTRATOR_PROGRESS_THROTTLE_MS", "0"),
        ("ORCHESTRATOR_QUOTATION_TTL_SECS", "90"),
        ("ORCHESTRATOR_RESULT_DIR", "/tmp/orchestrator"),
        ("WORKER_COUNT", "99"),
    ]))
    .unwrap();
    assert_eq!(cfg.scheduler.worker_count, 2);
    assert_eq!(cfg.scheduler.max_queue_depth, 16);
    assert_eq!(cfg.default_sync_timeout_secs, 5);
    assert_eq!(cfg.progress_throttle_ms, 0);
    assert_eq!(cfg.quotation_ttl_secs, 90);
    assert_eq!(
        cfg.result_store,
        ResultStoreConfig::File {
            dir: PathBuf::from("/tmp/orchestrator")
        }
    );
}

#[test]
fn test_from_lookup_empty_keeps_defaults() {
    let cfg = OrchestratorConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, OrchestratorConfig::default());
}

#[test]
fn test_from_lookup_errors() {
    let err = OrchestratorConfig::from_lookup(lookup_from(&[(
        "ORCHESTRATOR_WORKER_COUNT",
        "many",
    )]))
    .unwrap_err();
    assert!(err.to_string().contains("ORCHESTRATOR_WORKER_COUNT"));

    let err = OrchestratorConfig::from_lookup(lookup_from(&[(
        "ORCHESTRATOR_SYNC_TIMEOUT_SECS",
        "0",
    )]))
    .unwrap_err();
    assert!(err.to_string().contains("default_sync_timeout_secs"));
}
