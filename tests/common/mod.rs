//! Shared fixture processes and helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use process_orchestrator::config::{JobSchedulerConfig, OrchestratorConfig};
use process_orchestrator::core::{
    ExecutionCoordinator, JobSnapshot, JobStatus, PreparedTask, ProcessCatalog, ProcessDescriptor,
    ProgressSink, QuoteEstimate, ResultStore, TaskError,
};
use process_orchestrator::infra::{InMemoryProcessCatalog, InMemoryResultStore};
use process_orchestrator::runtime::TokioSpawner;
use process_orchestrator::util::{init_tracing, ExecutionMode, JobId};
use serde_json::{json, Value};
use tokio::sync::Notify;

// ============================================================================
// FIXTURE PROCESSES
// ============================================================================

/// Echoes its params back, reporting a partial result halfway.
pub struct EchoProcess;

impl ProcessDescriptor for EchoProcess {
    fn process_id(&self) -> &str {
        "echo"
    }

    fn quote(&self, params: &Value) -> Result<QuoteEstimate, TaskError> {
        if params.get("reject").is_some() {
            return Err(TaskError::InvalidInput("cannot quote rejected params".into()));
        }
        Ok(QuoteEstimate {
            amount: 2.5,
            estimated_duration_secs: Some(1),
            ..QuoteEstimate::default()
        })
    }

    fn create_task(&self, params: Value, progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        Ok(PreparedTask::from_fn(move |_cancel| async move {
            progress.progress_with_partial(50, json!({ "half": true }));
            Ok(json!({ "echo": params }))
        }))
    }
}

/// Sleeps `params.ms` milliseconds in small steps, honoring cancellation.
pub struct SleepProcess;

impl ProcessDescriptor for SleepProcess {
    fn process_id(&self) -> &str {
        "sleep"
    }

    fn create_task(&self, params: Value, progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        let total = params
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| TaskError::InvalidInput("missing ms".into()))?;
        Ok(PreparedTask::from_fn(move |cancel| async move {
            let started = Instant::now();
            let total = Duration::from_millis(total);
            while started.elapsed() < total {
                if cancel.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                let pct = started.elapsed().as_millis() * 100 / total.as_millis().max(1);
                progress.progress(u8::try_from(pct.min(99)).unwrap_or(99));
            }
            Ok(json!({ "slept_ms": total.as_millis() as u64 }))
        }))
    }
}

/// Blocks until the gate opens. When `honor_cancel` is false the task keeps
/// going after a dismissal and still reports progress and completion.
pub struct GatedProcess {
    pub id: &'static str,
    pub gate: Arc<Notify>,
    pub honor_cancel: bool,
}

impl GatedProcess {
    pub fn new(id: &'static str, honor_cancel: bool) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Self {
                id,
                gate: Arc::clone(&gate),
                honor_cancel,
            },
            gate,
        )
    }
}

impl ProcessDescriptor for GatedProcess {
    fn process_id(&self) -> &str {
        self.id
    }

    fn create_task(&self, _params: Value, progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        let gate = Arc::clone(&self.gate);
        let honor_cancel = self.honor_cancel;
        Ok(PreparedTask::from_fn(move |cancel| async move {
            progress.progress(10);
            if honor_cancel {
                tokio::select! {
                    () = gate.notified() => {}
                    () = cancel.cancelled() => return Err(TaskError::Cancelled),
                }
            } else {
                gate.notified().await;
            }
            progress.progress(90);
            Ok(json!("opened"))
        }))
    }
}

/// Reports 10 and then 40 back to back, then blocks until the gate opens.
pub struct SteppingProcess {
    pub gate: Arc<Notify>,
}

impl SteppingProcess {
    pub fn new() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Self {
                gate: Arc::clone(&gate),
            },
            gate,
        )
    }
}

impl ProcessDescriptor for SteppingProcess {
    fn process_id(&self) -> &str {
        "stepping"
    }

    fn create_task(&self, _params: Value, progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        let gate = Arc::clone(&self.gate);
        Ok(PreparedTask::from_fn(move |_cancel| async move {
            progress.progress(10);
            progress.progress(40);
            gate.notified().await;
            Ok(json!("stepped"))
        }))
    }
}

/// Fails with a two-level cause chain.
pub struct FailingProcess;

impl ProcessDescriptor for FailingProcess {
    fn process_id(&self) -> &str {
        "fail"
    }

    fn create_task(&self, _params: Value, _progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        Ok(PreparedTask::from_fn(|_cancel| async {
            let err: Result<Value, anyhow::Error> =
                Err(anyhow::anyhow!("disk full")).context("writing output");
            Ok(err?)
        }))
    }
}

/// Panics inside the task.
pub struct PanickingProcess;

impl ProcessDescriptor for PanickingProcess {
    fn process_id(&self) -> &str {
        "panic"
    }

    fn create_task(&self, _params: Value, _progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        Ok(PreparedTask::from_fn(|_cancel| async { explode() }))
    }
}

fn explode() -> Result<Value, TaskError> {
    panic!("process blew up")
}

/// Rejects every request at task construction.
pub struct BrokenProcess;

impl ProcessDescriptor for BrokenProcess {
    fn process_id(&self) -> &str {
        "broken"
    }

    fn create_task(&self, _params: Value, _progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        Err(TaskError::InvalidInput("bad params".into()))
    }
}

/// Only runs synchronously; `Auto` resolves to `Sync`.
pub struct SyncOnlyProcess;

impl ProcessDescriptor for SyncOnlyProcess {
    fn process_id(&self) -> &str {
        "sync-only"
    }

    fn supports_mode(&self, mode: ExecutionMode) -> bool {
        mode == ExecutionMode::Sync
    }

    fn preferred_mode(&self) -> ExecutionMode {
        ExecutionMode::Sync
    }

    fn create_task(&self, params: Value, _progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        Ok(PreparedTask::from_fn(move |_cancel| async move { Ok(params) })
            .with_extractor(|raw: Value| Ok::<_, TaskError>(json!({ "extracted": raw }))))
    }
}

/// Pauses and resumes once before finishing.
pub struct PausingProcess;

impl ProcessDescriptor for PausingProcess {
    fn process_id(&self) -> &str {
        "pausing"
    }

    fn create_task(&self, _params: Value, progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        Ok(PreparedTask::from_fn(move |_cancel| async move {
            progress.progress(40);
            progress.paused();
            tokio::time::sleep(Duration::from_millis(5)).await;
            progress.resumed();
            progress.progress(10);
            Ok(json!("resumed"))
        }))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub struct Harness {
    pub coordinator: ExecutionCoordinator,
    pub store: Arc<InMemoryResultStore>,
    pub catalog: Arc<InMemoryProcessCatalog>,
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig::new()
        .with_scheduler(
            JobSchedulerConfig::new()
                .with_worker_count(4)
                .with_max_queue_depth(64),
        )
        .with_default_sync_timeout_secs(10)
        .with_progress_throttle_ms(0)
}

/// Catalog with every fixture except the gated ones.
pub fn fixture_catalog() -> InMemoryProcessCatalog {
    InMemoryProcessCatalog::new()
        .with(EchoProcess)
        .with(SleepProcess)
        .with(FailingProcess)
        .with(PanickingProcess)
        .with(BrokenProcess)
        .with(SyncOnlyProcess)
        .with(PausingProcess)
}

pub fn harness_with(catalog: InMemoryProcessCatalog, config: OrchestratorConfig) -> Harness {
    init_tracing();
    let catalog = Arc::new(catalog);
    let store = Arc::new(InMemoryResultStore::new());
    let shared_catalog: Arc<dyn ProcessCatalog> = catalog.clone();
    let shared_store: Arc<dyn ResultStore> = store.clone();
    let coordinator = ExecutionCoordinator::new(
        config,
        shared_catalog,
        shared_store,
        TokioSpawner::try_current().unwrap(),
    )
    .unwrap();
    Harness {
        coordinator,
        store,
        catalog,
    }
}

pub fn harness() -> Harness {
    harness_with(fixture_catalog(), test_config())
}

/// Poll until the job reaches a terminal status.
pub async fn wait_terminal(coordinator: &ExecutionCoordinator, job_id: JobId) -> JobSnapshot {
    wait_for(coordinator, job_id, |s| s.status.is_terminal()).await
}

/// Poll until `pred` holds for the job's snapshot, failing after 5 seconds.
pub async fn wait_for<F>(coordinator: &ExecutionCoordinator, job_id: JobId, pred: F) -> JobSnapshot
where
    F: Fn(&JobSnapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = coordinator.get_status(job_id).unwrap();
        if pred(&snapshot) {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "job {job_id} stuck in {:?}",
            snapshot.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn is_running(snapshot: &JobSnapshot) -> bool {
    snapshot.status == JobStatus::Running
}

/// Poll until the store's latest document for the job satisfies `pred`.
pub async fn wait_persisted<F>(store: &InMemoryResultStore, job_id: JobId, pred: F) -> JobSnapshot
where
    F: Fn(&JobSnapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(snapshot) = store.latest(job_id).filter(|s| pred(s)) {
            return snapshot;
        }
        assert!(Instant::now() < deadline, "job {job_id} never persisted");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
