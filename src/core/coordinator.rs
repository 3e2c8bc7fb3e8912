//! Top-level entry point: validates requests, resolves descriptors, drives the
//! scheduler and exposes status, result, dismissal, quotation and billing
//! operations.
//!
//! # Flow
//!
//! ```text
//! submit ──► catalog.resolve ──► JobRegistry (ACCEPTED) ──► create_task
//!                                                              │
//!            JobEventWriter ◄── ProgressSink ◄── runner ◄── JobScheduler
//!                 │
//!                 └──► JobRegistry / QuotationRegistry / ResultStore
//! ```
//!
//! The job id is allocated and registered before the task is built, so a
//! construction failure is still recorded as a `FAILED` job.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{OrchestratorConfig, MAX_SYNC_TIMEOUT_SECS};
use crate::core::error::OrchestratorError;
use crate::core::event_writer::JobEventWriter;
use crate::core::events::ProgressSink;
use crate::core::job_registry::{JobRegistry, JobSnapshot, CANCELLED_MESSAGE};
use crate::core::process::{panic_message, PreparedTask, ProcessCatalog, TaskError};
use crate::core::quotation_registry::{Bill, Quotation, QuotationRegistry};
use crate::core::scheduler::{
    CancelHandle, JobFuture, JobOutcome, JobScheduler, SchedulerStats, Work,
};
use crate::core::status::JobStatus;
use crate::core::store::{OrderedStore, ResultStore};
use crate::runtime::TokioSpawner;
use crate::util::{BillId, ExecuteOptions, ExecutionMode, JobId, QuotationId};

/// Result of an execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecuteOutcome {
    /// Asynchronous execution accepted; poll the job for status.
    Accepted {
        /// Job identifier.
        job_id: JobId,
    },
    /// Synchronous execution finished.
    Completed {
        /// Job identifier.
        job_id: JobId,
        /// Final result.
        output: Value,
    },
}

impl ExecuteOutcome {
    /// Job the request created.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Accepted { job_id } | Self::Completed { job_id, .. } => *job_id,
        }
    }
}

/// Process-execution orchestrator.
pub struct ExecutionCoordinator {
    config: OrchestratorConfig,
    catalog: Arc<dyn ProcessCatalog>,
    scheduler: Arc<JobScheduler>,
    jobs: Arc<JobRegistry>,
    quotations: Arc<QuotationRegistry>,
    store: Arc<OrderedStore>,
    spawner: TokioSpawner,
}

impl ExecutionCoordinator {
    /// Create a coordinator with its own scheduler and registries.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Validation`] for an invalid configuration,
    /// [`OrchestratorError::Internal`] if the worker pool cannot start.
    pub fn new(
        config: OrchestratorConfig,
        catalog: Arc<dyn ProcessCatalog>,
        store: Arc<dyn ResultStore>,
        spawner: TokioSpawner,
    ) -> Result<Self, OrchestratorError> {
        config.validate().map_err(OrchestratorError::Validation)?;
        let scheduler = Arc::new(JobScheduler::new(config.scheduler.clone())?);
        let quotations = Arc::new(QuotationRegistry::new(&spawner));
        info!(
            workers = scheduler.worker_count(),
            sync_timeout_secs = config.default_sync_timeout_secs,
            quotation_ttl_secs = config.quotation_ttl_secs,
            "execution coordinator ready"
        );
        Ok(Self {
            config,
            catalog,
            scheduler,
            jobs: Arc::new(JobRegistry::new()),
            quotations,
            store: Arc::new(OrderedStore::new(store)),
            spawner,
        })
    }

    /// Execute a process.
    ///
    /// Asynchronous requests return [`ExecuteOutcome::Accepted`] as soon as the
    /// job is queued. Synchronous requests wait for the output up to
    /// `options.timeout_secs` (or the configured default); on timeout the job
    /// is cancelled and the caller gets [`OrchestratorError::Timeout`]
    /// without waiting further. A job dismissed while the caller waits
    /// answers with the cancellation report, never with its output.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::Validation`] for a blank process id or a timeout
    ///   outside `1..=MAX_SYNC_TIMEOUT_SECS`
    /// - [`OrchestratorError::ProcessNotFound`] / [`OrchestratorError::Unsupported`]
    /// - [`OrchestratorError::QueueFull`] / [`OrchestratorError::Shutdown`]
    /// - [`OrchestratorError::Execution`] / [`OrchestratorError::Timeout`] (sync only)
    pub async fn submit(
        &self,
        process_id: &str,
        params: Value,
        options: ExecuteOptions,
    ) -> Result<ExecuteOutcome, OrchestratorError> {
        self.launch(process_id, params, options, None).await
    }

    /// Validate params with the descriptor and create a quotation that
    /// remembers them together with `options`.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::ProcessNotFound`] for unknown processes,
    /// [`OrchestratorError::Validation`] when the descriptor rejects the params.
    pub fn quote(
        &self,
        process_id: &str,
        params: Value,
        options: ExecuteOptions,
    ) -> Result<Quotation, OrchestratorError> {
        validate_request(process_id, options)?;
        let descriptor = self.catalog.resolve(process_id)?;
        let estimate = descriptor
            .quote(&params)
            .map_err(|e| OrchestratorError::Validation(e.report()))?;
        self.quotations.create(
            process_id,
            params,
            options,
            estimate,
            self.config.quotation_ttl(),
        )
    }

    /// An active quotation.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::QuotationNotFound`] or [`OrchestratorError::Expired`].
    pub fn get_quotation(&self, quotation_id: QuotationId) -> Result<Quotation, OrchestratorError> {
        self.quotations.get(quotation_id)
    }

    /// Execute a quotation with its retained params and options. Works after
    /// expiry too; the job is billed against the quotation when it succeeds.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::QuotationNotFound`], otherwise as [`ExecutionCoordinator::submit`].
    pub async fn execute_quotation(
        &self,
        quotation_id: QuotationId,
    ) -> Result<ExecuteOutcome, OrchestratorError> {
        let (process_id, params, options) = self.quotations.get_params_for_execute(quotation_id)?;
        debug!(quotation_id = %quotation_id, process_id = %process_id, "executing quotation");
        self.launch(&process_id, params, options, Some(quotation_id))
            .await
    }

    /// A bill by id.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::BillNotFound`].
    pub fn get_bill(&self, bill_id: BillId) -> Result<Bill, OrchestratorError> {
        self.quotations.get_bill(bill_id)
    }

    /// The bill issued for a job.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::BillNotFound`].
    pub fn get_bill_for_job(&self, job_id: JobId) -> Result<Bill, OrchestratorError> {
        self.quotations.get_bill_for_job(job_id)
    }

    /// Latest status document.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`].
    pub fn get_status(&self, job_id: JobId) -> Result<JobSnapshot, OrchestratorError> {
        self.jobs.get_status(job_id)
    }

    /// Final result of a succeeded job.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`], [`OrchestratorError::NotReady`], or
    /// [`OrchestratorError::Execution`] with the report of a failed job.
    pub fn get_result(&self, job_id: JobId) -> Result<Value, OrchestratorError> {
        self.jobs.get_result(job_id)
    }

    /// Latest intermediate result.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`].
    pub fn get_partial_result(&self, job_id: JobId) -> Result<Option<Value>, OrchestratorError> {
        self.jobs.get_partial_result(job_id)
    }

    /// Cancel a job. Later events from the still-running task are discarded.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`] or [`OrchestratorError::NotDismissable`].
    pub async fn dismiss(&self, job_id: JobId) -> Result<JobSnapshot, OrchestratorError> {
        let snapshot = self.jobs.dismiss(job_id)?;
        self.store.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// Jobs of a process.
    #[must_use]
    pub fn list_jobs(&self, process_id: &str) -> HashSet<JobId> {
        self.jobs.list_jobs(process_id)
    }

    /// Process that owns a job.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`].
    pub fn owning_process(&self, job_id: JobId) -> Result<String, OrchestratorError> {
        self.jobs.owning_process(job_id)
    }

    /// Active quotations of a process.
    #[must_use]
    pub fn list_quotations(&self, process_id: &str) -> Vec<Quotation> {
        self.quotations.list_active(process_id)
    }

    /// Drop finished jobs older than `max_age`.
    pub fn prune_finished_jobs(&self, max_age: Duration) -> usize {
        let pruned = self.jobs.prune_finished(max_age);
        if pruned > 0 {
            self.store
                .retain(|job_id| self.jobs.get_status(job_id).is_ok());
        }
        pruned
    }

    /// Scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Whether the worker pool still accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.scheduler.is_shut_down()
    }

    /// Stop the worker pool and the expiration loop. Queued jobs that never
    /// started end up `FAILED`.
    ///
    /// Blocks the calling thread while the workers drain, up to two seconds
    /// per worker. From async code use [`ExecutionCoordinator::shutdown_async`].
    pub fn shutdown(&self) {
        info!("shutting down execution coordinator");
        self.scheduler.shutdown();
        self.quotations.shutdown();
    }

    /// [`ExecutionCoordinator::shutdown`] with the worker joins moved to the
    /// blocking pool, so no runtime thread is held while workers drain.
    pub async fn shutdown_async(&self) {
        info!("shutting down execution coordinator");
        self.quotations.shutdown();
        let scheduler = Arc::clone(&self.scheduler);
        if let Err(e) = self
            .spawner
            .handle()
            .spawn_blocking(move || scheduler.shutdown())
            .await
        {
            warn!(error = %e, "scheduler shutdown task failed");
        }
    }

    async fn launch(
        &self,
        process_id: &str,
        params: Value,
        options: ExecuteOptions,
        quotation_id: Option<QuotationId>,
    ) -> Result<ExecuteOutcome, OrchestratorError> {
        validate_request(process_id, options)?;
        let descriptor = self.catalog.resolve(process_id)?;
        let mode = match options.mode {
            ExecutionMode::Auto => match descriptor.preferred_mode() {
                ExecutionMode::Auto => ExecutionMode::Async,
                preferred => preferred,
            },
            requested => requested,
        };
        if !descriptor.supports_mode(mode) {
            return Err(OrchestratorError::Unsupported {
                process_id: process_id.to_string(),
                mode,
            });
        }
        let timeout = options
            .timeout_secs
            .map_or_else(|| self.config.sync_timeout(), Duration::from_secs);

        let job_id = JobId::new();
        let token = CancellationToken::new();
        let cancel = CancelHandle::new(token.clone());
        let (sink, rx) = ProgressSink::channel(job_id);

        self.jobs
            .add_job(process_id, job_id, JobStatus::Accepted, Some(cancel.clone()))?;
        if let Some(quotation_id) = quotation_id {
            self.jobs.attach_quotation(job_id, quotation_id)?;
        }
        info!(job_id = %job_id, process_id, mode = %mode, "job accepted");
        if let Ok(snapshot) = self.jobs.get_status(job_id) {
            self.store.persist(&snapshot).await;
        }

        let prepared = match descriptor.create_task(params, sink.clone()) {
            Ok(prepared) => prepared,
            Err(e) => {
                let report = e.report();
                warn!(job_id = %job_id, error = %report, "task construction failed");
                self.record_failure(job_id, report.clone()).await;
                return match mode {
                    ExecutionMode::Sync => Err(OrchestratorError::Execution(report)),
                    _ => Ok(ExecuteOutcome::Accepted { job_id }),
                };
            }
        };

        let writer = JobEventWriter {
            job_id,
            process_id: process_id.to_string(),
            quotation_id,
            cancel,
            jobs: Arc::clone(&self.jobs),
            quotations: Arc::clone(&self.quotations),
            store: Arc::clone(&self.store),
            throttle: self.config.progress_throttle(),
        };
        let work: Work =
            Box::new(move |token| -> JobFuture { Box::pin(run_job(prepared, sink, token)) });
        // The writer starts only after the work is queued, so a rejected job
        // keeps its rejection report.
        let handle = match self.scheduler.submit_with_token(job_id, token, work) {
            Ok(handle) => handle,
            Err(e) => {
                drop(rx);
                self.record_failure(job_id, e.to_string()).await;
                return Err(e);
            }
        };
        let writer = self.spawner.spawn(writer.run(rx));

        if mode != ExecutionMode::Sync {
            return Ok(ExecuteOutcome::Accepted { job_id });
        }

        let deadline = tokio::time::Instant::now() + timeout;
        match handle.get_async(timeout).await {
            Err(err @ OrchestratorError::Timeout { .. }) => {
                handle.cancel();
                warn!(
                    job_id = %job_id,
                    timeout_secs = timeout.as_secs(),
                    "synchronous wait timed out, job cancelled"
                );
                Err(err)
            }
            outcome => {
                // Let the writer record the terminal state before answering.
                let _ = tokio::time::timeout_at(deadline, writer).await;
                let output = outcome?;
                if self.jobs.get_status(job_id).is_ok_and(|snap| snap.dismissed) {
                    debug!(job_id = %job_id, "output discarded, job was dismissed");
                    return Err(OrchestratorError::Execution(CANCELLED_MESSAGE.to_string()));
                }
                Ok(ExecuteOutcome::Completed { job_id, output })
            }
        }
    }

    async fn record_failure(&self, job_id: JobId, report: String) {
        match self
            .jobs
            .set_status(job_id, JobStatus::Failed, None, Some(report))
        {
            Ok(Some(snapshot)) => self.store.persist(&snapshot).await,
            Ok(None) => {}
            Err(e) => debug!(job_id = %job_id, error = %e, "failure already recorded"),
        }
    }
}

fn validate_request(process_id: &str, options: ExecuteOptions) -> Result<(), OrchestratorError> {
    if process_id.trim().is_empty() {
        return Err(OrchestratorError::Validation("process id is required".into()));
    }
    match options.timeout_secs {
        Some(0) => Err(OrchestratorError::Validation(
            "timeout must be at least one second".into(),
        )),
        Some(secs) if secs > MAX_SYNC_TIMEOUT_SECS => Err(OrchestratorError::Validation(
            format!("timeout must not exceed {MAX_SYNC_TIMEOUT_SECS} seconds"),
        )),
        _ => Ok(()),
    }
}

/// Runs on a scheduler worker: emits the lifecycle events of one job and
/// returns the outcome to the handle.
async fn run_job(prepared: PreparedTask, sink: ProgressSink, token: CancellationToken) -> JobOutcome {
    if token.is_cancelled() {
        sink.dismissed();
        return Err(OrchestratorError::Execution(TaskError::Cancelled.report()));
    }
    sink.started();

    let PreparedTask { task, extractor } = prepared;
    let raw = AssertUnwindSafe(task.run(token))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(&*panic))));

    match raw.and_then(|raw| extractor.extract(raw)) {
        Ok(output) => {
            sink.completed(output.clone());
            Ok(output)
        }
        Err(TaskError::Cancelled) => {
            sink.dismissed();
            Err(OrchestratorError::Execution(TaskError::Cancelled.report()))
        }
        Err(e) => {
            let report = e.report();
            sink.failed(e);
            Err(OrchestratorError::Execution(report))
        }
    }
}
