//! Job scheduler backed by dedicated worker threads.
//!
//! Each worker owns a single-threaded tokio runtime, so CPU-heavy process
//! tasks never block the caller's runtime. Submissions return a [`JobHandle`]
//! that can be waited on (blocking or async) and cancelled.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on channel recv; waiters use Condvar
//!   (blocking) or `Notify` (async)
//! - **Best-effort cancel**: `cancel()` only flips the task's token
//! - **Clean shutdown**: dropping the sender unblocks workers naturally

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use futures::FutureExt;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::JobSchedulerConfig;
use crate::core::error::OrchestratorError;
use crate::core::process::panic_message;
use crate::util::JobId;

/// Outcome delivered through a [`JobHandle`].
pub type JobOutcome = Result<Value, OrchestratorError>;

/// Boxed future produced by a unit of scheduled work.
pub type JobFuture = Pin<Box<dyn Future<Output = JobOutcome> + Send + 'static>>;

/// Unit of work run on a worker thread; receives the job's cancellation token.
pub type Work = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send + 'static>;

/// Requests cooperative cancellation of one job.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Wrap an existing token.
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Signal cancellation. Does not wait for the task to stop.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by the task.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Statistics about scheduler utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Currently executing tasks.
    pub active_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Total tasks accepted.
    pub submitted_tasks: u64,
    /// Tasks that produced an output.
    pub completed_tasks: u64,
    /// Tasks that produced an error.
    pub failed_tasks: u64,
    /// Tasks whose token was cancelled by the time they finished.
    pub cancelled_tasks: u64,
}

#[derive(Debug, Default)]
struct SchedulerCounters {
    active_tasks: AtomicU64,
    queued_tasks: AtomicU64,
    submitted_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    cancelled_tasks: AtomicU64,
}

impl SchedulerCounters {
    fn snapshot(&self, worker_count: usize) -> SchedulerStats {
        SchedulerStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            cancelled_tasks: self.cancelled_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Single-assignment outcome slot shared by a worker and the job's handle.
struct ResultSlot {
    outcome: Mutex<Option<JobOutcome>>,
    condvar: Condvar,
    notify: Notify,
}

impl ResultSlot {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Store the outcome (first write wins) and wake every waiter.
    fn complete(&self, outcome: JobOutcome) {
        {
            let mut slot = self.outcome.lock();
            if slot.is_none() {
                *slot = Some(outcome);
            }
        }
        self.condvar.notify_all();
        self.notify.notify_waiters();
    }

    fn peek(&self) -> Option<JobOutcome> {
        self.outcome.lock().clone()
    }
}

struct QueuedWork {
    job_id: JobId,
    work: Work,
    cancel: CancellationToken,
    slot: Arc<ResultSlot>,
}

/// Handle to a submitted job.
#[derive(Clone)]
pub struct JobHandle {
    job_id: JobId,
    cancel: CancellationToken,
    slot: Arc<ResultSlot>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl JobHandle {
    /// Job this handle belongs to.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Block the current thread until the outcome is available or `timeout` passes.
    /// A `timeout` too large to form a deadline waits without one.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Timeout`] when the deadline passes first, otherwise the
    /// task's own error.
    pub fn get(&self, timeout: Duration) -> JobOutcome {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.outcome.lock();
        while slot.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.slot.condvar.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
                None => self.slot.condvar.wait(&mut slot),
            }
        }
        slot.clone().unwrap_or_else(|| Err(self.timeout_error(timeout)))
    }

    /// Wait asynchronously for the outcome, never past `timeout`.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Timeout`] when the deadline passes first, otherwise the
    /// task's own error.
    pub async fn get_async(&self, timeout: Duration) -> JobOutcome {
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            // Register interest before checking, so a completion in between is not lost.
            let notified = self.slot.notify.notified();
            if let Some(outcome) = self.slot.peek() {
                return outcome;
            }
            let Some(deadline) = deadline else {
                notified.await;
                continue;
            };
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self
                    .slot
                    .peek()
                    .unwrap_or_else(|| Err(self.timeout_error(timeout)));
            }
        }
    }

    /// Outcome if already available.
    #[must_use]
    pub fn try_get(&self) -> Option<JobOutcome> {
        self.slot.peek()
    }

    /// Whether the outcome is available.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.outcome.lock().is_some()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancellation handle for registries.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.cancel.clone())
    }

    fn timeout_error(&self, timeout: Duration) -> OrchestratorError {
        OrchestratorError::Timeout {
            job_id: self.job_id,
            timeout_secs: timeout.as_secs(),
        }
    }
}

/// Bounded worker pool running job tasks on dedicated OS threads.
pub struct JobScheduler {
    config: JobSchedulerConfig,
    /// Task sender (to workers). Option allows clean shutdown by dropping.
    task_tx: Mutex<Option<Sender<QueuedWork>>>,
    counters: Arc<SchedulerCounters>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    /// Create a scheduler and spawn `config.worker_count` worker threads.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Validation`] for an invalid configuration,
    /// [`OrchestratorError::Internal`] if a worker thread cannot be spawned.
    pub fn new(config: JobSchedulerConfig) -> Result<Self, OrchestratorError> {
        config.validate().map_err(OrchestratorError::Validation)?;

        let (task_tx, task_rx) = bounded::<QueuedWork>(config.max_queue_depth);
        let counters = Arc::new(SchedulerCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let spawned = spawn_worker(
                worker_id,
                task_rx.clone(),
                Arc::clone(&counters),
                Arc::clone(&shutdown),
                config.thread_stack_size,
            );
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Dropping the sender lets already spawned workers exit.
                    shutdown.store(true, Ordering::Release);
                    drop(task_tx);
                    return Err(OrchestratorError::Internal(format!(
                        "failed to spawn worker {worker_id}: {e}"
                    )));
                }
            }
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "JobScheduler initialized with dedicated worker threads"
        );

        Ok(Self {
            config,
            task_tx: Mutex::new(Some(task_tx)),
            counters,
            shutdown,
            workers: Mutex::new(workers),
        })
    }

    /// Submit work with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// See [`JobScheduler::submit_with_token`].
    pub fn submit(&self, job_id: JobId, work: Work) -> Result<JobHandle, OrchestratorError> {
        self.submit_with_token(job_id, CancellationToken::new(), work)
    }

    /// Submit work whose cancellation token was created by the caller, so the
    /// job can be made cancellable before a worker picks it up.
    ///
    /// Enqueueing never blocks; it fails immediately when the queue is full.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::QueueFull`] if the queue is full
    /// - [`OrchestratorError::Shutdown`] if the scheduler has been shut down
    pub fn submit_with_token(
        &self,
        job_id: JobId,
        cancel: CancellationToken,
        work: Work,
    ) -> Result<JobHandle, OrchestratorError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(OrchestratorError::Shutdown);
        }

        let slot = Arc::new(ResultSlot::new());
        let queued = QueuedWork {
            job_id,
            work,
            cancel: cancel.clone(),
            slot: Arc::clone(&slot),
        };

        let task_tx_guard = self.task_tx.lock();
        let Some(task_tx) = task_tx_guard.as_ref() else {
            return Err(OrchestratorError::Shutdown);
        };

        match task_tx.try_send(queued) {
            Ok(()) => {
                self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %job_id, "job submitted to scheduler");
                Ok(JobHandle {
                    job_id,
                    cancel,
                    slot,
                })
            }
            Err(TrySendError::Full(_)) => {
                warn!(job_id = %job_id, "scheduler queue is full");
                Err(OrchestratorError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(OrchestratorError::Shutdown),
        }
    }

    /// Current scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    /// Whether [`JobScheduler::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Shut down gracefully: stop accepting work, fail queued work with
    /// [`OrchestratorError::Shutdown`], and join workers (2 seconds each).
    ///
    /// Workers that don't exit within the timeout are detached.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down job scheduler");

        {
            let mut task_tx = self.task_tx.lock();
            *task_tx = None;
        }

        let mut workers = self.workers.lock();
        let worker_count = workers.len();

        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(worker_id = idx, "Worker joined successfully"),
                Ok(false) => warn!(worker_id = idx, "Worker panicked"),
                Err(_) => {
                    warn!(worker_id = idx, "Worker did not exit within timeout - detaching");
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!(worker_count = worker_count, "Job scheduler shut down complete");
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        // Signal only; joining here could hang on long-running tasks.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let mut task_tx = self.task_tx.lock();
            *task_tx = None;
            debug!("JobScheduler dropped without explicit shutdown - workers will be detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    task_rx: Receiver<QueuedWork>,
    counters: Arc<SchedulerCounters>,
    shutdown: Arc<AtomicBool>,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("orch-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id = worker_id, error = %e, "Failed to create worker runtime");
                    return;
                }
            };

            // When the sender is dropped, recv() drains what is left and then errors.
            while let Ok(queued) = task_rx.recv() {
                counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);

                if shutdown.load(Ordering::Acquire) {
                    queued.slot.complete(Err(OrchestratorError::Shutdown));
                    continue;
                }

                counters.active_tasks.fetch_add(1, Ordering::Relaxed);
                let QueuedWork {
                    job_id,
                    work,
                    cancel,
                    slot,
                } = queued;

                debug!(worker_id = worker_id, job_id = %job_id, "Worker executing job");

                let token = cancel.clone();
                let outcome = match std::panic::catch_unwind(AssertUnwindSafe(move || work(token))) {
                    Ok(fut) => rt
                        .block_on(AssertUnwindSafe(fut).catch_unwind())
                        .unwrap_or_else(|panic| Err(panicked(job_id, &*panic))),
                    Err(panic) => Err(panicked(job_id, &*panic)),
                };

                if cancel.is_cancelled() {
                    counters.cancelled_tasks.fetch_add(1, Ordering::Relaxed);
                }
                if outcome.is_ok() {
                    counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                }
                counters.active_tasks.fetch_sub(1, Ordering::Relaxed);

                slot.complete(outcome);
                debug!(worker_id = worker_id, job_id = %job_id, "Worker finished job");
            }

            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}

fn panicked(job_id: JobId, payload: &(dyn std::any::Any + Send)) -> OrchestratorError {
    let message = panic_message(payload);
    error!(job_id = %job_id, panic = %message, "job task panicked");
    OrchestratorError::Execution(format!("task panicked: {message}"))
}
