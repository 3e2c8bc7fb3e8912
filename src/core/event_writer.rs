//! Single writer per job: drains the job's event channel into the registries.
//!
//! Every mutation caused by the running task goes through here in emission
//! order. Races with an external dismissal are settled inside the registry by
//! the dismissed latch, so the writer never checks it itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::core::error::OrchestratorError;
use crate::core::events::JobEvent;
use crate::core::job_registry::{JobRegistry, JobSnapshot};
use crate::core::quotation_registry::QuotationRegistry;
use crate::core::scheduler::CancelHandle;
use crate::core::status::JobStatus;
use crate::core::store::OrderedStore;
use crate::util::{JobId, QuotationId};

/// Message recorded when the event stream ends without a terminal event.
pub const ABORTED_MESSAGE: &str = "execution aborted before completion";

pub(crate) struct JobEventWriter {
    pub(crate) job_id: JobId,
    pub(crate) process_id: String,
    pub(crate) quotation_id: Option<QuotationId>,
    pub(crate) cancel: CancelHandle,
    pub(crate) jobs: Arc<JobRegistry>,
    pub(crate) quotations: Arc<QuotationRegistry>,
    pub(crate) store: Arc<OrderedStore>,
    pub(crate) throttle: Duration,
}

impl JobEventWriter {
    pub(crate) async fn run(self, mut rx: UnboundedReceiver<JobEvent>) {
        let mut last_progress: Option<Instant> = None;
        let mut pending_progress: Option<u8> = None;
        let mut finished = false;

        loop {
            let flush_at = last_progress.and_then(|at| at.checked_add(self.throttle));
            let event = match (pending_progress, flush_at) {
                // A held tick is written once its throttle window closes,
                // even if the task stays silent after it.
                (Some(percent), Some(flush_at)) => tokio::select! {
                    biased;
                    event = rx.recv() => event,
                    () = sleep_until(flush_at) => {
                        pending_progress = None;
                        last_progress = Some(Instant::now());
                        self.progress(percent, None).await;
                        continue;
                    }
                },
                _ => rx.recv().await,
            };
            let Some(event) = event else { break };

            if let JobEvent::Progressing { percent, partial } = event {
                let due = partial.is_some()
                    || percent >= 100
                    || last_progress.map_or(true, |at| at.elapsed() >= self.throttle);
                if due {
                    pending_progress = None;
                    last_progress = Some(Instant::now());
                    self.progress(percent, partial).await;
                } else {
                    pending_progress = Some(percent);
                }
                continue;
            }

            if let Some(percent) = pending_progress.take() {
                self.progress(percent, None).await;
            }
            finished |= matches!(
                event,
                JobEvent::Completed(_) | JobEvent::Failed(_) | JobEvent::Dismissed
            );
            self.apply(event).await;
        }

        if let Some(percent) = pending_progress {
            self.progress(percent, None).await;
        }
        if !finished {
            // The runner was dropped without reporting, e.g. on scheduler shutdown.
            let outcome = self.jobs.set_status(
                self.job_id,
                JobStatus::Failed,
                None,
                Some(ABORTED_MESSAGE.to_string()),
            );
            if let Ok(Some(snapshot)) = outcome {
                warn!(job_id = %self.job_id, "job event stream closed without a terminal event");
                self.persist(&snapshot).await;
            }
        }
        debug!(job_id = %self.job_id, "job writer finished");
    }

    async fn progress(&self, percent: u8, partial: Option<serde_json::Value>) {
        debug!(job_id = %self.job_id, percent, "job progressing");
        if let Some(snapshot) = self.jobs.update_progress(self.job_id, percent, partial) {
            self.persist(&snapshot).await;
        }
    }

    async fn apply(&self, event: JobEvent) {
        let job_id = self.job_id;
        let name = event.name();
        let outcome = match event {
            JobEvent::Started => self
                .jobs
                .add_job(
                    &self.process_id,
                    job_id,
                    JobStatus::Running,
                    Some(self.cancel.clone()),
                )
                .inspect(|snap| {
                    if snap.is_some() {
                        info!(job_id = %job_id, process_id = %self.process_id, "job started");
                    }
                }),
            JobEvent::Paused => self.jobs.set_status(job_id, JobStatus::Paused, None, None),
            JobEvent::Resumed => self.jobs.set_status(job_id, JobStatus::Running, None, None),
            JobEvent::Completed(output) => self.complete(output),
            JobEvent::Failed(err) => {
                let report = err.report();
                self.jobs
                    .set_status(job_id, JobStatus::Failed, None, Some(report.clone()))
                    .inspect(|snap| {
                        if snap.is_some() {
                            info!(job_id = %job_id, error = %report, "job failed");
                        }
                    })
            }
            JobEvent::Dismissed => Ok(self.jobs.confirm_cancelled(job_id)),
            JobEvent::Progressing { .. } => Ok(None),
        };

        match outcome {
            Ok(Some(snapshot)) => self.persist(&snapshot).await,
            Ok(None) => debug!(job_id = %job_id, event = name, "job event absorbed"),
            Err(e) => error!(job_id = %job_id, event = name, error = %e, "job event rejected"),
        }
    }

    fn complete(&self, output: serde_json::Value) -> Result<Option<JobSnapshot>, OrchestratorError> {
        let job_id = self.job_id;
        let Some(snapshot) = self.jobs.complete(job_id, output)? else {
            warn!(job_id = %job_id, "completion discarded, job was dismissed");
            return Ok(None);
        };
        info!(job_id = %job_id, process_id = %self.process_id, "job completed");
        if let Some(quotation_id) = self.quotation_id {
            if let Err(e) = self.quotations.add_bill(quotation_id, job_id) {
                error!(job_id = %job_id, quotation_id = %quotation_id, error = %e, "billing failed");
            }
        }
        Ok(Some(snapshot))
    }

    async fn persist(&self, snapshot: &JobSnapshot) {
        self.store.persist(snapshot).await;
    }
}
