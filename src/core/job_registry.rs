//! Concurrent job registry: job id → lifecycle state, guarded per entry.
//!
//! Design:
//! - RwLock for the entry map (read-heavy, write on create/prune)
//! - Per-entry Mutex, so updates to unrelated jobs never contend
//! - The `dismissed` latch is checked under the entry lock by every mutator;
//!   once set, later writes for that id are discarded

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::error::OrchestratorError;
use crate::core::scheduler::CancelHandle;
use crate::core::status::JobStatus;
use crate::util::{JobId, QuotationId};

/// Message recorded when a task confirms a cancellation nobody dismissed.
pub const CANCELLED_MESSAGE: &str = "execution cancelled";

/// Point-in-time status document of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job identifier.
    pub job_id: JobId,
    /// Owning process.
    pub process_id: String,
    /// Current status.
    pub status: JobStatus,
    /// Completion percentage.
    pub progress: u8,
    /// Human-readable message; the error report for failed jobs.
    pub message: Option<String>,
    /// Quotation the job was started from.
    pub quotation_id: Option<QuotationId>,
    /// Dismissed latch.
    pub dismissed: bool,
    /// Whether a final result is recorded.
    pub has_result: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last recorded change.
    pub updated_at: DateTime<Utc>,
    /// Change counter; grows by one with every recorded change of the job.
    #[serde(default)]
    pub revision: u64,
}

#[derive(Debug)]
struct JobEntry {
    process_id: String,
    status: JobStatus,
    progress: u8,
    /// Lowest progress value accepted next; reset on resume.
    progress_floor: u8,
    message: Option<String>,
    result: Option<Value>,
    partial_result: Option<Value>,
    cancel: Option<CancelHandle>,
    dismissed: bool,
    quotation_id: Option<QuotationId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revision: u64,
}

impl JobEntry {
    fn new(process_id: &str, status: JobStatus, cancel: Option<CancelHandle>) -> Self {
        let now = Utc::now();
        Self {
            process_id: process_id.to_string(),
            status,
            progress: 0,
            progress_floor: 0,
            message: None,
            result: None,
            partial_result: None,
            cancel,
            dismissed: false,
            quotation_id: None,
            created_at: now,
            updated_at: now,
            revision: 1,
        }
    }

    fn snapshot(&self, job_id: JobId) -> JobSnapshot {
        JobSnapshot {
            job_id,
            process_id: self.process_id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            quotation_id: self.quotation_id,
            dismissed: self.dismissed,
            has_result: self.result.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            revision: self.revision,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.revision += 1;
    }

    /// Monotonic within a run; values below the floor are dropped.
    fn apply_progress(&mut self, job_id: JobId, percent: u8) {
        let percent = percent.min(100);
        if percent >= self.progress_floor {
            self.progress = percent;
            self.progress_floor = percent;
        } else {
            debug!(job_id = %job_id, percent, current = self.progress, "ignoring regressing progress");
        }
    }

    fn transition(&mut self, job_id: JobId, next: JobStatus) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestratorError::Internal(format!(
                "illegal transition {} -> {next} for job {job_id}",
                self.status
            )));
        }
        if self.status == JobStatus::Paused && next == JobStatus::Running {
            self.progress_floor = 0;
        }
        self.status = next;
        Ok(())
    }
}

type EntryRef = Arc<Mutex<JobEntry>>;

/// Registry of every job known to the orchestrator.
#[derive(Default)]
pub struct JobRegistry {
    entries: RwLock<HashMap<JobId, EntryRef>>,
    by_process: RwLock<HashMap<String, HashSet<JobId>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, job_id: JobId) -> Option<EntryRef> {
        self.entries.read().get(&job_id).cloned()
    }

    fn lookup(&self, job_id: JobId) -> Result<EntryRef, OrchestratorError> {
        self.entry(job_id).ok_or(OrchestratorError::JobNotFound(job_id))
    }

    /// Make a job visible and cancellable, or move an existing entry forward to
    /// `initial_status` (the `started` event on a job registered at submission).
    ///
    /// Returns the new snapshot, or `None` when nothing changed: the job is
    /// dismissed, already in `initial_status`, or already terminal.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Internal`] if the id is owned by another process or the
    /// move violates the state machine.
    pub fn add_job(
        &self,
        process_id: &str,
        job_id: JobId,
        initial_status: JobStatus,
        cancel: Option<CancelHandle>,
    ) -> Result<Option<JobSnapshot>, OrchestratorError> {
        let existing = match self.entries.write().entry(job_id) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                let entry = JobEntry::new(process_id, initial_status, cancel);
                let snapshot = entry.snapshot(job_id);
                vacant.insert(Arc::new(Mutex::new(entry)));
                self.by_process
                    .write()
                    .entry(process_id.to_string())
                    .or_default()
                    .insert(job_id);
                debug!(job_id = %job_id, process_id, status = %initial_status, "job registered");
                return Ok(Some(snapshot));
            }
        };

        let mut entry = existing.lock();
        if entry.process_id != process_id {
            return Err(OrchestratorError::Internal(format!(
                "job {job_id} belongs to {} not {process_id}",
                entry.process_id
            )));
        }
        if entry.dismissed {
            debug!(job_id = %job_id, "ignoring registration of dismissed job");
            return Ok(None);
        }
        if entry.cancel.is_none() {
            entry.cancel = cancel;
        }
        if entry.status == initial_status || entry.status.is_terminal() {
            return Ok(None);
        }
        entry.transition(job_id, initial_status)?;
        entry.touch();
        Ok(Some(entry.snapshot(job_id)))
    }

    /// Record the quotation a job was started from.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`] for unknown ids.
    pub fn attach_quotation(
        &self,
        job_id: JobId,
        quotation_id: QuotationId,
    ) -> Result<(), OrchestratorError> {
        let entry = self.lookup(job_id)?;
        let mut entry = entry.lock();
        entry.quotation_id = Some(quotation_id);
        entry.touch();
        Ok(())
    }

    /// Move a job to `status`, optionally updating progress and message.
    ///
    /// Discarded (returns `Ok(None)`) once the job is dismissed, and for unknown
    /// ids unless the update is the `started` transition.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Internal`] for a `RUNNING` transition of an unknown id,
    /// for `DISMISSED` (only [`JobRegistry::dismiss`] may set it), and for
    /// transitions the state machine forbids.
    pub fn set_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        progress: Option<u8>,
        message: Option<String>,
    ) -> Result<Option<JobSnapshot>, OrchestratorError> {
        if status == JobStatus::Dismissed {
            return Err(OrchestratorError::Internal(format!(
                "job {job_id}: dismissal must go through dismiss()"
            )));
        }
        let Some(entry) = self.entry(job_id) else {
            if status == JobStatus::Running {
                return Err(OrchestratorError::Internal(format!(
                    "started transition for unknown job {job_id}"
                )));
            }
            debug!(job_id = %job_id, status = %status, "status update for unknown job ignored");
            return Ok(None);
        };

        let mut entry = entry.lock();
        if entry.dismissed {
            debug!(job_id = %job_id, status = %status, "discarding status update for dismissed job");
            return Ok(None);
        }
        entry.transition(job_id, status)?;
        if let Some(percent) = progress {
            entry.apply_progress(job_id, percent);
        }
        if message.is_some() {
            entry.message = message;
        }
        entry.touch();
        Ok(Some(entry.snapshot(job_id)))
    }

    /// Progress tick without a status change, optionally stashing a partial result.
    ///
    /// Silently ignored for unknown, dismissed, not yet started or finished jobs.
    pub fn update_progress(
        &self,
        job_id: JobId,
        percent: u8,
        partial: Option<Value>,
    ) -> Option<JobSnapshot> {
        let entry = self.entry(job_id)?;
        let mut entry = entry.lock();
        if entry.dismissed || !matches!(entry.status, JobStatus::Running | JobStatus::Paused) {
            debug!(job_id = %job_id, status = %entry.status, "progress tick ignored");
            return None;
        }
        entry.apply_progress(job_id, percent);
        if partial.is_some() {
            entry.partial_result = partial;
        }
        entry.touch();
        Some(entry.snapshot(job_id))
    }

    /// Store the final result. Returns `false` when discarded because the job
    /// was dismissed.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`] for unknown ids,
    /// [`OrchestratorError::Internal`] if a result is already recorded.
    pub fn set_result(&self, job_id: JobId, result: Value) -> Result<bool, OrchestratorError> {
        let entry = self.lookup(job_id)?;
        let mut entry = entry.lock();
        if entry.dismissed {
            debug!(job_id = %job_id, "discarding result for dismissed job");
            return Ok(false);
        }
        if entry.result.is_some() {
            return Err(OrchestratorError::Internal(format!(
                "result of job {job_id} already set"
            )));
        }
        entry.result = Some(result);
        entry.touch();
        Ok(true)
    }

    /// Record the result and `SUCCEEDED` under one lock, so a racing dismissal
    /// sees either both or neither.
    ///
    /// # Errors
    ///
    /// As [`JobRegistry::set_result`] and [`JobRegistry::set_status`].
    pub fn complete(
        &self,
        job_id: JobId,
        result: Value,
    ) -> Result<Option<JobSnapshot>, OrchestratorError> {
        let entry = self.lookup(job_id)?;
        let mut entry = entry.lock();
        if entry.dismissed {
            debug!(job_id = %job_id, "discarding completion of dismissed job");
            return Ok(None);
        }
        if entry.result.is_some() {
            return Err(OrchestratorError::Internal(format!(
                "result of job {job_id} already set"
            )));
        }
        entry.transition(job_id, JobStatus::Succeeded)?;
        entry.result = Some(result);
        entry.progress = 100;
        entry.message = None;
        entry.touch();
        Ok(Some(entry.snapshot(job_id)))
    }

    /// The task confirmed a cancellation. No-op when the job was dismissed
    /// (the usual case) or already finished; otherwise the job fails with
    /// [`CANCELLED_MESSAGE`].
    pub fn confirm_cancelled(&self, job_id: JobId) -> Option<JobSnapshot> {
        let entry = self.entry(job_id)?;
        let mut entry = entry.lock();
        if entry.dismissed || entry.status.is_terminal() {
            return None;
        }
        entry.status = JobStatus::Failed;
        entry.message = Some(CANCELLED_MESSAGE.to_string());
        entry.touch();
        Some(entry.snapshot(job_id))
    }

    /// Latest status document.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`] for unknown ids.
    pub fn get_status(&self, job_id: JobId) -> Result<JobSnapshot, OrchestratorError> {
        Ok(self.lookup(job_id)?.lock().snapshot(job_id))
    }

    /// Final result of a succeeded job.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::JobNotFound`] for unknown ids
    /// - [`OrchestratorError::Execution`] with the error report for failed jobs
    /// - [`OrchestratorError::NotReady`] otherwise
    pub fn get_result(&self, job_id: JobId) -> Result<Value, OrchestratorError> {
        let entry = self.lookup(job_id)?;
        let entry = entry.lock();
        match (&entry.status, &entry.result) {
            (JobStatus::Succeeded, Some(result)) => Ok(result.clone()),
            (JobStatus::Failed, _) => Err(OrchestratorError::Execution(
                entry.message.clone().unwrap_or_else(|| "job failed".into()),
            )),
            (status, _) => Err(OrchestratorError::NotReady {
                job_id,
                status: *status,
            }),
        }
    }

    /// Latest intermediate result reported through progress events.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`] for unknown ids.
    pub fn get_partial_result(&self, job_id: JobId) -> Result<Option<Value>, OrchestratorError> {
        Ok(self.lookup(job_id)?.lock().partial_result.clone())
    }

    /// Cancel a job and latch it as dismissed.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::JobNotFound`] for unknown ids
    /// - [`OrchestratorError::NotDismissable`] if already dismissed, finished,
    ///   or without a cancellation handle
    pub fn dismiss(&self, job_id: JobId) -> Result<JobSnapshot, OrchestratorError> {
        let entry = self.lookup(job_id)?;
        let mut entry = entry.lock();
        let refuse = |reason: &str| OrchestratorError::NotDismissable {
            job_id,
            reason: reason.to_string(),
        };
        if entry.dismissed {
            return Err(refuse("already dismissed"));
        }
        if entry.status.is_terminal() {
            return Err(refuse(&format!("job already {}", entry.status)));
        }
        let Some(cancel) = entry.cancel.as_ref() else {
            return Err(refuse("job has no cancellation handle"));
        };
        cancel.cancel();
        entry.dismissed = true;
        entry.status = JobStatus::Dismissed;
        entry.touch();
        info!(job_id = %job_id, process_id = %entry.process_id, "job dismissed");
        Ok(entry.snapshot(job_id))
    }

    /// Jobs registered for a process.
    #[must_use]
    pub fn list_jobs(&self, process_id: &str) -> HashSet<JobId> {
        self.by_process
            .read()
            .get(process_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Process that owns a job.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::JobNotFound`] for unknown ids.
    pub fn owning_process(&self, job_id: JobId) -> Result<String, OrchestratorError> {
        Ok(self.lookup(job_id)?.lock().process_id.clone())
    }

    /// Remove terminal jobs whose last change is older than `max_age`.
    /// Returns the number of removed jobs.
    pub fn prune_finished(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            warn!("prune age out of range, nothing pruned");
            return 0;
        };
        let cutoff = Utc::now() - max_age;

        let stale: Vec<(JobId, String)> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter_map(|(id, entry)| {
                    let entry = entry.lock();
                    (entry.status.is_terminal() && entry.updated_at <= cutoff)
                        .then(|| (*id, entry.process_id.clone()))
                })
                .collect()
        };
        if stale.is_empty() {
            return 0;
        }

        {
            let mut entries = self.entries.write();
            for (id, _) in &stale {
                entries.remove(id);
            }
        }
        let mut by_process = self.by_process.write();
        for (id, process_id) in &stale {
            if let Some(ids) = by_process.get_mut(process_id) {
                ids.remove(id);
                if ids.is_empty() {
                    by_process.remove(process_id);
                }
            }
        }
        info!(pruned = stale.len(), "pruned finished jobs");
        stale.len()
    }

    /// Number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no job is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
