//! Result store abstraction for externalizing job status documents.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::core::error::OrchestratorError;
use crate::core::job_registry::JobSnapshot;
use crate::util::JobId;

/// Durable sink for job status documents.
///
/// Called at every status-recording transition. Failures are logged by the
/// caller and never fail the job.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist the latest status document of a job.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Store`] when the backend rejects the write.
    async fn persist(&self, job_id: JobId, document: &JobSnapshot) -> Result<(), OrchestratorError>;
}

/// Serializes the writes of each job and drops snapshots older than the last
/// one stored, so the stored document never moves backwards.
pub(crate) struct OrderedStore {
    inner: Arc<dyn ResultStore>,
    /// Per job: revision of the last stored snapshot.
    lanes: Mutex<HashMap<JobId, Arc<AsyncMutex<u64>>>>,
}

impl OrderedStore {
    pub(crate) fn new(inner: Arc<dyn ResultStore>) -> Self {
        Self {
            inner,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Persist `snapshot` unless a newer one of the same job is already stored.
    /// Failures are logged.
    pub(crate) async fn persist(&self, snapshot: &JobSnapshot) {
        let job_id = snapshot.job_id;
        let lane = Arc::clone(self.lanes.lock().entry(job_id).or_default());
        let mut stored = lane.lock().await;
        if snapshot.revision <= *stored {
            debug!(job_id = %job_id, revision = snapshot.revision, stored = *stored, "skipping stale status document");
            return;
        }
        match self.inner.persist(job_id, snapshot).await {
            Ok(()) => *stored = snapshot.revision,
            Err(e) => {
                warn!(job_id = %job_id, status = %snapshot.status, error = %e, "failed to persist job status");
            }
        }
    }

    /// Drop the bookkeeping of jobs for which `keep` returns false.
    pub(crate) fn retain(&self, mut keep: impl FnMut(JobId) -> bool) {
        self.lanes.lock().retain(|job_id, _| keep(*job_id));
    }

    #[cfg(test)]
    fn lanes(&self) -> usize {
        self.lanes.lock().len()
    }
}
