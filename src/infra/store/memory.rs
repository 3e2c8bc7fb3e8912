//! In-memory result store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{JobSnapshot, OrchestratorError, ResultStore};
use crate::util::JobId;

/// Keeps every persisted document per job, for development and testing.
#[derive(Default)]
pub struct InMemoryResultStore {
    documents: RwLock<HashMap<JobId, Vec<JobSnapshot>>>,
}

impl InMemoryResultStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent document of a job.
    #[must_use]
    pub fn latest(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.documents
            .read()
            .get(&job_id)
            .and_then(|docs| docs.last().cloned())
    }

    /// Every document persisted for a job, oldest first.
    #[must_use]
    pub fn history(&self, job_id: JobId) -> Vec<JobSnapshot> {
        self.documents
            .read()
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of jobs with at least one document.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Whether nothing has been persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn persist(&self, job_id: JobId, document: &JobSnapshot) -> Result<(), OrchestratorError> {
        self.documents
            .write()
            .entry(job_id)
            .or_default()
            .push(document.clone());
        Ok(())
    }
}
