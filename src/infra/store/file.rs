//! File-backed result store: one JSON document per job.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::core::{JobSnapshot, OrchestratorError, ResultStore};
use crate::util::JobId;

/// Writes `<dir>/<job_id>.json`, replacing it atomically on every update.
#[derive(Debug, Clone)]
pub struct FileResultStore {
    dir: PathBuf,
}

impl FileResultStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Store`] if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| OrchestratorError::Store(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    /// Read back the latest document of a job, if any.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Store`] on I/O or decode failures.
    pub async fn load(&self, job_id: JobId) -> Result<Option<JobSnapshot>, OrchestratorError> {
        let path = self.document_path(job_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OrchestratorError::Store(format!("{}: {e}", path.display()))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| OrchestratorError::Store(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl ResultStore for FileResultStore {
    async fn persist(&self, job_id: JobId, document: &JobSnapshot) -> Result<(), OrchestratorError> {
        let path = self.document_path(job_id);
        // Unique per write, so concurrent writers never share a temp file.
        let tmp = self.dir.join(format!("{job_id}.{}.json.tmp", Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| OrchestratorError::Store(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| OrchestratorError::Store(format!("{}: {e}", path.display())))?;
        debug!(job_id = %job_id, status = %document.status, "status document written");
        Ok(())
    }
}
