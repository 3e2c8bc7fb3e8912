//! Tokio runtime spawner used for job writers and the expiration sweeper.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::core::error::OrchestratorError;

/// Spawns background futures onto a specific tokio runtime.
///
/// The orchestrator may be constructed outside a runtime context (for example
/// from a synchronous `main`), so it keeps an explicit handle instead of
/// relying on `tokio::spawn`.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Arc<Handle>,
}

impl TokioSpawner {
    /// Create a spawner from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner bound to the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Internal`] when called outside a tokio runtime.
    pub fn try_current() -> Result<Self, OrchestratorError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| OrchestratorError::Internal(format!("no tokio runtime: {e}")))
    }

    /// Spawn a future on the runtime.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// The underlying runtime handle.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}
