//! In-memory process catalog.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::core::{OrchestratorError, ProcessCatalog, ProcessDescriptor};

/// Catalog of descriptors registered at runtime.
#[derive(Default)]
pub struct InMemoryProcessCatalog {
    descriptors: RwLock<HashMap<String, Arc<dyn ProcessDescriptor>>>,
}

impl InMemoryProcessCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its own process id, replacing any previous one.
    pub fn register(&self, descriptor: Arc<dyn ProcessDescriptor>) {
        let process_id = descriptor.process_id().to_string();
        if self
            .descriptors
            .write()
            .insert(process_id.clone(), descriptor)
            .is_some()
        {
            warn!(process_id = %process_id, "process descriptor replaced");
        } else {
            info!(process_id = %process_id, "process registered");
        }
    }

    /// Builder-style [`InMemoryProcessCatalog::register`].
    #[must_use]
    pub fn with(self, descriptor: impl ProcessDescriptor) -> Self {
        self.register(Arc::new(descriptor));
        self
    }

    /// Remove a descriptor. Returns whether it was registered.
    pub fn unregister(&self, process_id: &str) -> bool {
        self.descriptors.write().remove(process_id).is_some()
    }

    /// Registered process ids, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.descriptors.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl ProcessCatalog for InMemoryProcessCatalog {
    fn resolve(&self, process_id: &str) -> Result<Arc<dyn ProcessDescriptor>, OrchestratorError> {
        self.descriptors
            .read()
            .get(process_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ProcessNotFound(process_id.to_string()))
    }
}
