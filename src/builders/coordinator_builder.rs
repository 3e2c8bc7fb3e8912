//! Builders to construct a coordinator from configuration.

use std::sync::Arc;

use crate::config::{OrchestratorConfig, ResultStoreConfig};
use crate::core::{ExecutionCoordinator, OrchestratorError, ProcessCatalog, ResultStore};
use crate::infra::store::{FileResultStore, InMemoryResultStore};
use crate::runtime::TokioSpawner;

/// Instantiate the configured result store backend.
///
/// # Errors
///
/// [`OrchestratorError::Store`] if the file backend cannot create its directory.
pub fn build_result_store(
    cfg: &ResultStoreConfig,
) -> Result<Arc<dyn ResultStore>, OrchestratorError> {
    match cfg {
        ResultStoreConfig::InMemory => Ok(Arc::new(InMemoryResultStore::new())),
        ResultStoreConfig::File { dir } => Ok(Arc::new(FileResultStore::new(dir)?)),
    }
}

/// Build a coordinator wired to `catalog`, with the result store chosen by `cfg`.
///
/// # Errors
///
/// [`OrchestratorError::Validation`] for an invalid configuration, otherwise
/// whatever store or scheduler construction reports.
pub fn build_coordinator(
    cfg: &OrchestratorConfig,
    catalog: Arc<dyn ProcessCatalog>,
    spawner: TokioSpawner,
) -> Result<ExecutionCoordinator, OrchestratorError> {
    cfg.validate()
        .map_err(|e| OrchestratorError::Validation(format!("config invalid: {e}")))?;
    let store = build_result_store(&cfg.result_store)?;
    ExecutionCoordinator::new(cfg.clone(), catalog, store, spawner)
}
