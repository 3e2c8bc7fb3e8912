//! Configuration models for the scheduler, timeouts and store backends.

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{
    OrchestratorConfig, ResultStoreConfig, ENV_PREFIX, MAX_SYNC_TIMEOUT_SECS,
};
pub use scheduler::JobSchedulerConfig;
