//! Builders to construct orchestrator components from configuration.

pub mod coordinator_builder;

pub use coordinator_builder::{build_coordinator, build_result_store};
