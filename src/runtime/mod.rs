//! Runtime adapters and API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    health, quote, submit_execute, ErrorResponse, ExecuteRequest, ExecuteResponse, Health,
    QuoteRequest,
};
pub use tokio_spawner::TokioSpawner;
