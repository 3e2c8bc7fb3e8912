//! API-facing request/response models. Any wire protocol wraps these.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    ExecuteOutcome, ExecutionCoordinator, JobStatus, OrchestratorError, Quotation, SchedulerStats,
};
use crate::util::{ExecuteOptions, JobId};

/// Execution request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Process to run.
    pub process_id: String,
    /// Opaque process inputs.
    #[serde(default)]
    pub params: Value,
    /// Mode and timeout.
    #[serde(default)]
    pub options: ExecuteOptions,
}

/// Execution response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Job created by the request.
    pub job_id: JobId,
    /// Status at response time.
    pub status: JobStatus,
    /// Final output of a synchronous execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// Quotation request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Process to quote.
    pub process_id: String,
    /// Opaque process inputs, replayed on execution.
    #[serde(default)]
    pub params: Value,
    /// Options replayed on execution.
    #[serde(default)]
    pub options: ExecuteOptions,
}

/// Error body with a stable exception code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Exception code, see [`OrchestratorError::code`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl From<&OrchestratorError> for ErrorResponse {
    fn from(err: &OrchestratorError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<OrchestratorError> for ErrorResponse {
    fn from(err: OrchestratorError) -> Self {
        Self::from(&err)
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Worker pool counters.
    pub scheduler: SchedulerStats,
}

/// Submit an execution request.
///
/// # Errors
///
/// The coordinator error mapped to an [`ErrorResponse`].
pub async fn submit_execute(
    coordinator: &ExecutionCoordinator,
    req: ExecuteRequest,
) -> Result<ExecuteResponse, ErrorResponse> {
    let outcome = coordinator
        .submit(&req.process_id, req.params, req.options)
        .await?;
    Ok(match outcome {
        ExecuteOutcome::Accepted { job_id } => ExecuteResponse {
            job_id,
            status: coordinator
                .get_status(job_id)
                .map_or(JobStatus::Accepted, |snapshot| snapshot.status),
            output: None,
        },
        ExecuteOutcome::Completed { job_id, output } => ExecuteResponse {
            job_id,
            status: JobStatus::Succeeded,
            output: Some(output),
        },
    })
}

/// Request a quotation.
///
/// # Errors
///
/// The coordinator error mapped to an [`ErrorResponse`].
pub fn quote(
    coordinator: &ExecutionCoordinator,
    req: QuoteRequest,
) -> Result<Quotation, ErrorResponse> {
    Ok(coordinator.quote(&req.process_id, req.params, req.options)?)
}

/// Liveness and scheduler counters.
#[must_use]
pub fn health(coordinator: &ExecutionCoordinator) -> Health {
    Health {
        ok: coordinator.is_running(),
        scheduler: coordinator.stats(),
    }
}
