//! Error types for orchestrator operations.

use thiserror::Error;

use crate::core::status::JobStatus;
use crate::util::{ExecutionMode, JobId, QuotationId};

/// Errors produced by orchestrator components.
///
/// Cloneable so a single task outcome can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Malformed request: bad mode, missing identifier, zero timeout.
    #[error("validation failed: {0}")]
    Validation(String),
    /// No process registered under the identifier.
    #[error("process not found: {0}")]
    ProcessNotFound(String),
    /// Job id was never issued (or has been pruned).
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    /// Quotation id was never issued.
    #[error("quotation not found: {0}")]
    QuotationNotFound(QuotationId),
    /// No bill under the given bill id or job id.
    #[error("bill not found: {0}")]
    BillNotFound(String),
    /// The process does not support the requested execution mode.
    #[error("process {process_id} does not support {mode} execution")]
    Unsupported {
        /// Process identifier.
        process_id: String,
        /// Requested mode.
        mode: ExecutionMode,
    },
    /// Job exists but cannot be dismissed.
    #[error("job {job_id} cannot be dismissed: {reason}")]
    NotDismissable {
        /// Job identifier.
        job_id: JobId,
        /// Why the dismissal was refused.
        reason: String,
    },
    /// Job exists but has no terminal result.
    #[error("result of job {job_id} not ready (status {status})")]
    NotReady {
        /// Job identifier.
        job_id: JobId,
        /// Status at the time of the request.
        status: JobStatus,
    },
    /// Quotation existed but is past its TTL.
    #[error("quotation expired: {0}")]
    Expired(QuotationId),
    /// Synchronous wait exceeded its bound.
    #[error("job {job_id} did not finish within {timeout_secs}s")]
    Timeout {
        /// Job identifier.
        job_id: JobId,
        /// Wait bound in seconds.
        timeout_secs: u64,
    },
    /// Task-raised failure, carrying the error report.
    #[error("execution failed: {0}")]
    Execution(String),
    /// Scheduler queue is full.
    #[error("scheduler queue is full")]
    QueueFull,
    /// Scheduler has been shut down.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// Result store failure.
    #[error("result store error: {0}")]
    Store(String),
    /// Invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Stable, protocol-neutral exception code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "InvalidParameterValue",
            Self::ProcessNotFound(_) => "NoSuchProcess",
            Self::JobNotFound(_) => "NoSuchJob",
            Self::QuotationNotFound(_) => "NoSuchQuotation",
            Self::BillNotFound(_) => "NoSuchBill",
            Self::Unsupported { .. } => "NoApplicableCode",
            Self::NotDismissable { .. } => "NotDismissable",
            Self::NotReady { .. } => "ResultNotReady",
            Self::Expired(_) => "QuotationExpired",
            Self::Timeout { .. } => "Timeout",
            Self::Execution(_) => "ExecutionFailed",
            Self::QueueFull | Self::Shutdown => "ServerBusy",
            Self::Store(_) | Self::Internal(_) => "InternalError",
        }
    }

    /// True for every unknown-identifier variant.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProcessNotFound(_)
                | Self::JobNotFound(_)
                | Self::QuotationNotFound(_)
                | Self::BillNotFound(_)
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
