//! Process descriptors, runnable tasks and result extraction.
//!
//! These are the capabilities the orchestrator consumes: a [`ProcessCatalog`]
//! resolves identifiers to [`ProcessDescriptor`]s, and a descriptor turns a
//! request payload into a [`PreparedTask`] (the task plus its result
//! extractor). The orchestrator never inspects params or outputs; both are
//! opaque `serde_json::Value`s.
//!
//! # Example
//!
//! ```rust,ignore
//! use process_orchestrator::core::{PreparedTask, ProcessDescriptor, ProgressSink, TaskError};
//! use serde_json::{json, Value};
//!
//! struct Echo;
//!
//! impl ProcessDescriptor for Echo {
//!     fn process_id(&self) -> &str {
//!         "echo"
//!     }
//!
//!     fn create_task(&self, params: Value, progress: ProgressSink) -> Result<PreparedTask, TaskError> {
//!         Ok(PreparedTask::from_fn(move |_cancel| async move {
//!             progress.progress(100);
//!             Ok(json!({ "echo": params }))
//!         }))
//!     }
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::error::OrchestratorError;
use crate::core::events::ProgressSink;
use crate::util::ExecutionMode;

/// Failure reported by a running task or by task construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The task observed its cancellation token and stopped.
    #[error("execution cancelled")]
    Cancelled,
    /// Params were rejected by the process.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Any other task failure, with the cause chain flattened into text.
    #[error("{message}")]
    Failed {
        /// Top-level failure description.
        message: String,
        /// Underlying causes, outermost first.
        cause: Option<String>,
    },
    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Failure without a cause.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            cause: None,
        }
    }

    /// Human-readable error report stored as the job message.
    #[must_use]
    pub fn report(&self) -> String {
        match self {
            Self::Failed {
                message,
                cause: Some(cause),
            } => format!("{message}: {cause}"),
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        Self::Failed {
            message: err.to_string(),
            cause: (!causes.is_empty()).then(|| causes.join(": ")),
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A runnable unit of work for one job.
///
/// Cancellation is cooperative: implementations should check `cancel` at
/// well-defined points and return [`TaskError::Cancelled`] once they observe it.
#[async_trait]
pub trait ProcessTask: Send + 'static {
    /// Run the task to completion and return its raw output.
    async fn run(self: Box<Self>, cancel: CancellationToken) -> Result<Value, TaskError>;
}

/// Closure-backed task, see [`PreparedTask::from_fn`].
pub struct FnTask<F>(F);

#[async_trait]
impl<F, Fut> ProcessTask for FnTask<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    async fn run(self: Box<Self>, cancel: CancellationToken) -> Result<Value, TaskError> {
        (self.0)(cancel).await
    }
}

/// Turns a task's raw output into the job's final result.
pub trait ResultExtractor: Send + Sync + 'static {
    /// Compute the final result.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] when the raw output cannot be turned into a result;
    /// the job then fails with that report.
    fn extract(&self, raw: Value) -> Result<Value, TaskError>;
}

/// Passes the raw output through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityExtractor;

impl ResultExtractor for IdentityExtractor {
    fn extract(&self, raw: Value) -> Result<Value, TaskError> {
        Ok(raw)
    }
}

impl<F> ResultExtractor for F
where
    F: Fn(Value) -> Result<Value, TaskError> + Send + Sync + 'static,
{
    fn extract(&self, raw: Value) -> Result<Value, TaskError> {
        self(raw)
    }
}

/// A task together with the extractor that computes its final result.
pub struct PreparedTask {
    pub(crate) task: Box<dyn ProcessTask>,
    pub(crate) extractor: Box<dyn ResultExtractor>,
}

impl PreparedTask {
    /// Wrap a task with the identity extractor.
    pub fn new(task: impl ProcessTask) -> Self {
        Self {
            task: Box::new(task),
            extractor: Box::new(IdentityExtractor),
        }
    }

    /// Build a task from an async closure receiving the cancellation token.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self::new(FnTask(f))
    }

    /// Replace the result extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: impl ResultExtractor) -> Self {
        self.extractor = Box::new(extractor);
        self
    }
}

/// Billable attributes a descriptor attaches to a quotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteEstimate {
    /// Price of one execution.
    pub amount: f64,
    /// ISO currency code.
    pub currency: String,
    /// Expected run time, when the process can estimate it.
    pub estimated_duration_secs: Option<u64>,
    /// Process-specific breakdown.
    pub details: Option<Value>,
}

impl Default for QuoteEstimate {
    fn default() -> Self {
        Self {
            amount: 0.0,
            currency: "EUR".to_string(),
            estimated_duration_secs: None,
            details: None,
        }
    }
}

/// Describes how to construct and run one process.
pub trait ProcessDescriptor: Send + Sync + 'static {
    /// Identifier the catalog resolves.
    fn process_id(&self) -> &str;

    /// Whether the process may run in `mode`.
    fn supports_mode(&self, mode: ExecutionMode) -> bool {
        let _ = mode;
        true
    }

    /// Mode used when the caller asks for [`ExecutionMode::Auto`].
    fn preferred_mode(&self) -> ExecutionMode {
        ExecutionMode::Async
    }

    /// Validate params for quoting and return the billable estimate.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] when the params cannot be quoted.
    fn quote(&self, params: &Value) -> Result<QuoteEstimate, TaskError> {
        let _ = params;
        Ok(QuoteEstimate::default())
    }

    /// Build the task for `params`. The task reports progress through `progress`.
    ///
    /// # Errors
    ///
    /// Construction failures are recorded as a failed job.
    fn create_task(&self, params: Value, progress: ProgressSink) -> Result<PreparedTask, TaskError>;
}

/// Resolves process identifiers to descriptors.
pub trait ProcessCatalog: Send + Sync {
    /// Look up a descriptor.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::ProcessNotFound`] for unknown identifiers.
    fn resolve(&self, process_id: &str) -> Result<Arc<dyn ProcessDescriptor>, OrchestratorError>;
}
