//! Job lifecycle events and the sink tasks emit them through.
//!
//! Every job owns one unbounded channel. The task (progress, pause, resume)
//! and the job runner (started, completed, failed, dismissed) send into it;
//! a single writer drains it in order, so all mutations for one job id are
//! linearized.

use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::core::process::TaskError;
use crate::util::JobId;

/// Event emitted while a job executes.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// The task was picked up by a worker.
    Started,
    /// Progress tick, optionally carrying an intermediate result.
    Progressing {
        /// Completion percentage, clamped to 100.
        percent: u8,
        /// Intermediate output.
        partial: Option<Value>,
    },
    /// The task paused itself.
    Paused,
    /// The task resumed after a pause.
    Resumed,
    /// Final result, already passed through the result extractor.
    Completed(Value),
    /// The task failed.
    Failed(TaskError),
    /// The task observed a cancellation request.
    Dismissed,
}

impl JobEvent {
    /// Short name used in log fields.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progressing { .. } => "progressing",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Dismissed => "dismissed",
        }
    }
}

/// Handle through which a task reports progress for its job.
///
/// Cheap to clone. Sending never blocks; events emitted after the job's writer
/// has gone away are dropped.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    job_id: JobId,
    tx: UnboundedSender<JobEvent>,
}

impl ProgressSink {
    /// Create a sink and the receiving end consumed by the job's writer.
    #[must_use]
    pub fn channel(job_id: JobId) -> (Self, UnboundedReceiver<JobEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { job_id, tx }, rx)
    }

    /// A sink whose events go nowhere; useful when driving a descriptor directly.
    #[must_use]
    pub fn detached(job_id: JobId) -> Self {
        Self::channel(job_id).0
    }

    /// Job this sink reports for.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Report completion percentage.
    pub fn progress(&self, percent: u8) {
        self.emit(JobEvent::Progressing {
            percent: percent.min(100),
            partial: None,
        });
    }

    /// Report completion percentage together with an intermediate result.
    pub fn progress_with_partial(&self, percent: u8, partial: Value) {
        self.emit(JobEvent::Progressing {
            percent: percent.min(100),
            partial: Some(partial),
        });
    }

    /// Report that the task paused.
    pub fn paused(&self) {
        self.emit(JobEvent::Paused);
    }

    /// Report that the task resumed.
    pub fn resumed(&self) {
        self.emit(JobEvent::Resumed);
    }

    pub(crate) fn started(&self) {
        self.emit(JobEvent::Started);
    }

    pub(crate) fn completed(&self, output: Value) {
        self.emit(JobEvent::Completed(output));
    }

    pub(crate) fn failed(&self, error: TaskError) {
        self.emit(JobEvent::Failed(error));
    }

    pub(crate) fn dismissed(&self) {
        self.emit(JobEvent::Dismissed);
    }

    fn emit(&self, event: JobEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            debug!(job_id = %self.job_id, event = name, "job event dropped, writer gone");
        }
    }
}
