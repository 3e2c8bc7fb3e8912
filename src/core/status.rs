//! Job lifecycle states and the transition table.
//!
//! ```text
//! ACCEPTED ──► RUNNING ◄──► PAUSED
//!    │            │            │
//!    └──────┬─────┴─────┬──────┘
//!           ▼           ▼
//!   FAILED / DISMISSED  SUCCEEDED (from RUNNING or PAUSED only)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a job in the orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Submitted; the task has not reported `started` yet.
    Accepted,
    /// Task is executing.
    Running,
    /// Task reported a pause.
    Paused,
    /// Task finished and a result is recorded.
    Succeeded,
    /// Task failed; the message carries the error report.
    Failed,
    /// Caller dismissed the job.
    Dismissed,
}

impl JobStatus {
    /// True for `Succeeded`, `Failed` and `Dismissed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Dismissed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Re-entering the current non-terminal state is allowed (progress ticks).
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Accepted, Self::Accepted | Self::Running | Self::Failed | Self::Dismissed)
            | (
                Self::Running,
                Self::Running | Self::Paused | Self::Succeeded | Self::Failed | Self::Dismissed,
            )
            | (
                Self::Paused,
                Self::Paused | Self::Running | Self::Succeeded | Self::Failed | Self::Dismissed,
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Dismissed => write!(f, "DISMISSED"),
        }
    }
}
