//! Opaque identifiers and shared request options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Underlying UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

opaque_id!(
    /// Identifier of one tracked execution.
    JobId
);
opaque_id!(
    /// Identifier of a quotation.
    QuotationId
);
opaque_id!(
    /// Identifier of a bill.
    BillId
);

/// How the caller wants a process executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Block the caller until the output is available or the wait times out.
    Sync,
    /// Return a job id immediately; the caller polls for status.
    #[default]
    Async,
    /// Let the process descriptor pick its preferred mode.
    Auto,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Per-request execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Requested execution mode.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Synchronous wait bound; the configured default applies when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ExecuteOptions {
    /// Asynchronous execution.
    #[must_use]
    pub const fn asynchronous() -> Self {
        Self {
            mode: ExecutionMode::Async,
            timeout_secs: None,
        }
    }

    /// Synchronous execution with an optional wait bound.
    #[must_use]
    pub const fn synchronous(timeout_secs: Option<u64>) -> Self {
        Self {
            mode: ExecutionMode::Sync,
            timeout_secs,
        }
    }
}
