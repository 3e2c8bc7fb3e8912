//! Orchestration core: job lifecycle, scheduling, quotations and the coordinator.

pub mod coordinator;
pub mod error;
pub mod events;
pub(crate) mod event_writer;
pub mod job_registry;
pub mod process;
pub mod quotation_registry;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod sweeper;

pub use coordinator::{ExecuteOutcome, ExecutionCoordinator};
pub use error::{AppResult, OrchestratorError};
pub use event_writer::ABORTED_MESSAGE;
pub use events::{JobEvent, ProgressSink};
pub use job_registry::{JobRegistry, JobSnapshot, CANCELLED_MESSAGE};
pub use process::{
    FnTask, IdentityExtractor, PreparedTask, ProcessCatalog, ProcessDescriptor, ProcessTask,
    QuoteEstimate, ResultExtractor, TaskError,
};
pub use quotation_registry::{Bill, Quotation, QuotationRegistry, QuotationState};
pub use scheduler::{
    CancelHandle, JobFuture, JobHandle, JobOutcome, JobScheduler, SchedulerStats, Work,
};
pub use status::JobStatus;
pub use store::ResultStore;
pub use sweeper::ExpirationSweeper;
