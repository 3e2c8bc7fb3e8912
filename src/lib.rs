//! # Process Orchestrator
//!
//! An asynchronous process-execution orchestrator: given a catalog of runnable
//! processes, it accepts execution requests, runs them synchronously or
//! asynchronously on a dedicated worker pool, tracks per-job lifecycle state,
//! supports cooperative cancellation, and optionally wraps execution in a
//! quotation/billing protocol.
//!
//! ## Components
//!
//! - **`JobScheduler`**: bounded pool of OS worker threads, each driving its own
//!   current-thread tokio runtime, so slow processes never starve the caller's
//!   async runtime. Returns cancellable [`core::JobHandle`]s.
//! - **`JobRegistry`**: job id → lifecycle state, locked per entry. A dismissed
//!   job is latched; later writes for it are discarded.
//! - **`QuotationRegistry`**: quotations, their expiry and the bills issued
//!   against them.
//! - **`ExpirationSweeper`**: one background loop over a deadline heap.
//! - **`ExecutionCoordinator`**: the entry point tying it all together.
//!
//! ## Job lifecycle
//!
//! ```text
//! ACCEPTED ──► RUNNING ◄──► PAUSED ──► SUCCEEDED | FAILED | DISMISSED
//! ```
//!
//! Every event a running task emits goes through a single writer per job, so
//! progress, completion and failure are linearized against dismissal.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use process_orchestrator::builders::build_coordinator;
//! use process_orchestrator::config::OrchestratorConfig;
//! use process_orchestrator::infra::InMemoryProcessCatalog;
//! use process_orchestrator::runtime::TokioSpawner;
//! use process_orchestrator::util::ExecuteOptions;
//!
//! let catalog = Arc::new(InMemoryProcessCatalog::new().with(MyProcess));
//! let coordinator = build_coordinator(
//!     &OrchestratorConfig::from_env()?,
//!     catalog,
//!     TokioSpawner::try_current()?,
//! )?;
//!
//! let outcome = coordinator
//!     .submit("my-process", serde_json::json!({"n": 3}), ExecuteOptions::asynchronous())
//!     .await?;
//! let status = coordinator.get_status(outcome.job_id())?;
//! ```
//!
//! For complete scenarios, see `tests/coordinator_test.rs` and
//! `tests/quotation_test.rs`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct orchestrator components from configuration.
pub mod builders;
/// Configuration models for the scheduler, timeouts and store backends.
pub mod config;
/// Job lifecycle, scheduling, quotations and the coordinator.
pub mod core;
/// Collaborator implementations: process catalog and result stores.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
