//! # Relational execution engine
//!
//! A DAG-driven, parallel relational-query execution engine: a plan compiler
//! hands this crate a graph of [`step`] nodes wired into [`exchange`]
//! boundaries; a [`dag_controller::DagController`] drives that graph through
//! its per-step lifecycle, emitting [`flat_task::FlatTask`]s that a
//! [`scheduler::Scheduler`] runs to completion over a worker pool, reading and
//! writing rows through a [`storage::StorageProvider`] under the scheduling
//! and abort discipline of a [`transaction::TransactionContext`].
//!
//! ## Execution model
//!
//! 1. A [`step::PlanGraph`] describes the steps of one statement and how
//!    their ports connect. [`dag_controller::DagController::new`] wraps it;
//!    [`dag_controller::DagController::bootstrap`] activates every
//!    source-like step and returns the flat tasks to run first.
//! 2. Each step's main work is a chain of relational [`operators`] — scan,
//!    find, join-find/-scan, filter, the group/cogroup family, and the
//!    terminal offer/emit pair — composed the way the step was planned and
//!    invoked per record/group/cogroup-tuple from a [`flat_task::OperatorTask`]
//!    wrapped in a [`flat_task::FlatTaskKind::Wrapped`] task.
//! 3. The controller posts external events (pretask/main-task completion) and
//!    drains internal ones (step activation/preparation/deactivation) as
//!    `dag_events` tasks run; once every step has deactivated, it schedules
//!    the job's teardown task exactly once.
//! 4. A [`request::RequestContext`] bundles the job, optional transaction,
//!    storage, and scratch-memory pool every flat task needs, plus a
//!    first-error-wins cell and a cooperative cancellation flag.
//!
//! ## Ambient stack
//!
//! - **Errors**: [`error::ErrorCode`]/[`error::ErrorInfo`] via `thiserror`,
//!   captured first-writer-wins in [`error::ErrorCell`].
//! - **Configuration**: [`config::EngineConfig`]/[`config::ThreadParams`].
//! - **Diagnostics**: [`diagnostics`] — scheduler/job/worker state dumps
//!   (per-job task counts, per-worker queue depth/tasks-executed/
//!   steals-performed, tracked as plain atomics on [`job::JobContext`] and
//!   the scheduler's own `Worker`), gated behind feature `diagnostics`.
//! - **Testing**: [`testing`] module plus `testing-fakes`-gated in-memory
//!   collaborators ([`storage::fake`], [`transaction::fake`]) so unit and
//!   integration tests exercise real operator/scheduler/controller code
//!   without a live storage/CC engine.
//!
//! See `DESIGN.md` for the grounding ledger mapping each module back to the
//! donor crate or the wider example pack, and `SPEC_FULL.md` for the full
//! requirements this crate implements.

pub mod arena;
pub mod config;
pub mod dag_controller;
pub mod error;
pub mod exchange;
pub mod executor;
pub mod expr;
pub mod flat_task;
pub mod ids;
pub mod io;
pub mod job;
pub mod operators;
pub mod record;
pub mod request;
pub mod scheduler;
pub mod step;
pub mod storage;
pub mod testing;
pub mod transaction;
pub mod variable_table;

#[cfg(feature = "diagnostics")]
pub mod diagnostics;

// Re-exports of the shapes most callers need.
pub use config::{EngineConfig, ThreadParams};
pub use dag_controller::DagController;
pub use error::{ErrorCategory, ErrorCode, ErrorInfo};
pub use executor::Executor;
pub use flat_task::{FlatTask, FlatTaskKind, OperatorTask, TaskOutcome};
pub use ids::{JobId, StepId, TaskId, TransactionId};
pub use job::{JobContext, JobKind, JobResult};
pub use record::{FieldType, FieldValue};
pub use request::RequestContext;
pub use scheduler::{parallel::ParallelScheduler, serial::SerialScheduler, Scheduler};
pub use step::{Flow, PlanGraph, Port, PortKind, Step};
pub use storage::StorageProvider;
pub use transaction::{TransactionContext, TransactionOptions, TransactionType};
