//! Flat task (§4.9): a discriminated task object unifying plan bootstrap, DAG
//! progression, wrapped operator tasks, write tasks, load tasks, and job
//! teardown.
//!
//! Grounded directly on
//! `examples/original_source/src/jogasaki/scheduler/flat_task.h`'s
//! `flat_task_kind` enum and per-kind payload fields, re-expressed as an
//! idiomatic Rust enum with per-variant payload rather than the C++
//! tag-dispatch constructor pattern.

use std::sync::Arc;

use crate::ids::TaskId;
use crate::request::RequestContext;
use crate::step::PlanGraph;

/// What an [`OperatorTask`] declares about its relationship to a transaction,
/// used by the scheduler's submission policy (§4.10) and by the transaction
/// discipline in §4.9.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransactionCapability {
    /// Does not touch a transaction.
    None,
    /// Touches a transaction but may run concurrently with other tasks of it.
    Shared,
    /// Touches a transaction and must serialize with other sticky tasks of it.
    Sticky,
}

/// Outcome of one [`OperatorTask::poll`] invocation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskOutcome {
    /// More work remains; the scheduler should poll again without yielding
    /// the worker to anything else.
    Proceed,
    /// Cooperative yield point; the task is resubmitted, letting the worker
    /// pick up other ready work first.
    Yield,
    /// The task is finished.
    Complete,
    /// The task is finished AND the job may short-circuit its teardown wait.
    /// Per the conservative resolution of §9's open question, only sink
    /// operators (`emit`/`offer`) and write/load flat tasks may return this.
    CompleteAndTeardown,
}

/// A unit of work an operator chain runs to completion (conceptually a
/// generator: `proceed`/`yield`/`complete`, modeled as an explicit enum return
/// rather than a language-level coroutine, per §9).
pub trait OperatorTask: Send {
    fn id(&self) -> TaskId;
    fn transaction_capability(&self) -> TransactionCapability;
    fn poll(&mut self, request: &RequestContext) -> TaskOutcome;
}

/// Executes the body of a write or load (dump) statement. Consulted for
/// cancellation at entry; returns the outcome the owning flat task should
/// report (normally `Complete`, or `CompleteAndTeardown` once the statement
/// has fully finished and nothing else needs to run first).
pub trait StatementExecutor: Send {
    fn run(&mut self, request: &RequestContext) -> anyhow::Result<TaskOutcome>;
}

/// A prepared statement plus bound parameters plus a completion callback, as
/// submitted by the `resolve` flat task kind.
pub struct StatementContext {
    pub statement_name: String,
    pub parameters: Vec<crate::record::FieldValue>,
    pub callback: Box<dyn FnOnce(anyhow::Result<()>) + Send>,
}

/// Discriminant + payload for one flat task.
pub enum FlatTaskKind {
    /// Invoke the wrapped operator task in a loop while it returns `Proceed`.
    Wrapped {
        task: Box<dyn OperatorTask>,
        sticky: bool,
        in_transaction: bool,
    },
    /// Drain the DAG controller's pending internal events (one pass).
    DagEvents,
    /// Initialize the DAG controller with the step graph, then drain events.
    Bootstrap { graph: PlanGraph },
    /// Run the statement body under the transaction.
    Write { executor: Box<dyn StatementExecutor> },
    /// Run a dump/load statement body under the transaction.
    Load { executor: Box<dyn StatementExecutor> },
    /// Resolve a prepared statement with parameters.
    Resolve { statement: StatementContext },
    /// Finish the job once the task counter has quiesced.
    Teardown,
}

impl std::fmt::Debug for FlatTaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlatTaskKind::Wrapped { .. } => "Wrapped",
            FlatTaskKind::DagEvents => "DagEvents",
            FlatTaskKind::Bootstrap { .. } => "Bootstrap",
            FlatTaskKind::Write { .. } => "Write",
            FlatTaskKind::Load { .. } => "Load",
            FlatTaskKind::Resolve { .. } => "Resolve",
            FlatTaskKind::Teardown => "Teardown",
        };
        f.write_str(name)
    }
}

/// A uniform task object submitted to the scheduler, tagged by role.
pub struct FlatTask {
    pub id: TaskId,
    pub request: Arc<RequestContext>,
    pub kind: FlatTaskKind,
}

impl FlatTask {
    pub fn new(id: TaskId, request: Arc<RequestContext>, kind: FlatTaskKind) -> Self {
        Self { id, request, kind }
    }

    /// Whether this task's execution must serialize on its transaction's
    /// mutex, per the "sticky task" discipline of §4.9/§4.10.
    pub fn is_sticky(&self) -> bool {
        matches!(self.kind, FlatTaskKind::Wrapped { sticky: true, .. })
    }

    /// Whether this task is associated with a transaction at all (used for
    /// the task-use-count discipline of §4.9).
    pub fn touches_transaction(&self) -> bool {
        matches!(
            self.kind,
            FlatTaskKind::Wrapped {
                in_transaction: true,
                ..
            }
        ) || matches!(self.kind, FlatTaskKind::Write { .. } | FlatTaskKind::Load { .. })
    }
}
