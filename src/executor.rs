//! Glue: executor entry points (§4.9, §4.10, C13).
//!
//! Grounded on `lib.rs` + `collection_helpers.rs`'s `collect_seq`/`collect_par`
//! entry points, generalized from "drive one pipeline to a `Vec<T>`" into the
//! four submission entry points a caller (the out-of-scope RPC/session layer,
//! §1) actually needs: `execute_async` to run a resolved plan, `write_async`/
//! `load_async` to run one write/bulk-load statement, `resolve_async` to
//! resolve a prepared statement against its parameters, and `commit_async` to
//! hand a transaction to the external CC engine (§6) for commit.
//!
//! This module owns no state beyond a scheduler handle and a task-id
//! allocator for the first flat task of each submission — every task
//! generated after that (resubmissions, teardown, step-driven wrapped tasks)
//! mints its own id through the scheduler or the `Flow` that produced it.

use std::sync::Arc;

use crate::flat_task::{FlatTask, FlatTaskKind, StatementContext, StatementExecutor};
use crate::ids::{IdSequence, JobId, TaskId};
use crate::request::RequestContext;
use crate::scheduler::Scheduler;
use crate::step::PlanGraph;
use crate::transaction::{CcEngine, CommitKind, TransactionContext};

/// Entry points a caller uses to drive one statement's execution (§4.9, C13).
///
/// Owns a scheduler handle and, optionally, a handle to the external CC
/// engine for `commit_async` — the engine has no opinion on what kind of CC
/// engine that is (§1 non-goal), only that it implements [`CcEngine`].
pub struct Executor {
    scheduler: Arc<dyn Scheduler>,
    cc_engine: Option<Arc<dyn CcEngine>>,
    task_ids: IdSequence,
}

impl Executor {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler, cc_engine: None, task_ids: IdSequence::new() }
    }

    pub fn with_cc_engine(mut self, cc_engine: Arc<dyn CcEngine>) -> Self {
        self.cc_engine = Some(cc_engine);
        self
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::from_raw(self.task_ids.next())
    }

    /// Begin executing a resolved physical plan (§4.8 "bootstrap"): registers
    /// the job and submits the bootstrap flat task that will initialize the
    /// DAG controller and start draining its events.
    pub fn execute_async(&self, graph: PlanGraph, request: Arc<RequestContext>) -> JobId {
        let job_id = request.job.id;
        self.scheduler.register_job(request.job.clone());
        request.job.mark_started();
        let task = FlatTask::new(self.next_task_id(), request, FlatTaskKind::Bootstrap { graph });
        self.scheduler.submit(task);
        job_id
    }

    /// Run one write statement's body (§4.9 "write"): the executor's
    /// `run` is invoked under the request's transaction once any pending
    /// cancellation check passes.
    pub fn write_async(&self, request: Arc<RequestContext>, executor: Box<dyn StatementExecutor>) -> JobId {
        self.submit_statement_task(request, FlatTaskKind::Write { executor })
    }

    /// Run one bulk-load statement's body (§4.9 "load"). Same contract as
    /// [`Self::write_async`], distinguished only by task kind (so
    /// diagnostics/metrics can tell load jobs from write jobs, §4.10).
    pub fn load_async(&self, request: Arc<RequestContext>, executor: Box<dyn StatementExecutor>) -> JobId {
        self.submit_statement_task(request, FlatTaskKind::Load { executor })
    }

    fn submit_statement_task(&self, request: Arc<RequestContext>, kind: FlatTaskKind) -> JobId {
        let job_id = request.job.id;
        self.scheduler.register_job(request.job.clone());
        request.job.mark_started();
        let task = FlatTask::new(self.next_task_id(), request, kind);
        self.scheduler.submit(task);
        job_id
    }

    /// Resolve a prepared statement against its bound parameters (§4.9
    /// "resolve"). `statement` already carries the callback the caller wants
    /// invoked with the resolution result — statement compilation itself is
    /// out of scope (§1: "we consume an already-resolved plan tree"), so this
    /// only schedules the cancellation-gated callback invocation through the
    /// flat-task machinery, exactly as write/load schedule their bodies.
    pub fn resolve_async(&self, request: Arc<RequestContext>, statement: StatementContext) -> JobId {
        let job_id = request.job.id;
        self.scheduler.register_job(request.job.clone());
        request.job.mark_started();
        let task = FlatTask::new(self.next_task_id(), request, FlatTaskKind::Resolve { statement });
        self.scheduler.submit(task);
        job_id
    }

    /// Hand `tx` to the external CC engine for commit (§6 "commit_kind ∈
    /// {accepted, available, stored, propagated}"). Refuses to commit a
    /// transaction still doing work or already marked for abort — the caller
    /// is expected to have waited for the owning job to finish first.
    ///
    /// # Errors
    /// Returns an error if no CC engine handle was configured, the
    /// transaction still has outstanding workers, or it is going to (or has
    /// already) aborted.
    pub fn commit_async(&self, tx: &TransactionContext) -> anyhow::Result<CommitKind> {
        let cc_engine = self
            .cc_engine
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("commit_async: no CC engine configured"))?;
        if tx.worker_count() > 0 {
            anyhow::bail!("commit_async: transaction still has {} outstanding worker(s)", tx.worker_count());
        }
        if tx.is_going_to_abort() || tx.is_aborted() {
            anyhow::bail!("commit_async: transaction is aborting or aborted, cannot commit");
        }
        Ok(cc_engine.commit(tx))
    }
}
