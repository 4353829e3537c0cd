//! Task scheduler (§4.9 "Flat task", §4.10 "Task scheduler"): the contract
//! shared by [`parallel::ParallelScheduler`] and [`serial::SerialScheduler`].
//!
//! Grounded on `runner.rs`'s `ExecMode::{Sequential, Parallel}` split, but
//! generalized from "fork a `rayon` scope once per `run_collect` call" into a
//! persistent worker-queue model: `runner.rs` forks exactly once per pipeline
//! run, while this engine hosts a long-lived stream of jobs each submitting
//! many flat tasks over time, so the fork-join shape doesn't fit and a real
//! per-worker queue + stealing model takes its place. Thread-pool knobs live
//! in [`crate::config::ThreadParams`].

pub mod parallel;
pub mod serial;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{ErrorCode, ErrorInfo};
use crate::flat_task::{FlatTask, FlatTaskKind};
use crate::ids::{JobId, TaskId};
use crate::job::{JobContext, JobResult};

/// A task gated on a predicate: held in a conditional queue until `guard`
/// returns true, then moved to the regular ready queue (§4.10 "Conditional
/// tasks", watched every `watcher_interval`).
pub struct ConditionalTask {
    pub task: FlatTask,
    pub guard: Box<dyn Fn() -> bool + Send + Sync>,
}

/// Per-job diagnostic snapshot (§4.10 "Diagnostics": "kind/status/SQL
/// text/tx id/task counter").
#[derive(Clone, Debug)]
pub struct JobDiagnostics {
    pub job_id: JobId,
    pub kind: crate::job::JobKind,
    pub task_count: usize,
    pub completing: bool,
}

/// Per-worker diagnostic snapshot.
#[derive(Clone, Debug)]
pub struct WorkerDiagnostics {
    pub worker_index: usize,
    pub queue_len: usize,
    pub conditional_len: usize,
    pub tasks_executed: u64,
    pub steals_performed: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SchedulerDiagnostics {
    pub jobs: Vec<JobDiagnostics>,
    pub workers: Vec<WorkerDiagnostics>,
}

/// Contract shared by [`parallel::ParallelScheduler`] and
/// [`serial::SerialScheduler`] (§4.10).
pub trait Scheduler: Send + Sync {
    /// Submit a new, independent task (not a resubmission of one already
    /// being driven — that's handled internally by each implementation's
    /// worker loop).
    fn submit(&self, task: FlatTask);

    /// Submit a task gated on `guard`; it only becomes ready once the guard
    /// passes.
    fn submit_conditional(&self, task: FlatTask, guard: Box<dyn Fn() -> bool + Send + Sync>);

    fn register_job(&self, job: Arc<JobContext>);
    fn unregister_job(&self, job_id: JobId);

    /// Block the calling thread until `job_id`'s completion latch releases.
    fn wait_for_progress(&self, job_id: JobId);

    fn diagnostics(&self) -> SchedulerDiagnostics;
}

/// Registry of live jobs, shared by both scheduler implementations (§4.10
/// "Job registry: job_id -> JobContext").
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<u64, Arc<JobContext>>>,
}

impl JobRegistry {
    pub fn register(&self, job: Arc<JobContext>) {
        self.jobs.lock().unwrap().insert(job.id.raw(), job);
    }

    pub fn unregister(&self, job_id: JobId) {
        self.jobs.lock().unwrap().remove(&job_id.raw());
    }

    pub fn get(&self, job_id: JobId) -> Option<Arc<JobContext>> {
        self.jobs.lock().unwrap().get(&job_id.raw()).cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<JobContext>> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

/// Whether submitting a task of this kind increments the job's task counter
/// (§4.9: "incremented on every non-teardown task submission").
pub(crate) fn submission_counts(kind: &FlatTaskKind) -> bool {
    !matches!(kind, FlatTaskKind::Teardown)
}

/// Result of driving one [`FlatTask`] to its next pause point.
pub(crate) enum DriveOutcome {
    /// The task finished; the caller should decrement its job's task counter
    /// if the original submission counted toward it.
    Finished,
    /// The task yielded (or, for teardown, isn't ready yet): resubmit it
    /// unchanged, without touching any counter.
    Resubmit(FlatTask),
}

/// If teardown hasn't already been scheduled for this job, schedule it now.
/// Used both by the fast path (a wrapped/write/load task signaling
/// `CompleteAndTeardown` or cancellation) and by the DAG controller's own
/// gate once every step has deactivated.
fn schedule_teardown_if_due(task: &FlatTask, next_task_id: &dyn Fn() -> TaskId, submit: &dyn Fn(FlatTask)) {
    task.request.job.mark_going_teardown();
    if task.request.job.try_begin_teardown() {
        submit(FlatTask::new(next_task_id(), task.request.clone(), FlatTaskKind::Teardown));
    }
}

fn drain_dag_events(task: &FlatTask, next_task_id: &dyn Fn() -> TaskId, submit: &dyn Fn(FlatTask)) {
    if let Some(dag) = task.request.dag() {
        for t in dag.drain_events() {
            submit(t);
        }
        if dag.try_schedule_teardown(&task.request.job) {
            submit(FlatTask::new(next_task_id(), task.request.clone(), FlatTaskKind::Teardown));
        }
    }
}

/// Run one flat task to its next pause point, following the per-kind
/// execution contract of §4.9:
///
/// - `dag_events` drains pending controller events once, never blocks.
/// - `bootstrap` initializes the controller, then drains events once.
/// - `wrapped` loops while `poll` returns `Proceed`; resubmits on `Yield`;
///   applies the transaction use-count discipline around the call.
/// - `write`/`load` check cancellation first, else run the statement body.
/// - `resolve` runs the statement's completion callback.
/// - `teardown` finishes the job if ready, else resubmits itself.
pub(crate) fn drive(
    mut task: FlatTask,
    next_task_id: &dyn Fn() -> TaskId,
    submit: &dyn Fn(FlatTask),
) -> DriveOutcome {
    let kind = std::mem::replace(&mut task.kind, FlatTaskKind::DagEvents);
    match kind {
        FlatTaskKind::DagEvents => {
            drain_dag_events(&task, next_task_id, submit);
            DriveOutcome::Finished
        }
        FlatTaskKind::Bootstrap { graph } => {
            let controller = Arc::new(crate::dag_controller::DagController::new(graph));
            task.request.set_dag(controller.clone());
            for t in controller.bootstrap() {
                submit(t);
            }
            drain_dag_events(&task, next_task_id, submit);
            DriveOutcome::Finished
        }
        FlatTaskKind::Wrapped { mut task: op, sticky, in_transaction } => {
            let tx = if in_transaction { task.request.transaction() } else { None };
            if let Some(tx) = &tx {
                if !tx.accepts_tasks() {
                    task.request.set_error(ErrorInfo::new(
                        ErrorCode::InactiveTransactionException,
                        "task rejected: transaction is going to abort",
                    ));
                    schedule_teardown_if_due(&task, next_task_id, submit);
                    return DriveOutcome::Finished;
                }
                tx.inc_worker_count();
            }
            // A sticky task holds its transaction's execution mutex across
            // both the poll loop and the worker-count decrement, so two
            // sticky tasks for the same transaction never run concurrently
            // even if they land on different workers (§4.9/§4.10).
            let _sticky_guard = if sticky { tx.as_ref().map(|t| t.execution_lock()) } else { None };
            let mut outcome = op.poll(&task.request);
            while outcome == crate::flat_task::TaskOutcome::Proceed {
                outcome = op.poll(&task.request);
            }
            if let Some(tx) = &tx {
                let remaining = tx.dec_worker_count();
                if remaining == 0 && tx.is_going_to_abort() {
                    tx.mark_aborted();
                }
            }
            drop(_sticky_guard);
            use crate::flat_task::TaskOutcome::*;
            match outcome {
                Proceed => unreachable!("loop above only exits on a non-Proceed outcome"),
                Yield => {
                    task.kind = FlatTaskKind::Wrapped { task: op, sticky, in_transaction };
                    DriveOutcome::Resubmit(task)
                }
                Complete => DriveOutcome::Finished,
                CompleteAndTeardown => {
                    schedule_teardown_if_due(&task, next_task_id, submit);
                    DriveOutcome::Finished
                }
            }
        }
        FlatTaskKind::Write { mut executor } | FlatTaskKind::Load { mut executor } => {
            if task.request.should_abort() {
                if task.request.is_cancel_requested() && !task.request.has_error() {
                    task.request.set_error(ErrorInfo::new(ErrorCode::RequestCanceled, "request canceled"));
                }
                schedule_teardown_if_due(&task, next_task_id, submit);
                return DriveOutcome::Finished;
            }
            match executor.run(&task.request) {
                Ok(crate::flat_task::TaskOutcome::CompleteAndTeardown) => {
                    schedule_teardown_if_due(&task, next_task_id, submit);
                }
                Ok(_) => {}
                Err(e) => {
                    task.request
                        .set_error(ErrorInfo::new(ErrorCode::SqlExecutionException, e.to_string()));
                    schedule_teardown_if_due(&task, next_task_id, submit);
                }
            }
            DriveOutcome::Finished
        }
        FlatTaskKind::Resolve { statement } => {
            // Resolution/compilation of the prepared statement itself is out
            // of scope (§1) — the callback, built by the executor, does that
            // and reports its own failures via `request.set_error`. Here we
            // only gate on cancellation, the same way write/load do.
            if task.request.should_abort() {
                (statement.callback)(Err(anyhow::anyhow!("request canceled before statement resolved")));
            } else {
                (statement.callback)(Ok(()));
            }
            DriveOutcome::Finished
        }
        FlatTaskKind::Teardown => {
            if task.request.job.teardown_ready() {
                let error = task.request.error();
                task.request.job.finish(JobResult { error });
                DriveOutcome::Finished
            } else {
                task.kind = FlatTaskKind::Teardown;
                DriveOutcome::Resubmit(task)
            }
        }
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::arena::PagePool;
    use crate::job::JobKind;
    use crate::request::RequestContext;
    use crate::storage::fake::FakeStorageProvider;
    use crate::storage::StorageProvider;

    fn make_request() -> Arc<RequestContext> {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        Arc::new(RequestContext::new(job, None, storage, pages))
    }

    #[test]
    fn dag_events_with_no_controller_set_is_a_harmless_no_op() {
        let req = make_request();
        let task = FlatTask::new(TaskId::from_raw(0), req, FlatTaskKind::DagEvents);
        let submitted = Mutex::new(Vec::new());
        let outcome = drive(task, &|| TaskId::from_raw(0), &|t| submitted.lock().unwrap().push(t.id));
        assert!(matches!(outcome, DriveOutcome::Finished));
        assert!(submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn teardown_resubmits_while_tasks_remain_outstanding() {
        let req = make_request();
        req.job.inc_task_count();
        let task = FlatTask::new(TaskId::from_raw(0), req.clone(), FlatTaskKind::Teardown);
        let outcome = drive(task, &|| TaskId::from_raw(1), &|_| panic!("teardown shouldn't submit"));
        assert!(matches!(outcome, DriveOutcome::Resubmit(_)));
        assert!(!req.job.is_finished());

        req.job.dec_task_count();
        let task = match outcome {
            DriveOutcome::Resubmit(t) => t,
            _ => unreachable!(),
        };
        let outcome = drive(task, &|| TaskId::from_raw(2), &|_| panic!("teardown shouldn't submit"));
        assert!(matches!(outcome, DriveOutcome::Finished));
        assert!(req.job.is_finished());
    }
}
