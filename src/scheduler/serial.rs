//! Serial scheduler (§4.10: "deque per thread; `wait_for_progress` drains
//! ready tasks round-robin with conditional tasks; used for tests and
//! `single_thread` configuration").
//!
//! Unlike [`super::parallel::ParallelScheduler`], there are no background
//! worker threads: everything runs synchronously on whichever thread calls
//! [`SerialScheduler::wait_for_progress`], which makes it deterministic and
//! well suited to unit/integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::flat_task::{FlatTask, FlatTaskKind};
use crate::ids::{JobId, TaskId};
use crate::job::JobContext;

use super::{
    drive, submission_counts, ConditionalTask, DriveOutcome, JobDiagnostics, JobRegistry, Scheduler,
    SchedulerDiagnostics, WorkerDiagnostics,
};

pub struct SerialScheduler {
    registry: JobRegistry,
    ready: Mutex<VecDeque<FlatTask>>,
    conditional: Mutex<Vec<ConditionalTask>>,
    task_ids: crate::ids::IdSequence,
}

impl Default for SerialScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialScheduler {
    pub fn new() -> Self {
        Self {
            registry: JobRegistry::default(),
            ready: Mutex::new(VecDeque::new()),
            conditional: Mutex::new(Vec::new()),
            task_ids: crate::ids::IdSequence::new(),
        }
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::from_raw(self.task_ids.next())
    }

    fn enqueue(&self, task: FlatTask) {
        if submission_counts(&task.kind) {
            task.request.job.inc_task_count();
        }
        self.ready.lock().unwrap().push_back(task);
    }

    fn promote_ready_conditionals(&self) {
        let mut cond = self.conditional.lock().unwrap();
        let mut still_waiting = Vec::with_capacity(cond.len());
        for c in cond.drain(..) {
            if (c.guard)() {
                self.ready.lock().unwrap().push_back(c.task);
            } else {
                still_waiting.push(c);
            }
        }
        *cond = still_waiting;
    }

    /// Drain the ready queue (promoting conditional tasks as their guards
    /// pass) until no more progress can be made.
    fn run_until_dry(&self) {
        loop {
            self.promote_ready_conditionals();
            let Some(task) = self.ready.lock().unwrap().pop_front() else {
                break;
            };
            let counted = submission_counts(&task.kind);
            let job = task.request.job.clone();
            let outcome = drive(task, &|| self.next_task_id(), &|t| self.enqueue(t));
            match outcome {
                DriveOutcome::Finished => {
                    if counted {
                        job.dec_task_count();
                    }
                }
                DriveOutcome::Resubmit(t) => self.ready.lock().unwrap().push_back(t),
            }
        }
    }
}

impl Scheduler for SerialScheduler {
    fn submit(&self, task: FlatTask) {
        self.enqueue(task);
    }

    fn submit_conditional(&self, task: FlatTask, guard: Box<dyn Fn() -> bool + Send + Sync>) {
        if submission_counts(&task.kind) {
            task.request.job.inc_task_count();
        }
        self.conditional.lock().unwrap().push(ConditionalTask { task, guard });
    }

    fn register_job(&self, job: Arc<JobContext>) {
        self.registry.register(job);
    }

    fn unregister_job(&self, job_id: JobId) {
        self.registry.unregister(job_id);
    }

    /// Drains every ready and newly-ready-conditional task. A serial
    /// scheduler has no background progression, so a job whose conditional
    /// tasks never become ready simply won't finish — that's a test-harness
    /// bug, not something this scheduler can resolve by blocking forever.
    fn wait_for_progress(&self, job_id: JobId) {
        self.run_until_dry();
        if let Some(job) = self.registry.get(job_id) {
            if job.is_finished() {
                return;
            }
        }
    }

    fn diagnostics(&self) -> SchedulerDiagnostics {
        let jobs = self
            .registry
            .snapshot()
            .into_iter()
            .map(|job| JobDiagnostics {
                job_id: job.id,
                kind: job.kind,
                task_count: job.task_count(),
                completing: job.is_completing(),
            })
            .collect();
        let workers = vec![WorkerDiagnostics {
            worker_index: 0,
            queue_len: self.ready.lock().unwrap().len(),
            conditional_len: self.conditional.lock().unwrap().len(),
            tasks_executed: 0,
            steals_performed: 0,
        }];
        SchedulerDiagnostics { jobs, workers }
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::arena::PagePool;
    use crate::flat_task::{OperatorTask, TaskOutcome, TransactionCapability};
    use crate::job::JobKind;
    use crate::request::RequestContext;
    use crate::storage::fake::FakeStorageProvider;
    use crate::storage::StorageProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        id: TaskId,
        remaining: AtomicUsize,
        total: Arc<AtomicUsize>,
    }

    impl OperatorTask for CountingTask {
        fn id(&self) -> TaskId {
            self.id
        }
        fn transaction_capability(&self) -> TransactionCapability {
            TransactionCapability::None
        }
        fn poll(&mut self, _request: &RequestContext) -> TaskOutcome {
            self.total.fetch_add(1, Ordering::SeqCst);
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                TaskOutcome::Complete
            } else {
                TaskOutcome::Yield
            }
        }
    }

    fn setup() -> Arc<RequestContext> {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        Arc::new(RequestContext::new(job, None, storage, pages))
    }

    #[test]
    fn wrapped_task_resubmits_on_yield_and_completes_after_three_polls() {
        let sched = SerialScheduler::new();
        let req = setup();
        sched.register_job(req.job.clone());
        let total = Arc::new(AtomicUsize::new(0));
        let task = FlatTask::new(
            TaskId::from_raw(0),
            req.clone(),
            FlatTaskKind::Wrapped {
                task: Box::new(CountingTask { id: TaskId::from_raw(0), remaining: AtomicUsize::new(3), total: total.clone() }),
                sticky: false,
                in_transaction: false,
            },
        );
        sched.submit(task);
        sched.submit(FlatTask::new(TaskId::from_raw(1), req.clone(), FlatTaskKind::DagEvents));
        sched.wait_for_progress(req.job.id);
        assert_eq!(total.load(Ordering::SeqCst), 3);
        assert_eq!(req.job.task_count(), 0);
    }

    #[test]
    fn conditional_task_runs_once_guard_becomes_true() {
        let sched = SerialScheduler::new();
        let req = setup();
        sched.register_job(req.job.clone());
        let total = Arc::new(AtomicUsize::new(0));
        let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let task = FlatTask::new(
            TaskId::from_raw(0),
            req.clone(),
            FlatTaskKind::Wrapped {
                task: Box::new(CountingTask { id: TaskId::from_raw(0), remaining: AtomicUsize::new(1), total: total.clone() }),
                sticky: false,
                in_transaction: false,
            },
        );
        let ready2 = ready.clone();
        sched.submit_conditional(task, Box::new(move || ready2.load(Ordering::SeqCst)));
        sched.run_until_dry();
        assert_eq!(total.load(Ordering::SeqCst), 0);
        ready.store(true, Ordering::SeqCst);
        sched.run_until_dry();
        assert_eq!(total.load(Ordering::SeqCst), 1);
    }
}
