//! Parallel work-stealing scheduler (§4.10).
//!
//! Each worker owns a local ready queue and a local conditional-task queue.
//! Submission policy: non-sticky tasks go to the preferred worker for the
//! current thread (or round-robin); sticky tasks bind their transaction to a
//! worker on first use and must stay there. Idle workers steal from a fixed
//! rotation of peers, backing off per [`crate::config::ThreadParams`]'s
//! `task_polling_wait`/`worker_try_count` before parking for
//! `worker_suspend_timeout`.
//!
//! Grounded on `runner.rs`'s `ExecMode::Parallel` (which spins up a
//! `rayon::ThreadPoolBuilder` pool sized from `ExecMode::Parallel { threads,
//! .. }`), generalized here into a persistent pool of `std::thread` workers
//! since `rayon`'s fork-join scopes don't host the long-lived per-worker
//! queues, stealing accounting, and sticky affinity this scheduler needs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::config::ThreadParams;
use crate::flat_task::{FlatTask, FlatTaskKind};
use crate::ids::{IdSequence, JobId, TaskId};
use crate::job::JobContext;

use super::{
    drive, submission_counts, ConditionalTask, DriveOutcome, JobDiagnostics, JobRegistry, Scheduler,
    SchedulerDiagnostics, WorkerDiagnostics,
};

struct Worker {
    queue: Mutex<VecDeque<FlatTask>>,
    conditional: Mutex<Vec<ConditionalTask>>,
    cv: Condvar,
    tasks_executed: AtomicU64,
    steals_performed: AtomicU64,
}

impl Worker {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            conditional: Mutex::new(Vec::new()),
            cv: Condvar::new(),
            tasks_executed: AtomicU64::new(0),
            steals_performed: AtomicU64::new(0),
        }
    }
}

/// Work-stealing parallel scheduler. Construct with [`ParallelScheduler::new`]
/// (spawns `params.threads` background workers); dropping the returned `Arc`'s
/// last handle joins them.
pub struct ParallelScheduler {
    workers: Vec<Worker>,
    params: ThreadParams,
    registry: JobRegistry,
    task_ids: IdSequence,
    next_worker: AtomicUsize,
    shutdown: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ParallelScheduler {
    pub fn new(params: ThreadParams) -> Arc<Self> {
        let threads = params.threads.max(1);
        let sched = Arc::new(Self {
            workers: (0..threads).map(|_| Worker::new()).collect(),
            params,
            registry: JobRegistry::default(),
            task_ids: IdSequence::new(),
            next_worker: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        });
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let sched = sched.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("scheduler-worker-{index}"))
                    .spawn(move || sched.worker_loop(index))
                    .expect("failed to spawn scheduler worker thread"),
            );
        }
        *sched.handles.lock().unwrap() = handles;
        sched
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::from_raw(self.task_ids.next())
    }

    fn round_robin(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Decide which worker a task should land on (§4.10 "Submission
    /// policy"): a job's explicit preference wins outright; sticky tasks bind
    /// (or rebind-enforce) their transaction to a worker; otherwise prefer the
    /// submitting worker when configured to, falling back to round-robin.
    fn choose_worker(&self, task: &FlatTask, current_worker: Option<usize>) -> usize {
        if let Some(pref) = task.request.job.preferred_worker_index {
            return pref.min(self.workers.len() - 1);
        }
        if task.is_sticky() {
            if let Some(tx) = task.request.transaction() {
                let candidate = current_worker.unwrap_or_else(|| self.round_robin());
                return tx.bind_sticky_worker(candidate).min(self.workers.len() - 1);
            }
        }
        if self.params.use_preferred_worker_for_current_thread {
            if let Some(w) = current_worker {
                return w;
            }
        }
        self.round_robin()
    }

    fn push_to(&self, index: usize, task: FlatTask) {
        let worker = &self.workers[index];
        worker.queue.lock().unwrap().push_back(task);
        worker.cv.notify_one();
    }

    fn submit_internal(&self, task: FlatTask, current_worker: Option<usize>) {
        if submission_counts(&task.kind) {
            task.request.job.inc_task_count();
        }
        let index = self.choose_worker(&task, current_worker);
        self.push_to(index, task);
    }

    /// Rotate through peers starting just after `index`, taking the first
    /// non-sticky task found on someone else's queue (§4.10 "work-stealing
    /// via fixed rotation probing peers"). Sticky tasks are bound to the
    /// worker their transaction rebinds to (`choose_worker`) and must
    /// execute one at a time there — stealing one onto another worker would
    /// let two sticky tasks for the same transaction run concurrently.
    fn try_steal(&self, index: usize) -> Option<FlatTask> {
        let n = self.workers.len();
        for offset in 1..n {
            let peer = (index + offset) % n;
            let mut queue = self.workers[peer].queue.lock().unwrap();
            if let Some(pos) = queue.iter().rposition(|t| !t.is_sticky()) {
                let task = queue.remove(pos).expect("rposition found this index");
                drop(queue);
                self.workers[index].steals_performed.fetch_add(1, Ordering::Relaxed);
                return Some(task);
            }
        }
        None
    }

    fn promote_ready_conditionals(&self, index: usize) {
        let worker = &self.workers[index];
        let mut cond = worker.conditional.lock().unwrap();
        let mut still_waiting = Vec::with_capacity(cond.len());
        for c in cond.drain(..) {
            if (c.guard)() {
                worker.queue.lock().unwrap().push_back(c.task);
            } else {
                still_waiting.push(c);
            }
        }
        *cond = still_waiting;
    }

    fn run_one(&self, index: usize, task: FlatTask) {
        let counted = submission_counts(&task.kind);
        let job = task.request.job.clone();
        let outcome = drive(task, &|| self.next_task_id(), &|t| self.submit_internal(t, Some(index)));
        self.workers[index].tasks_executed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            DriveOutcome::Finished => {
                if counted {
                    job.dec_task_count();
                }
            }
            DriveOutcome::Resubmit(t) => self.push_to(index, t),
        }
    }

    fn worker_loop(&self, index: usize) {
        let mut empty_polls: u32 = 0;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            self.promote_ready_conditionals(index);
            if let Some(task) = self.workers[index].queue.lock().unwrap().pop_front() {
                empty_polls = 0;
                self.run_one(index, task);
                continue;
            }
            if self.params.stealing_enabled {
                if let Some(task) = self.try_steal(index) {
                    empty_polls = 0;
                    self.run_one(index, task);
                    continue;
                }
            }
            empty_polls += 1;
            if empty_polls < self.params.worker_try_count {
                std::thread::sleep(self.params.task_polling_wait.min(self.params.stealing_wait));
                continue;
            }
            // Suspend: park on our own queue's condvar until woken by a
            // submission or the suspend timeout elapses, whichever comes
            // first (§4.10 "worker_suspend_timeout parks").
            let guard = self.workers[index].queue.lock().unwrap();
            let _ = self.workers[index].cv.wait_timeout(guard, self.params.worker_suspend_timeout);
            empty_polls = 0;
        }
    }
}

impl Drop for ParallelScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for w in &self.workers {
            w.cv.notify_all();
        }
        for h in self.handles.lock().unwrap().drain(..) {
            let _ = h.join();
        }
    }
}

impl Scheduler for ParallelScheduler {
    fn submit(&self, task: FlatTask) {
        self.submit_internal(task, None);
    }

    fn submit_conditional(&self, task: FlatTask, guard: Box<dyn Fn() -> bool + Send + Sync>) {
        if submission_counts(&task.kind) {
            task.request.job.inc_task_count();
        }
        let index = self.round_robin();
        let worker = &self.workers[index];
        worker.conditional.lock().unwrap().push(ConditionalTask { task, guard });
        worker.cv.notify_one();
    }

    fn register_job(&self, job: Arc<JobContext>) {
        self.registry.register(job);
    }

    fn unregister_job(&self, job_id: JobId) {
        self.registry.unregister(job_id);
    }

    fn wait_for_progress(&self, job_id: JobId) {
        if let Some(job) = self.registry.get(job_id) {
            job.wait_for_progress();
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
        let workers = self
            .workers
            .iter()
            .enumerate()
            .map(|(index, w)| WorkerDiagnostics {
                worker_index: index,
                queue_len: w.queue.lock().unwrap().len(),
                conditional_len: w.conditional.lock().unwrap().len(),
                tasks_executed: w.tasks_executed.load(Ordering::Relaxed),
                steals_performed: w.steals_performed.load(Ordering::Relaxed),
            })
            .collect();
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
    use crate::transaction::{TransactionContext, TransactionOptions};
    use std::sync::atomic::AtomicUsize as AU;
    use std::time::Duration;

    fn test_params() -> ThreadParams {
        ThreadParams {
            threads: 4,
            task_polling_wait: Duration::from_micros(50),
            stealing_wait: Duration::from_micros(50),
            worker_try_count: 5,
            worker_suspend_timeout: Duration::from_millis(2),
            ..ThreadParams::default()
        }
    }

    struct OnceTask {
        id: TaskId,
        total: Arc<AU>,
    }

    impl OperatorTask for OnceTask {
        fn id(&self) -> TaskId {
            self.id
        }
        fn transaction_capability(&self) -> TransactionCapability {
            TransactionCapability::None
        }
        fn poll(&mut self, _request: &RequestContext) -> TaskOutcome {
            self.total.fetch_add(1, Ordering::SeqCst);
            TaskOutcome::CompleteAndTeardown
        }
    }

    fn setup_request(tx: Option<Arc<TransactionContext>>) -> Arc<RequestContext> {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        Arc::new(RequestContext::new(job, tx, storage, pages))
    }

    #[test]
    fn many_independent_tasks_all_run_and_job_completes() {
        let sched = ParallelScheduler::new(test_params());
        let req = setup_request(None);
        sched.register_job(req.job.clone());
        let total = Arc::new(AU::new(0));
        for i in 0..20 {
            let task = FlatTask::new(
                TaskId::from_raw(i),
                req.clone(),
                FlatTaskKind::Wrapped {
                    task: Box::new(OnceTask { id: TaskId::from_raw(i), total: total.clone() }),
                    sticky: false,
                    in_transaction: false,
                },
            );
            sched.submit(task);
        }
        sched.wait_for_progress(req.job.id);
        assert_eq!(total.load(Ordering::SeqCst), 20);
        assert!(req.job.is_finished());
    }

    /// Records the OS thread each task actually ran on, not the transaction's
    /// recorded `sticky_worker()` binding — that value is shared state every
    /// task reads identically regardless of which worker really executed it,
    /// so it can't catch a sticky task that got stolen onto another worker.
    struct RecordThreadTask {
        id: TaskId,
        seen: Arc<Mutex<Vec<std::thread::ThreadId>>>,
        done: Arc<AU>,
        release: Arc<AtomicBool>,
    }
    impl OperatorTask for RecordThreadTask {
        fn id(&self) -> TaskId {
            self.id
        }
        fn transaction_capability(&self) -> TransactionCapability {
            TransactionCapability::Sticky
        }
        fn poll(&mut self, _request: &RequestContext) -> TaskOutcome {
            // Block until every task in this batch has been submitted (and
            // thus bound to a worker) before any of them runs, so idle peers
            // have a real chance to try stealing from the bound worker's
            // queue while it works through the rest.
            while !self.release.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            self.seen.lock().unwrap().push(std::thread::current().id());
            self.done.fetch_add(1, Ordering::SeqCst);
            TaskOutcome::CompleteAndTeardown
        }
    }

    fn submit_sticky_batch(
        sched: &ParallelScheduler,
        req: &Arc<RequestContext>,
        first_id: u64,
        count: u64,
        seen: &Arc<Mutex<Vec<std::thread::ThreadId>>>,
    ) -> Arc<AU> {
        let done = Arc::new(AU::new(0));
        let release = Arc::new(AtomicBool::new(false));
        for i in first_id..first_id + count {
            let task = FlatTask::new(
                TaskId::from_raw(i),
                req.clone(),
                FlatTaskKind::Wrapped {
                    task: Box::new(RecordThreadTask {
                        id: TaskId::from_raw(i),
                        seen: seen.clone(),
                        done: done.clone(),
                        release: release.clone(),
                    }),
                    sticky: true,
                    in_transaction: true,
                },
            );
            sched.submit(task);
        }
        release.store(true, Ordering::SeqCst);
        while done.load(Ordering::SeqCst) < count {
            std::thread::sleep(Duration::from_millis(1));
        }
        done
    }

    #[test]
    fn sticky_tasks_for_one_transaction_always_execute_on_one_thread() {
        let tx = Arc::new(TransactionContext::new(crate::ids::TransactionId::from_raw(1), TransactionOptions::default()));
        let sched = ParallelScheduler::new(test_params());
        let req = setup_request(Some(tx.clone()));
        sched.register_job(req.job.clone());
        let seen_threads = Arc::new(Mutex::new(Vec::new()));

        submit_sticky_batch(&sched, &req, 0, 10, &seen_threads);
        // Every task decrements the worker count right after it polls, inside
        // the same `drive()` call that recorded its thread id above; wait for
        // that to fully quiesce so the binding actually clears before rebinding.
        while tx.worker_count() > 0 {
            std::thread::yield_now();
        }
        assert!(tx.sticky_worker().is_none());

        submit_sticky_batch(&sched, &req, 10, 10, &seen_threads);

        let seen = seen_threads.lock().unwrap();
        assert_eq!(seen.len(), 20);
        let first_batch = seen[0];
        assert!(
            seen[..10].iter().all(|t| *t == first_batch),
            "every task in the first batch must execute on the same thread"
        );
        let second_batch = seen[10];
        assert!(
            seen[10..].iter().all(|t| *t == second_batch),
            "every task in the second batch must execute on the same thread"
        );
    }
}
