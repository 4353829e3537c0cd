//! Job context (§4.11): one end-to-end execution of a plan.
//!
//! Grounded on `metrics.rs`'s `Arc<Mutex<Inner>>` + atomics idiom for shared
//! mutable counters, applied to `task_count`/`completing`/`going_teardown`.
//! The completion latch is a small counting primitive with a single release
//! at job finish, built directly on `std::sync::Condvar` rather than pulling
//! in a dependency for it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::ids::JobId;

/// Whether a job reads or writes, used only by the diagnostics dump table
/// (§4.10) — a supplement recorded in DESIGN.md, not load-bearing for
/// execution semantics.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobKind {
    Read,
    Write,
}

/// A one-shot latch released exactly once, at job finish.
struct CompletionLatch {
    done: Mutex<bool>,
    cv: Condvar,
}

impl CompletionLatch {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn release(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cv.wait(done).unwrap();
        }
    }

    fn is_done(&self) -> bool {
        *self.done.lock().unwrap()
    }
}

/// Outcome handed to a job's finalize callback.
pub struct JobResult {
    pub error: Option<crate::error::ErrorInfo>,
}

/// One end-to-end execution of a plan (§3 "Job", §4.11).
pub struct JobContext {
    pub id: JobId,
    pub kind: JobKind,
    task_count: AtomicUsize,
    completing: AtomicBool,
    going_teardown: AtomicBool,
    started: AtomicBool,
    pub preferred_worker_index: Option<usize>,
    completion_readiness: Mutex<Option<Box<dyn Fn() -> bool + Send + Sync>>>,
    callback: Mutex<Option<Box<dyn FnOnce(JobResult) + Send>>>,
    latch: CompletionLatch,
}

impl JobContext {
    pub fn new(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            task_count: AtomicUsize::new(0),
            completing: AtomicBool::new(false),
            going_teardown: AtomicBool::new(false),
            started: AtomicBool::new(false),
            preferred_worker_index: None,
            completion_readiness: Mutex::new(None),
            callback: Mutex::new(None),
            latch: CompletionLatch::new(),
        }
    }

    pub fn with_preferred_worker(mut self, worker: Option<usize>) -> Self {
        self.preferred_worker_index = worker;
        self
    }

    pub fn set_completion_readiness(&self, f: impl Fn() -> bool + Send + Sync + 'static) {
        *self.completion_readiness.lock().unwrap() = Some(Box::new(f));
    }

    pub fn set_callback(&self, f: impl FnOnce(JobResult) + Send + 'static) {
        *self.callback.lock().unwrap() = Some(Box::new(f));
    }

    /// Record the first transition to "executing" (logged, per §4.11).
    pub fn mark_started(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment on every non-teardown task submission.
    pub fn inc_task_count(&self) -> usize {
        self.task_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement on task completion.
    pub fn dec_task_count(&self) -> usize {
        let prev = self.task_count.fetch_sub(1, Ordering::AcqRel);
        prev.saturating_sub(1)
    }

    pub fn task_count(&self) -> usize {
        self.task_count.load(Ordering::Acquire)
    }

    /// First caller wins; ensures teardown is scheduled at most once (§8
    /// "Idempotence").
    pub fn try_begin_teardown(&self) -> bool {
        self.completing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_completing(&self) -> bool {
        self.completing.load(Ordering::Acquire)
    }

    /// Fast-path flag an in-worker caller can set to skip straight to
    /// teardown without waiting on the next controller pass.
    pub fn mark_going_teardown(&self) {
        self.going_teardown.store(true, Ordering::Release);
    }

    pub fn is_going_teardown(&self) -> bool {
        self.going_teardown.load(Ordering::Acquire)
    }

    /// Whether teardown may finalize right now: task count is zero and any
    /// user-supplied readiness predicate agrees.
    pub fn teardown_ready(&self) -> bool {
        if self.task_count() != 0 {
            return false;
        }
        match self.completion_readiness.lock().unwrap().as_ref() {
            Some(f) => f(),
            None => true,
        }
    }

    /// Invoke the finalize callback (if any), then release the completion
    /// latch. May only be called once `teardown_ready()` holds.
    pub fn finish(&self, result: JobResult) {
        if let Some(cb) = self.callback.lock().unwrap().take() {
            cb(result);
        }
        self.latch.release();
    }

    pub fn wait_for_progress(&self) {
        self.latch.wait();
    }

    pub fn is_finished(&self) -> bool {
        self.latch.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_count_round_trips_to_baseline() {
        let job = JobContext::new(JobId::from_raw(1), JobKind::Read);
        for _ in 0..5 {
            job.inc_task_count();
        }
        for _ in 0..5 {
            job.dec_task_count();
        }
        assert_eq!(job.task_count(), 0);
    }

    #[test]
    fn teardown_cas_fires_once() {
        let job = JobContext::new(JobId::from_raw(1), JobKind::Read);
        assert!(job.try_begin_teardown());
        assert!(!job.try_begin_teardown());
    }

    #[test]
    fn finish_invokes_callback_once_and_releases_latch() {
        use std::sync::atomic::AtomicUsize as AU;
        use std::sync::Arc;
        let job = JobContext::new(JobId::from_raw(1), JobKind::Read);
        let calls = Arc::new(AU::new(0));
        let calls2 = calls.clone();
        job.set_callback(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(job.teardown_ready());
        job.finish(JobResult { error: None });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(job.is_finished());
        job.wait_for_progress();
    }
}
