//! Transaction context (§3 "Transaction context", §4.9 "Transaction
//! discipline", §5 "Cancellation: Transaction termination").
//!
//! Wraps an opaque CC-engine transaction handle (out of scope per §1 — we
//! only need its contract, §6) with the scheduling metadata the engine itself
//! owns: sticky-worker affinity and a termination refcount that gates abort.
//!
//! Grounded on `metrics.rs`'s `Arc<Mutex<Inner>>` + atomics idiom for shared
//! mutable counters, applied here to the worker refcount / going-to-abort
//! flag instead of metric values.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::ids::TransactionId;

/// Transaction type the CC-engine contract distinguishes (§6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransactionType {
    /// Short, optimistic concurrency control.
    Occ,
    /// Long transaction.
    Ltx,
    /// Read-only.
    Rtx,
}

/// Options passed to `create_transaction` (§6).
#[derive(Clone, Debug)]
pub struct TransactionOptions {
    pub kind: TransactionType,
    pub write_preserves: Vec<String>,
    pub inclusive_read_areas: Vec<String>,
    pub exclusive_read_areas: Vec<String>,
    pub modifies_definitions: bool,
    pub scan_parallel: Option<usize>,
    /// Free-text diagnostic tag attached at creation time (supplement, see
    /// DESIGN.md — used only by the diagnostics dump).
    pub label: Option<String>,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            kind: TransactionType::Occ,
            write_preserves: Vec::new(),
            inclusive_read_areas: Vec::new(),
            exclusive_read_areas: Vec::new(),
            modifies_definitions: false,
            scan_parallel: None,
            label: None,
        }
    }
}

/// Commit callback kind (§6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CommitKind {
    Accepted,
    Available,
    Stored,
    Propagated,
}

/// Per-transaction scheduling state: sticky-worker affinity, worker refcount,
/// and the going-to-abort / termination discipline of §5.
///
/// The sticky worker index is set on the first sticky task submission and
/// cleared once the worker refcount decrements back to zero (§3 "a sticky
/// worker index ... cleared when worker count decrements to zero").
pub struct TransactionContext {
    pub id: TransactionId,
    pub options: TransactionOptions,
    sticky_worker: AtomicI64,
    worker_count: AtomicUsize,
    going_to_abort: AtomicBool,
    aborted: AtomicBool,
    enforced_rebind_count: AtomicUsize,
    /// Serializes sticky-task execution on this transaction (§4.9/§4.10):
    /// held across a sticky task's `poll` loop and its worker-count
    /// decrement, so at most one sticky task for this transaction is ever
    /// mid-execution, matching `flat_task.cpp`'s
    /// `std::unique_lock{tctx->mutex()}` spanning the same region.
    execution: Mutex<()>,
}

const NO_WORKER: i64 = -1;

impl TransactionContext {
    pub fn new(id: TransactionId, options: TransactionOptions) -> Self {
        Self {
            id,
            options,
            sticky_worker: AtomicI64::new(NO_WORKER),
            worker_count: AtomicUsize::new(0),
            going_to_abort: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            enforced_rebind_count: AtomicUsize::new(0),
            execution: Mutex::new(()),
        }
    }

    /// Acquire the sticky-execution mutex. Callers hold the returned guard
    /// across both the task's `poll` loop and the worker-count decrement
    /// that follows it.
    pub fn execution_lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.execution.lock().unwrap()
    }

    pub fn sticky_worker(&self) -> Option<usize> {
        match self.sticky_worker.load(Ordering::Acquire) {
            NO_WORKER => None,
            w => Some(w as usize),
        }
    }

    /// Bind (or confirm) this transaction to `candidate`. Returns the worker
    /// index the transaction is actually bound to: the first successful bind
    /// wins; later calls with a different `candidate` are rejected and bump
    /// the "enforced" counter (§4.10: "If the bound worker differs from the
    /// originally chosen candidate, record an 'enforced' counter").
    pub fn bind_sticky_worker(&self, candidate: usize) -> usize {
        match self
            .sticky_worker
            .compare_exchange(NO_WORKER, candidate as i64, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => candidate,
            Err(existing) => {
                let bound = existing as usize;
                if bound != candidate {
                    self.enforced_rebind_count.fetch_add(1, Ordering::Relaxed);
                }
                bound
            }
        }
    }

    pub fn enforced_rebind_count(&self) -> usize {
        self.enforced_rebind_count.load(Ordering::Relaxed)
    }

    /// Increment the worker use-count; the first increment after an unbound
    /// state is what triggers `bind_sticky_worker` at the call site.
    pub fn inc_worker_count(&self) -> usize {
        self.worker_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the worker use-count; when it reaches zero while
    /// `going_to_abort` is set, the caller must abort the transaction and the
    /// sticky worker index is cleared.
    pub fn dec_worker_count(&self) -> usize {
        let prev = self.worker_count.fetch_sub(1, Ordering::AcqRel);
        let now = prev.saturating_sub(1);
        if now == 0 {
            self.sticky_worker.store(NO_WORKER, Ordering::Release);
        }
        now
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    /// Request abort once outstanding tasks quiesce. New sticky tasks must be
    /// rejected once this is set (§5 "new sticky tasks are rejected").
    pub fn mark_going_to_abort(&self) {
        self.going_to_abort.store(true, Ordering::Release);
    }

    pub fn is_going_to_abort(&self) -> bool {
        self.going_to_abort.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Whether this transaction may currently accept new tasks.
    pub fn accepts_tasks(&self) -> bool {
        !self.is_going_to_abort() && !self.is_aborted()
    }
}

/// The external CC engine's contract (§1, §6): begin/commit/abort over
/// transactions this crate only references by handle. Resolution/execution
/// never reach into a real engine directly — [`crate::executor::Executor`]
/// holds one of these and calls through it at the edges (statement begin,
/// `commit_async`, cancellation-triggered abort).
pub trait CcEngine: Send + Sync {
    fn create_transaction(&self, options: TransactionOptions) -> std::sync::Arc<TransactionContext>;
    fn abort_transaction(&self, tx: &TransactionContext);
    fn commit(&self, tx: &TransactionContext) -> CommitKind;
}

/// In-memory fake CC-engine transaction manager, gated behind
/// `testing-fakes` per SPEC_FULL.md §6 ("the crate ships testing-gated fake
/// implementations ... so unit and integration tests exercise the real
/// operator/scheduler/controller code against a fake collaborator").
#[cfg(feature = "testing-fakes")]
pub mod fake {
    use super::*;
    use crate::ids::IdSequence;
    use std::sync::Arc;

    #[derive(Default)]
    pub struct FakeCcEngine {
        seq: IdSequence,
        live: Mutex<Vec<Arc<TransactionContext>>>,
    }

    impl FakeCcEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn create_transaction(&self, options: TransactionOptions) -> Arc<TransactionContext> {
            let id = TransactionId::from_raw(self.seq.next());
            let tx = Arc::new(TransactionContext::new(id, options));
            self.live.lock().unwrap().push(tx.clone());
            tx
        }

        pub fn abort_transaction(&self, tx: &TransactionContext) {
            tx.mark_aborted();
        }

        pub fn commit(&self, _tx: &TransactionContext) -> CommitKind {
            CommitKind::Stored
        }
    }

    impl super::CcEngine for FakeCcEngine {
        fn create_transaction(&self, options: TransactionOptions) -> Arc<TransactionContext> {
            self.create_transaction(options)
        }
        fn abort_transaction(&self, tx: &TransactionContext) {
            self.abort_transaction(tx)
        }
        fn commit(&self, tx: &TransactionContext) -> CommitKind {
            self.commit(tx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_binding_is_first_writer_wins() {
        let tx = TransactionContext::new(TransactionId::from_raw(1), TransactionOptions::default());
        assert_eq!(tx.bind_sticky_worker(3), 3);
        assert_eq!(tx.bind_sticky_worker(7), 3);
        assert_eq!(tx.enforced_rebind_count(), 1);
    }

    #[test]
    fn sticky_worker_clears_when_refcount_hits_zero() {
        let tx = TransactionContext::new(TransactionId::from_raw(1), TransactionOptions::default());
        tx.bind_sticky_worker(2);
        tx.inc_worker_count();
        tx.inc_worker_count();
        assert_eq!(tx.dec_worker_count(), 1);
        assert!(tx.sticky_worker().is_some());
        assert_eq!(tx.dec_worker_count(), 0);
        assert!(tx.sticky_worker().is_none());
    }

    #[test]
    fn going_to_abort_blocks_new_tasks() {
        let tx = TransactionContext::new(TransactionId::from_raw(1), TransactionOptions::default());
        assert!(tx.accepts_tasks());
        tx.mark_going_to_abort();
        assert!(!tx.accepts_tasks());
    }
}
