//! Request context (§3 "Request context"): the per-statement bundle of
//! collaborators a flat task needs to run — job, transaction, storage,
//! arena, and the first-error cell.
//!
//! Grounded on `validation.rs`'s `ErrorCollector` idiom (adapted here as
//! [`crate::error::ErrorCell`]) for first-writer-wins error capture, and on
//! `pipeline.rs`'s `PipelineInner` for bundling shared collaborators behind a
//! single `Arc`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use std::sync::Mutex;

use crate::arena::PagePool;
use crate::dag_controller::DagController;
use crate::error::{ErrorCell, ErrorInfo};
use crate::job::JobContext;
use crate::record::FieldValue;
use crate::storage::StorageProvider;
use crate::transaction::TransactionContext;

/// Everything a flat task needs to execute one statement: which job it
/// belongs to, which transaction (if any) it runs under, where to find
/// tables, where to get scratch memory, and where to report its first error.
pub struct RequestContext {
    pub job: Arc<JobContext>,
    pub transaction: Option<Arc<TransactionContext>>,
    pub storage: Arc<dyn StorageProvider>,
    pub pages: Arc<PagePool>,
    /// Populated once the plan's `Bootstrap` flat task has run; every later
    /// `DagEvents` task for this request drains the same controller.
    dag: Mutex<Option<Arc<DagController>>>,
    errors: ErrorCell,
    cancel_requested: AtomicBool,
    /// Rows handed to the statement's `emit` operator (§4.6.10). Stands in for
    /// the wire-format result channel described in §6, whose on-the-wire
    /// framing is out of scope here.
    result_rows: Mutex<Vec<Vec<FieldValue>>>,
}

impl RequestContext {
    pub fn new(
        job: Arc<JobContext>,
        transaction: Option<Arc<TransactionContext>>,
        storage: Arc<dyn StorageProvider>,
        pages: Arc<PagePool>,
    ) -> Self {
        Self {
            job,
            transaction,
            storage,
            pages,
            dag: Mutex::new(None),
            errors: ErrorCell::new(),
            cancel_requested: AtomicBool::new(false),
            result_rows: Mutex::new(Vec::new()),
        }
    }

    /// Append one projected row to the result channel (called by the `emit`
    /// operator, §4.6.10).
    pub fn emit_row(&self, row: Vec<FieldValue>) {
        self.result_rows.lock().unwrap().push(row);
    }

    /// Drain the rows collected so far. Used by the executor to hand results
    /// back to the caller once the job completes.
    pub fn collected_rows(&self) -> Vec<Vec<FieldValue>> {
        self.result_rows.lock().unwrap().clone()
    }

    pub fn set_dag(&self, controller: Arc<DagController>) {
        *self.dag.lock().unwrap() = Some(controller);
    }

    pub fn dag(&self) -> Option<Arc<DagController>> {
        self.dag.lock().unwrap().clone()
    }

    /// Record a terminal error. First writer wins (§7 "first error wins");
    /// later callers' errors are retained only in the diagnostic log. Returns
    /// whether this call was the one that set the terminal error.
    pub fn set_error(&self, info: ErrorInfo) -> bool {
        self.errors.set(info)
    }

    pub fn has_error(&self) -> bool {
        self.errors.is_set()
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        self.errors.get()
    }

    pub fn diagnostic_errors(&self) -> Vec<ErrorInfo> {
        self.errors.diagnostic_log()
    }

    /// Cooperative cancellation flag (§5 "Cancellation"): checked by
    /// operator tasks between `poll` calls, set by the request that issued a
    /// cancel.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Whether this request should stop doing work: either cancelled or a
    /// terminal error has already been recorded.
    pub fn should_abort(&self) -> bool {
        self.is_cancel_requested() || self.has_error()
    }

    pub fn transaction(&self) -> Option<&Arc<TransactionContext>> {
        self.transaction.as_ref()
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::ids::JobId;
    use crate::job::JobKind;
    use crate::storage::fake::FakeStorageProvider;

    fn make_request() -> RequestContext {
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let pages = Arc::new(PagePool::default());
        RequestContext::new(job, None, storage, pages)
    }

    #[test]
    fn first_error_wins_and_losers_go_to_diagnostic_log() {
        let req = make_request();
        assert!(req.set_error(ErrorInfo::new(ErrorCode::InternalError, "first")));
        assert!(!req.set_error(ErrorInfo::new(ErrorCode::InternalError, "second")));
        assert_eq!(req.error().unwrap().message, "first");
        assert_eq!(req.diagnostic_errors().len(), 1);
    }

    #[test]
    fn should_abort_reflects_cancel_or_error() {
        let req = make_request();
        assert!(!req.should_abort());
        req.request_cancel();
        assert!(req.should_abort());
    }
}
