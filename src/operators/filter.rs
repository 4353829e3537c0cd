//! Filter operator (§4.6.5): evaluate a boolean expression, forward on true,
//! drop on null/false, stop the task on error.

use crate::expr::{evaluate, EvalResult, Expr};
use crate::operators::{OpContext, OpSignal, RecordOperator};
use crate::record::FieldValue;

pub struct FilterOperator {
    pub predicate: Expr,
    pub downstream: Box<dyn RecordOperator>,
}

impl RecordOperator for FilterOperator {
    fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let result = evaluate(&self.predicate, ctx.vars, ctx.host_vars.as_deref_mut());
        match result {
            EvalResult::Error(info) => ctx.fail(info),
            EvalResult::Value(FieldValue::Boolean(true)) => self.downstream.process(ctx),
            EvalResult::Value(_) | EvalResult::Null => OpSignal::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{LifoArena, PagePool};
    use crate::expr::CompareOp;
    use crate::ids::JobId;
    use crate::job::{JobContext, JobKind};
    use crate::operators::NoopRecordSink;
    use crate::record::FieldType;
    use crate::request::RequestContext;
    use crate::storage::StorageProvider;
    use crate::variable_table::{Variable, VariableTable};
    use std::sync::Arc;

    #[cfg(feature = "testing-fakes")]
    fn make_request() -> RequestContext {
        use crate::storage::fake::FakeStorageProvider;
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let pages = Arc::new(PagePool::default());
        RequestContext::new(job, None, storage, pages)
    }

    struct CountingSink(Arc<std::sync::atomic::AtomicUsize>);
    impl RecordOperator for CountingSink {
        fn process(&mut self, _ctx: &mut OpContext<'_, '_>) -> OpSignal {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            OpSignal::Continue
        }
    }

    #[cfg(feature = "testing-fakes")]
    #[test]
    fn true_predicate_forwards_false_drops() {
        let req = make_request();
        let pages = Arc::new(PagePool::default());
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        vars.set(Variable(0), FieldValue::Int8(10));
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut op = FilterOperator {
            predicate: Expr::Compare(
                CompareOp::Gt,
                Box::new(Expr::VariableRef(Variable(0))),
                Box::new(Expr::Immediate(FieldValue::Int8(5))),
            ),
            downstream: Box::new(CountingSink(count.clone())),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        op.process(&mut ctx);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);

        vars.set(Variable(0), FieldValue::Int8(1));
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        op.process(&mut ctx);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[cfg(feature = "testing-fakes")]
    #[test]
    fn error_stops_task_and_records_error() {
        let req = make_request();
        let pages = Arc::new(PagePool::default());
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        vars.set(Variable(0), FieldValue::Int8(0));
        let mut op = FilterOperator {
            predicate: Expr::Binary(
                crate::expr::BinaryOp::Div,
                Box::new(Expr::Immediate(FieldValue::Int8(1))),
                Box::new(Expr::VariableRef(Variable(0))),
            ),
            downstream: Box::new(NoopRecordSink),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        assert_eq!(op.process(&mut ctx), OpSignal::Stop);
        assert!(req.has_error());
    }
}
