//! Join operator (§4.6.9): consumes one cogroup tuple of exactly two inputs
//! and produces the cartesian product filtered by an optional condition,
//! with join-kind semantics shared with join-find/join-scan (§4.6.3/.4).

use crate::exchange::CogroupTuple;
use crate::expr::{evaluate, EvalResult, Expr};
use crate::operators::scan::ColumnBinding;
use crate::operators::{CogroupOperator, JoinKind, OpContext, OpSignal, RecordOperator};
use crate::record::FieldValue;
use crate::variable_table::Variable;

pub struct JoinOperator {
    pub left_bindings: Vec<ColumnBinding>,
    pub right_bindings: Vec<ColumnBinding>,
    /// Right-side variables to null out for an unmatched left-outer row.
    pub null_bindings: Vec<Variable>,
    pub condition: Option<Expr>,
    pub join_kind: JoinKind,
    pub downstream: Box<dyn RecordOperator>,
}

impl JoinOperator {
    fn bind(vars: &mut crate::variable_table::VariableTable, bindings: &[ColumnBinding], row: &[FieldValue]) {
        for b in bindings {
            vars.set(b.variable, row[b.column].clone());
        }
    }

    fn keep(&self, ctx: &mut OpContext<'_, '_>) -> Result<bool, OpSignal> {
        match &self.condition {
            None => Ok(true),
            Some(expr) => match evaluate(expr, ctx.vars, ctx.host_vars.as_deref_mut()) {
                EvalResult::Error(info) => Err(ctx.fail(info)),
                EvalResult::Value(FieldValue::Boolean(b)) => Ok(b),
                EvalResult::Value(_) | EvalResult::Null => Ok(false),
            },
        }
    }
}

impl CogroupOperator for JoinOperator {
    fn process_cogroup(&mut self, ctx: &mut OpContext<'_, '_>, tuple: &CogroupTuple<'_>) -> OpSignal {
        let left = tuple.members[0];
        let right = tuple.members[1];
        for left_row in left {
            if ctx.should_stop() {
                return OpSignal::Stop;
            }
            Self::bind(ctx.vars, &self.left_bindings, left_row);
            let mut matched = false;
            for right_row in right {
                Self::bind(ctx.vars, &self.right_bindings, right_row);
                let keep = match self.keep(ctx) {
                    Ok(k) => k,
                    Err(signal) => return signal,
                };
                if !keep {
                    continue;
                }
                matched = true;
                match self.join_kind {
                    JoinKind::Semi | JoinKind::Anti => break,
                    JoinKind::Inner | JoinKind::LeftOuter => {
                        if self.downstream.process(ctx).is_stop() {
                            return OpSignal::Stop;
                        }
                    }
                }
            }
            match self.join_kind {
                JoinKind::Inner => {}
                JoinKind::LeftOuter => {
                    if !matched {
                        for var in &self.null_bindings {
                            ctx.vars.set(*var, FieldValue::Null);
                        }
                        if self.downstream.process(ctx).is_stop() {
                            return OpSignal::Stop;
                        }
                    }
                }
                JoinKind::Semi => {
                    if matched && self.downstream.process(ctx).is_stop() {
                        return OpSignal::Stop;
                    }
                }
                JoinKind::Anti => {
                    if !matched && self.downstream.process(ctx).is_stop() {
                        return OpSignal::Stop;
                    }
                }
            }
        }
        OpSignal::Continue
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::arena::{LifoArena, PagePool};
    use crate::ids::JobId;
    use crate::job::{JobContext, JobKind};
    use crate::operators::NoopRecordSink;
    use crate::record::FieldType;
    use crate::request::RequestContext;
    use crate::storage::fake::FakeStorageProvider;
    use crate::storage::StorageProvider;
    use crate::variable_table::VariableTable;
    use std::sync::{Arc, Mutex};

    struct CollectSink(Arc<Mutex<Vec<(i64, FieldValue)>>>);
    impl RecordOperator for CollectSink {
        fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
            if let FieldValue::Int8(l) = ctx.vars.get(Variable(0)) {
                self.0.lock().unwrap().push((l, ctx.vars.get(Variable(1))));
            }
            OpSignal::Continue
        }
    }

    fn setup() -> (RequestContext, Arc<PagePool>) {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        (RequestContext::new(job, None, storage, pages.clone()), pages)
    }

    #[test]
    fn left_outer_pads_unmatched_left_row_with_null_right() {
        let (req, pages) = setup();
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![
            (Variable(0), FieldType::Int8),
            (Variable(1), FieldType::Int8),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut op = JoinOperator {
            left_bindings: vec![ColumnBinding { column: 0, variable: Variable(0) }],
            right_bindings: vec![ColumnBinding { column: 0, variable: Variable(1) }],
            null_bindings: vec![Variable(1)],
            condition: None,
            join_kind: JoinKind::LeftOuter,
            downstream: Box::new(CollectSink(seen.clone())),
        };
        let tuple = CogroupTuple {
            key: vec![FieldValue::Int8(1)],
            members: vec![&[vec![FieldValue::Int8(7)]], &[]],
        };
        let mut ctx = OpContext { request: &req, vars: &mut vars, host_vars: None, arena: &mut arena };
        assert_eq!(op.process_cogroup(&mut ctx, &tuple), OpSignal::Continue);
        assert_eq!(*seen.lock().unwrap(), vec![(7, FieldValue::Null)]);
    }

    #[test]
    fn inner_join_emits_nothing_when_either_side_empty() {
        let (req, pages) = setup();
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        let mut op = JoinOperator {
            left_bindings: vec![],
            right_bindings: vec![],
            null_bindings: vec![],
            condition: None,
            join_kind: JoinKind::Inner,
            downstream: Box::new(NoopRecordSink),
        };
        let tuple = CogroupTuple {
            key: vec![FieldValue::Int8(1)],
            members: vec![&[vec![FieldValue::Int8(7)]], &[]],
        };
        let mut ctx = OpContext { request: &req, vars: &mut vars, host_vars: None, arena: &mut arena };
        assert_eq!(op.process_cogroup(&mut ctx, &tuple), OpSignal::Continue);
        assert!(!req.has_error());
    }
}
