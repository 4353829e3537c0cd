//! Take-cogroup operator (§4.6.7): drive a [`Cogroup`] across N group-reader
//! partitions, binding the shared key into the variable table and invoking a
//! downstream cogroup operator per tuple. Per-tuple scratch (the member value
//! slices the downstream operator may copy out) is bounded by a LIFO-arena
//! checkpoint taken before the call and restored after it returns.

use crate::exchange::Cogroup;
use crate::operators::scan::ColumnBinding;
use crate::operators::{CogroupOperator, OpContext, OpSignal};

pub struct TakeCogroupOperator {
    pub cogroup: Cogroup,
    pub key_bindings: Vec<ColumnBinding>,
    pub downstream: Box<dyn CogroupOperator>,
}

impl TakeCogroupOperator {
    pub fn invoke(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let cogroup = &self.cogroup;
        let key_bindings = &self.key_bindings;
        let downstream = &mut self.downstream;
        let mut stopped = false;
        cogroup.for_each_until(|tuple| {
            if ctx.should_stop() {
                stopped = true;
                return false;
            }
            for b in key_bindings {
                ctx.vars.set(b.variable, tuple.key[b.column].clone());
            }
            let cp = ctx.arena.checkpoint();
            let signal = downstream.process_cogroup(ctx, &tuple);
            ctx.arena.deallocate_after(cp);
            if signal.is_stop() {
                stopped = true;
                return false;
            }
            true
        });
        if stopped {
            OpSignal::Stop
        } else {
            OpSignal::Continue
        }
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::arena::{LifoArena, PagePool};
    use crate::exchange::{CogroupTuple, Group};
    use crate::ids::JobId;
    use crate::job::{JobContext, JobKind};
    use crate::record::{FieldType, FieldValue};
    use crate::request::RequestContext;
    use crate::storage::fake::FakeStorageProvider;
    use crate::storage::StorageProvider;
    use crate::variable_table::{Variable, VariableTable};
    use std::sync::{Arc, Mutex};

    struct CountMembersSink(Arc<Mutex<Vec<(i64, usize, usize)>>>);
    impl CogroupOperator for CountMembersSink {
        fn process_cogroup(&mut self, ctx: &mut OpContext<'_, '_>, tuple: &CogroupTuple<'_>) -> OpSignal {
            if let FieldValue::Int8(k) = ctx.vars.get(Variable(0)) {
                self.0
                    .lock()
                    .unwrap()
                    .push((k, tuple.members[0].len(), tuple.members[1].len()));
            }
            OpSignal::Continue
        }
    }

    #[test]
    fn visits_every_distinct_key_with_empty_side_for_unmatched_input() {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        let req = RequestContext::new(job, None, storage, pages.clone());
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        let left = vec![
            Group { key: vec![FieldValue::Int8(1)], values: vec![vec![FieldValue::Int8(10)]] },
            Group { key: vec![FieldValue::Int8(2)], values: vec![vec![FieldValue::Int8(20)]] },
        ];
        let right = vec![Group {
            key: vec![FieldValue::Int8(1)],
            values: vec![vec![FieldValue::Int8(100)], vec![FieldValue::Int8(101)]],
        }];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut op = TakeCogroupOperator {
            cogroup: Cogroup::new(vec![left, right], vec![crate::record::KeyOrder::Asc], false),
            key_bindings: vec![ColumnBinding { column: 0, variable: Variable(0) }],
            downstream: Box::new(CountMembersSink(seen.clone())),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        assert_eq!(op.invoke(&mut ctx), OpSignal::Continue);
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(1, 1, 2), (2, 1, 0)]);
    }
}
