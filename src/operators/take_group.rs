//! Take-group operator (§4.6.6): drive one group-reader partition, copying
//! key and member fields into the variable table and invoking a downstream
//! group operator per member, with `last_member` set on the final value of
//! each key.

use crate::exchange::GroupReader;
use crate::operators::scan::ColumnBinding;
use crate::operators::{GroupOperator, OpContext, OpSignal};

pub struct TakeGroupOperator {
    pub reader: GroupReader,
    pub key_bindings: Vec<ColumnBinding>,
    pub value_bindings: Vec<ColumnBinding>,
    pub downstream: Box<dyn GroupOperator>,
}

impl TakeGroupOperator {
    pub fn invoke(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        while self.reader.next_group() {
            let key = self.reader.get_group().to_vec();
            for b in &self.key_bindings {
                ctx.vars.set(b.variable, key[b.column].clone());
            }
            while self.reader.next_member() {
                let value = self.reader.get_member().to_vec();
                for b in &self.value_bindings {
                    ctx.vars.set(b.variable, value[b.column].clone());
                }
                let last = self.reader.advance_member();
                if ctx.should_stop() {
                    return OpSignal::Stop;
                }
                if self.downstream.process_member(ctx, last).is_stop() {
                    return OpSignal::Stop;
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
    use crate::exchange::Group;
    use crate::ids::JobId;
    use crate::job::{JobContext, JobKind};
    use crate::record::FieldValue;
    use crate::request::RequestContext;
    use crate::storage::fake::FakeStorageProvider;
    use crate::storage::StorageProvider;
    use crate::variable_table::{Variable, VariableTable};
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<(i64, bool)>>>, Variable);
    impl GroupOperator for RecordingSink {
        fn process_member(&mut self, ctx: &mut OpContext<'_, '_>, last_member: bool) -> OpSignal {
            if let FieldValue::Int8(v) = ctx.vars.get(self.1) {
                self.0.lock().unwrap().push((v, last_member));
            }
            OpSignal::Continue
        }
    }

    #[test]
    fn last_member_flag_set_only_on_final_value_per_key() {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        let req = RequestContext::new(job, None, storage, pages.clone());
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![(Variable(0), crate::record::FieldType::Int8)]);
        let groups = vec![Group {
            key: vec![FieldValue::Int8(1)],
            values: vec![vec![FieldValue::Int8(10)], vec![FieldValue::Int8(20)]],
        }];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut op = TakeGroupOperator {
            reader: GroupReader::new(groups),
            key_bindings: vec![],
            value_bindings: vec![ColumnBinding { column: 0, variable: Variable(0) }],
            downstream: Box::new(RecordingSink(seen.clone(), Variable(0))),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        assert_eq!(op.invoke(&mut ctx), OpSignal::Continue);
        assert_eq!(*seen.lock().unwrap(), vec![(10, false), (20, true)]);
    }
}
