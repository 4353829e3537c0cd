//! Offer and emit operators (§4.6.10): the two ways a record leaves the
//! relational-operator chain. Offer writes the current variable-table record
//! into a hash-partitioned exchange sink (feeding the next step's group
//! readers, §4.5); emit writes a projected record into the request's result
//! channel.
//!
//! Grounded on `collection_helpers.rs`'s `group_by_key` partitioning (the same
//! "hash the key, mod the partition count" rule) and on [`crate::exchange::GroupWriter`]
//! for the per-partition sort-on-flush sink.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use crate::exchange::{Group, GroupWriter};
use crate::operators::{OpContext, OpSignal, RecordOperator};
use crate::record::{encode_key, FieldValue, KeyOrder};
use crate::variable_table::Variable;

/// Shared, hash-partitioned destination for offered records. One instance per
/// step sub-input; every offer task for that input shares it behind an `Arc`.
pub struct ExchangeSink {
    partitions: Vec<Mutex<GroupWriter>>,
}

impl ExchangeSink {
    pub fn new(partition_count: usize, key_order: Vec<KeyOrder>) -> Self {
        assert!(partition_count > 0, "exchange sink needs at least one partition");
        Self {
            partitions: (0..partition_count)
                .map(|_| Mutex::new(GroupWriter::new(key_order.clone())))
                .collect(),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Route one `(key, value)` pair to its partition by hashing the
    /// byte-canonical encoded key (§4.6.10 "hash-partitioned on declared key
    /// columns"); reuses [`encode_key`]'s order-preserving encoding purely as
    /// a convenient canonical byte string to hash, not for its ordering.
    pub fn offer(&self, key: Vec<FieldValue>, value: Vec<FieldValue>) {
        let mut hasher = DefaultHasher::new();
        encode_key(&key).hash(&mut hasher);
        let partition = (hasher.finish() as usize) % self.partitions.len();
        self.partitions[partition].lock().unwrap().offer(key, value);
    }

    /// Drain every partition into its sorted/folded groups, ready for the next
    /// step's group readers. Consumes the sink: offering is only valid while
    /// the owning step's main tasks are still running (§4.7/§4.8).
    pub fn finish(self) -> Vec<Vec<Group>> {
        self.partitions
            .into_iter()
            .map(|m| m.into_inner().expect("sink mutex never poisoned by panicking offers").flush())
            .collect()
    }
}

/// Writes the current variable-table record into an [`ExchangeSink`]
/// partition. Always the tail of its operator chain — there is no downstream
/// beyond the sink.
pub struct OfferOperator {
    pub key_vars: Vec<Variable>,
    pub value_vars: Vec<Variable>,
    pub sink: std::sync::Arc<ExchangeSink>,
}

impl RecordOperator for OfferOperator {
    fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let key: Vec<FieldValue> = self.key_vars.iter().map(|v| ctx.vars.get(*v)).collect();
        let value: Vec<FieldValue> = self.value_vars.iter().map(|v| ctx.vars.get(*v)).collect();
        self.sink.offer(key, value);
        OpSignal::Continue
    }
}

/// Writes a projected record into the request's result channel
/// ([`crate::request::RequestContext::emit_row`]). Always the tail of its
/// operator chain.
pub struct EmitOperator {
    pub columns: Vec<Variable>,
}

impl RecordOperator for EmitOperator {
    fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let row: Vec<FieldValue> = self.columns.iter().map(|v| ctx.vars.get(*v)).collect();
        ctx.request.emit_row(row);
        OpSignal::Continue
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::arena::{LifoArena, PagePool};
    use crate::ids::JobId;
    use crate::job::{JobContext, JobKind};
    use crate::record::FieldType;
    use crate::request::RequestContext;
    use crate::storage::fake::FakeStorageProvider;
    use crate::storage::StorageProvider;
    use crate::variable_table::VariableTable;
    use std::sync::Arc;

    fn setup() -> (RequestContext, Arc<PagePool>) {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        (RequestContext::new(job, None, storage, pages.clone()), pages)
    }

    #[test]
    fn offered_rows_are_recoverable_after_finish_regardless_of_partition() {
        let (req, pages) = setup();
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![
            (Variable(0), FieldType::Int8),
            (Variable(1), FieldType::Int8),
        ]);
        let sink = Arc::new(ExchangeSink::new(4, vec![KeyOrder::Asc]));
        let mut op = OfferOperator {
            key_vars: vec![Variable(0)],
            value_vars: vec![Variable(1)],
            sink: sink.clone(),
        };
        for (k, v) in [(1i64, 10i64), (2, 20), (1, 11)] {
            vars.set(Variable(0), FieldValue::Int8(k));
            vars.set(Variable(1), FieldValue::Int8(v));
            let mut ctx = OpContext { request: &req, vars: &mut vars, host_vars: None, arena: &mut arena };
            assert_eq!(op.process(&mut ctx), OpSignal::Continue);
        }
        drop(op);
        let sink = Arc::try_unwrap(sink).unwrap_or_else(|_| panic!("sink still shared"));
        let partitions = sink.finish();
        let mut total_values = 0;
        let mut key1_values = Vec::new();
        for groups in &partitions {
            for g in groups {
                total_values += g.values.len();
                if g.key == vec![FieldValue::Int8(1)] {
                    key1_values.extend(g.values.iter().cloned());
                }
            }
        }
        assert_eq!(total_values, 3);
        assert_eq!(key1_values.len(), 2);
    }

    #[test]
    fn emit_appends_projected_rows_to_result_channel() {
        let (req, pages) = setup();
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![
            (Variable(0), FieldType::Int8),
            (Variable(1), FieldType::Int8),
        ]);
        vars.set(Variable(0), FieldValue::Int8(5));
        vars.set(Variable(1), FieldValue::Int8(6));
        let mut op = EmitOperator { columns: vec![Variable(1), Variable(0)] };
        let mut ctx = OpContext { request: &req, vars: &mut vars, host_vars: None, arena: &mut arena };
        assert_eq!(op.process(&mut ctx), OpSignal::Continue);
        assert_eq!(req.collected_rows(), vec![vec![FieldValue::Int8(6), FieldValue::Int8(5)]]);
    }
}
