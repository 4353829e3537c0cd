//! End-to-end scenario 2 (§8): scan a table, shuffle on `c0 % 2`, sum `c1`
//! per partition key, emit one row per key.

use dagq::arena::{LifoArena, PagePool};
use dagq::exchange::GroupReader;
use dagq::ids::JobId;
use dagq::job::{JobContext, JobKind};
use dagq::operators::aggregate_group::{AggFunc, AggregateGroupOperator, AggregateSpec};
use dagq::operators::offer_emit::{EmitOperator, ExchangeSink};
use dagq::operators::scan::{ColumnBinding, ScanOperator};
use dagq::operators::take_group::TakeGroupOperator;
use dagq::operators::{OpContext, OpSignal, RecordOperator};
use dagq::record::{encode_key, encode_row, FieldType, FieldValue, KeyOrder};
use dagq::request::RequestContext;
use dagq::storage::fake::FakeStorageProvider;
use dagq::storage::{Endpoint, IndexKind, ScanRange, StorageProvider};
use dagq::testing::{assert_rows_unordered_equal, grouped_aggregate_table};
use dagq::variable_table::{Variable, VariableTable};
use std::sync::Arc;

const V_C0: Variable = Variable(0);
const V_C1: Variable = Variable(1);
const V_PARITY: Variable = Variable(2);
const V_SUM: Variable = Variable(3);

/// Reads the scanned `(c0, c1)` pair and offers `(c0 % 2, c1)` into the
/// exchange — standing in for a plan's shuffle step, which computes its
/// partition key ahead of the offer operator rather than inside it.
struct ShuffleOnParity(Arc<ExchangeSink>);

impl RecordOperator for ShuffleOnParity {
    fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let c0 = match ctx.vars.get(V_C0) {
            FieldValue::Int8(n) => n,
            _ => panic!("expected int8 c0"),
        };
        let c1 = ctx.vars.get(V_C1);
        self.0.offer(vec![FieldValue::Int8(c0 % 2)], vec![c1]);
        OpSignal::Continue
    }
}

#[test]
fn grouped_aggregate_sums_c1_per_parity_key() {
    let (meta, rows) = grouped_aggregate_table();

    let mut provider = FakeStorageProvider::new();
    let table = provider.add_table("t");
    for row in &rows {
        table.seed(encode_key(&row[0..1]), encode_row(&meta, row));
    }
    let provider: Arc<dyn StorageProvider> = Arc::new(provider);

    let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
    let pages = Arc::new(PagePool::default());
    let req = RequestContext::new(job, None, provider, pages.clone());
    let mut vars = VariableTable::with_explicit_slots(vec![
        (V_C0, FieldType::Int8),
        (V_C1, FieldType::Int8),
        (V_PARITY, FieldType::Int8),
        (V_SUM, FieldType::Int8),
    ]);
    let mut arena = LifoArena::new(&pages);

    let sink = Arc::new(ExchangeSink::new(2, vec![KeyOrder::Asc]));
    let mut scan = ScanOperator {
        index_name: "t".into(),
        index_kind: IndexKind::Primary,
        primary_index_name: None,
        range: ScanRange {
            lower: Endpoint::unbound(),
            upper: Endpoint::unbound(),
        },
        row_meta: meta,
        bindings: vec![
            ColumnBinding { column: 0, variable: V_C0 },
            ColumnBinding { column: 1, variable: V_C1 },
        ],
        downstream: Box::new(ShuffleOnParity(sink.clone())),
    };
    {
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        scan.invoke(&mut ctx);
        assert!(!req.has_error());
    }

    let sink = Arc::try_unwrap(sink).unwrap_or_else(|_| panic!("sink still shared"));
    let partitions = sink.finish();

    for groups in partitions {
        if groups.is_empty() {
            continue;
        }
        let mut take = TakeGroupOperator {
            reader: GroupReader::new(groups),
            key_bindings: vec![ColumnBinding { column: 0, variable: V_PARITY }],
            value_bindings: vec![ColumnBinding { column: 0, variable: V_C1 }],
            downstream: Box::new(AggregateGroupOperator::new(
                vec![AggregateSpec { function: AggFunc::Sum, source: V_C1, output: V_SUM }],
                Box::new(EmitOperator { columns: vec![V_PARITY, V_SUM] }),
            )),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        take.invoke(&mut ctx);
        assert!(!req.has_error());
    }

    assert_rows_unordered_equal(
        req.collected_rows(),
        vec![
            vec![FieldValue::Int8(0), FieldValue::Int8(200)],
            vec![FieldValue::Int8(1), FieldValue::Int8(400)],
        ],
    );
}
