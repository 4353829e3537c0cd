//! End-to-end scenario 1 (§8): scan a table, filter on a comparison, emit the
//! surviving rows through the request's result channel.

use dagq::arena::{LifoArena, PagePool};
use dagq::expr::{CompareOp, Expr};
use dagq::ids::JobId;
use dagq::job::{JobContext, JobKind};
use dagq::operators::filter::FilterOperator;
use dagq::operators::offer_emit::EmitOperator;
use dagq::operators::scan::{ColumnBinding, ScanOperator};
use dagq::operators::OpContext;
use dagq::record::{encode_key, encode_row, FieldType, FieldValue};
use dagq::request::RequestContext;
use dagq::storage::fake::FakeStorageProvider;
use dagq::storage::{Endpoint, IndexKind, ScanRange, StorageProvider};
use dagq::testing::{assert_rows_unordered_equal, scan_filter_table};
use dagq::variable_table::{Variable, VariableTable};
use std::sync::Arc;

#[test]
fn scan_filter_emit_keeps_only_rows_with_c1_over_150() {
    let (meta, rows) = scan_filter_table();

    let mut provider = FakeStorageProvider::new();
    let table = provider.add_table("t");
    for row in &rows {
        let key = encode_key(&row[0..1]);
        let value = encode_row(&meta, row);
        table.seed(key, value);
    }
    let provider: Arc<dyn StorageProvider> = Arc::new(provider);

    let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
    let pages = Arc::new(PagePool::default());
    let req = RequestContext::new(job, None, provider, pages.clone());
    let mut vars = VariableTable::with_explicit_slots(vec![
        (Variable(0), FieldType::Int8),
        (Variable(1), FieldType::Int8),
    ]);
    let mut arena = LifoArena::new(&pages);

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
            ColumnBinding { column: 0, variable: Variable(0) },
            ColumnBinding { column: 1, variable: Variable(1) },
        ],
        downstream: Box::new(FilterOperator {
            predicate: Expr::Compare(
                CompareOp::Gt,
                Box::new(Expr::VariableRef(Variable(1))),
                Box::new(Expr::Immediate(FieldValue::Int8(150))),
            ),
            downstream: Box::new(EmitOperator {
                columns: vec![Variable(0), Variable(1)],
            }),
        }),
    };

    let mut ctx = OpContext {
        request: &req,
        vars: &mut vars,
        host_vars: None,
        arena: &mut arena,
    };
    scan.invoke(&mut ctx);

    assert!(!req.has_error());
    assert_rows_unordered_equal(
        req.collected_rows(),
        vec![
            vec![FieldValue::Int8(2), FieldValue::Int8(200)],
            vec![FieldValue::Int8(3), FieldValue::Int8(300)],
        ],
    );
}
