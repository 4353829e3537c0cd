//! End-to-end scenario 3 (§8): cogroup two shuffled tables on their key
//! column, inner-join them, emit `(k, R.v, S.v)` for every matching pair.

use dagq::arena::{LifoArena, PagePool};
use dagq::exchange::{Cogroup, GroupWriter};
use dagq::ids::JobId;
use dagq::job::{JobContext, JobKind};
use dagq::operators::join::JoinOperator;
use dagq::operators::offer_emit::EmitOperator;
use dagq::operators::scan::ColumnBinding;
use dagq::operators::take_cogroup::TakeCogroupOperator;
use dagq::operators::{JoinKind, OpContext};
use dagq::record::{FieldType, FieldValue, KeyOrder};
use dagq::request::RequestContext;
use dagq::storage::fake::FakeStorageProvider;
use dagq::storage::StorageProvider;
use dagq::testing::{assert_rows_unordered_equal, cogroup_join_tables};
use dagq::variable_table::{Variable, VariableTable};
use std::sync::Arc;

const V_K: Variable = Variable(0);
const V_RV: Variable = Variable(1);
const V_SV: Variable = Variable(2);

fn shuffle(rows: &[Vec<FieldValue>]) -> Vec<dagq::exchange::Group> {
    let mut gw = GroupWriter::new(vec![KeyOrder::Asc]);
    for row in rows {
        gw.offer(vec![row[0].clone()], vec![row[1].clone()]);
    }
    gw.flush()
}

#[test]
fn cogroup_inner_join_emits_cartesian_product_for_shared_keys_only() {
    let (_meta, r, s) = cogroup_join_tables();
    let r_groups = shuffle(&r);
    let s_groups = shuffle(&s);

    let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
    let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
    let pages = Arc::new(PagePool::default());
    let req = RequestContext::new(job, None, storage, pages.clone());
    let mut vars = VariableTable::with_explicit_slots(vec![
        (V_K, FieldType::Int8),
        (V_RV, FieldType::Int8),
        (V_SV, FieldType::Int8),
    ]);
    let mut arena = LifoArena::new(&pages);

    let mut op = TakeCogroupOperator {
        cogroup: Cogroup::new(vec![r_groups, s_groups], vec![KeyOrder::Asc], false),
        key_bindings: vec![ColumnBinding { column: 0, variable: V_K }],
        downstream: Box::new(JoinOperator {
            left_bindings: vec![ColumnBinding { column: 0, variable: V_RV }],
            right_bindings: vec![ColumnBinding { column: 0, variable: V_SV }],
            null_bindings: vec![V_SV],
            condition: None,
            join_kind: JoinKind::Inner,
            downstream: Box::new(EmitOperator { columns: vec![V_K, V_RV, V_SV] }),
        }),
    };

    let mut ctx = OpContext {
        request: &req,
        vars: &mut vars,
        host_vars: None,
        arena: &mut arena,
    };
    op.invoke(&mut ctx);
    assert!(!req.has_error());

    assert_rows_unordered_equal(
        req.collected_rows(),
        vec![
            vec![FieldValue::Int8(1), FieldValue::Int8(100), FieldValue::Int8(1000)],
            vec![FieldValue::Int8(1), FieldValue::Int8(100), FieldValue::Int8(1001)],
            vec![FieldValue::Int8(1), FieldValue::Int8(101), FieldValue::Int8(1000)],
            vec![FieldValue::Int8(1), FieldValue::Int8(101), FieldValue::Int8(1001)],
        ],
    );
}
