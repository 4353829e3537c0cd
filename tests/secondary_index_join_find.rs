//! End-to-end scenario 5 (§8): join-find through a secondary index. The
//! outer row's `c1` probes `I1` (on `T1.c1`), which points back at `T1`'s
//! primary rows.
//!
//! Secondary storage keys are `encode_key(&[c1])` with the primary key bytes
//! appended, so that the two rows sharing `c1 = 20` land at distinct KVS
//! keys instead of colliding; values are the bare `encode_key(&[c0])`
//! primary-key pointer, matching the convention `scan.rs`/`join_find.rs`
//! already assume ("secondary index values store the encoded primary key").

use dagq::arena::{LifoArena, PagePool};
use dagq::ids::JobId;
use dagq::job::{JobContext, JobKind};
use dagq::operators::find::ConstantKey;
use dagq::operators::join_find::JoinFindOperator;
use dagq::operators::offer_emit::EmitOperator;
use dagq::operators::scan::ColumnBinding;
use dagq::operators::{JoinKind, OpContext};
use dagq::record::{encode_key, encode_row, FieldValue};
use dagq::request::RequestContext;
use dagq::storage::fake::FakeStorageProvider;
use dagq::storage::{IndexKind, StorageProvider};
use dagq::testing::{assert_rows_unordered_equal, secondary_index_fixture};
use dagq::variable_table::{Variable, VariableTable};
use std::sync::Arc;

const V_C0: Variable = Variable(0);
const V_C1: Variable = Variable(1);

#[test]
fn join_find_via_secondary_index_returns_both_rows_sharing_the_probe_key() {
    let (meta, t1, outer_row) = secondary_index_fixture();
    let probe_c1 = outer_row[1].clone();

    let mut provider = FakeStorageProvider::new();
    let primary = provider.add_table("t1");
    for row in &t1 {
        primary.seed(encode_key(&row[0..1]), encode_row(&meta, row));
    }
    let secondary = provider.add_secondary_index("i1", "t1");
    for row in &t1 {
        let mut key = encode_key(&row[1..2]);
        key.extend(encode_key(&row[0..1]));
        secondary.seed(key, encode_key(&row[0..1]));
    }
    let provider: Arc<dyn StorageProvider> = Arc::new(provider);

    let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
    let pages = Arc::new(PagePool::default());
    let req = RequestContext::new(job, None, provider, pages.clone());
    let mut vars = VariableTable::with_explicit_slots(vec![
        (V_C0, dagq::record::FieldType::Int8),
        (V_C1, dagq::record::FieldType::Int8),
    ]);
    let mut arena = LifoArena::new(&pages);

    let mut op = JoinFindOperator {
        index_name: "i1".into(),
        index_kind: IndexKind::Secondary,
        primary_index_name: Some("t1".into()),
        probe_key: Box::new(ConstantKey(vec![probe_c1])),
        row_meta: meta,
        bindings: vec![
            ColumnBinding { column: 0, variable: V_C0 },
            ColumnBinding { column: 1, variable: V_C1 },
        ],
        null_bindings: vec![],
        condition: None,
        join_kind: JoinKind::Inner,
        downstream: Box::new(EmitOperator { columns: vec![V_C0, V_C1] }),
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
            vec![FieldValue::Int8(200), FieldValue::Int8(20)],
            vec![FieldValue::Int8(201), FieldValue::Int8(20)],
        ],
    );
}
