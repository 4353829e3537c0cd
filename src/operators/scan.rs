//! Scan operator (§4.6.1).
//!
//! Grounded on the storage provider contract (§6) plus `collection_helpers.rs`'s
//! `from_vec`/shard-range iteration style for the "split into N ranges"
//! parallelism rule: each range becomes an independently-owned
//! [`ScanOperator`] with its own cursor.

use crate::error::{ErrorCode, ErrorInfo};
use crate::operators::{OpContext, OpSignal, RecordOperator};
use crate::record::{RecordMeta, decode_row};
use crate::storage::{CursorStatus, IndexKind, ScanRange};
use crate::variable_table::Variable;

/// Binds one decoded row column to a variable-table slot.
#[derive(Clone, Copy, Debug)]
pub struct ColumnBinding {
    pub column: usize,
    pub variable: Variable,
}

/// Scan an index over a bounded range, decoding only the bound columns into
/// the variable table and invoking the downstream operator per row.
pub struct ScanOperator {
    pub index_name: String,
    pub index_kind: IndexKind,
    /// Name of the primary index, needed only when `index_kind` is
    /// `Secondary` (§4.6.1 step 2: "use the secondary key's embedded
    /// primary-key fields to fetch the primary-row value").
    pub primary_index_name: Option<String>,
    pub range: ScanRange,
    pub row_meta: RecordMeta,
    pub bindings: Vec<ColumnBinding>,
    pub downstream: Box<dyn RecordOperator>,
}

impl ScanOperator {
    /// Run the scan to completion (or until downstream/cancellation signals
    /// `Stop`). Host-variable references in `range`'s endpoints are expected
    /// to already be resolved by the caller at operator-invocation time, per
    /// §4.6.1 step 1.
    pub fn invoke(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let storage = match ctx.request.storage.find_index(&self.index_name) {
            Some(s) => s,
            None => {
                return ctx.fail(ErrorInfo::new(
                    ErrorCode::TargetNotFoundException,
                    format!("no such index '{}'", self.index_name),
                ));
            }
        };
        let mut cursor = match storage.storage.content_scan(&self.range) {
            Ok(c) => c,
            Err(e) => return ctx.fail(e),
        };
        loop {
            if ctx.should_stop() {
                return OpSignal::Stop;
            }
            match cursor.next() {
                CursorStatus::NotFound => return OpSignal::Continue,
                CursorStatus::Error => {
                    return ctx.fail(ErrorInfo::new(ErrorCode::DataCorruptionException, "cursor error"));
                }
                CursorStatus::Ok => {
                    let value_bytes: Vec<u8> = if self.index_kind == IndexKind::Secondary {
                        // Secondary index values store the encoded primary key
                        // (§4.6.1 step 2); fetch the full row through it.
                        let primary_name = match &self.primary_index_name {
                            Some(n) => n,
                            None => {
                                return ctx.fail(ErrorInfo::new(
                                    ErrorCode::InternalError,
                                    "secondary scan missing primary index name",
                                ));
                            }
                        };
                        let primary = match ctx.request.storage.find_index(primary_name) {
                            Some(p) => p,
                            None => {
                                return ctx.fail(ErrorInfo::new(
                                    ErrorCode::TargetNotFoundException,
                                    format!("no such primary index '{primary_name}'"),
                                ));
                            }
                        };
                        match primary.storage.content_get(cursor.value()) {
                            Ok(Some(v)) => v,
                            Ok(None) => {
                                return ctx.fail(ErrorInfo::new(
                                    ErrorCode::DataCorruptionException,
                                    "secondary index points at missing primary row",
                                ));
                            }
                            Err(e) => return ctx.fail(e),
                        }
                    } else {
                        cursor.value().to_vec()
                    };
                    let row = match decode_row(&self.row_meta, &value_bytes) {
                        Ok(r) => r,
                        Err(()) => {
                            return ctx.fail(ErrorInfo::new(ErrorCode::DataCorruptionException, "row decode failed"));
                        }
                    };
                    for b in &self.bindings {
                        ctx.vars.set(b.variable, row[b.column].clone());
                    }
                    if self.downstream.process(ctx).is_stop() {
                        return OpSignal::Stop;
                    }
                }
            }
        }
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::arena::{LifoArena, PagePool};
    use crate::ids::JobId;
    use crate::job::{JobContext, JobKind};
    use crate::operators::NoopRecordSink;
    use crate::record::{FieldType, FieldValue, encode_key, encode_row};
    use crate::request::RequestContext;
    use crate::storage::{Endpoint, fake::FakeStorageProvider};
    use crate::variable_table::VariableTable;
    use std::sync::{Arc, Mutex};

    struct CollectSink(Arc<Mutex<Vec<i64>>>, Variable);
    impl RecordOperator for CollectSink {
        fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
            if let FieldValue::Int8(v) = ctx.vars.get(self.1) {
                self.0.lock().unwrap().push(v);
            }
            OpSignal::Continue
        }
    }

    fn meta() -> RecordMeta {
        RecordMeta::new(vec![FieldType::Int8, FieldType::Int8], vec![false, false])
    }

    #[test]
    fn scan_decodes_rows_in_key_order_and_respects_range() {
        let mut provider = FakeStorageProvider::new();
        let table = provider.add_table("t");
        let m = meta();
        for (c0, c1) in [(1i64, 100i64), (2, 200), (3, 300)] {
            let key = encode_key(&[FieldValue::Int8(c0)]);
            let value = encode_row(&m, &[FieldValue::Int8(c0), FieldValue::Int8(c1)]);
            table.seed(key, value);
        }
        let provider: Arc<dyn crate::storage::StorageProvider> = Arc::new(provider);
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        let req = RequestContext::new(job, None, provider, pages.clone());
        let mut vars = VariableTable::with_explicit_slots(vec![
            (Variable(0), FieldType::Int8),
            (Variable(1), FieldType::Int8),
        ]);
        let mut arena = LifoArena::new(&pages);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut scan = ScanOperator {
            index_name: "t".into(),
            index_kind: IndexKind::Primary,
            primary_index_name: None,
            range: ScanRange {
                lower: Endpoint::unbound(),
                upper: Endpoint::unbound(),
            },
            row_meta: m,
            bindings: vec![
                ColumnBinding { column: 0, variable: Variable(0) },
                ColumnBinding { column: 1, variable: Variable(1) },
            ],
            downstream: Box::new(CollectSink(seen.clone(), Variable(1))),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        assert_eq!(scan.invoke(&mut ctx), OpSignal::Continue);
        assert_eq!(*seen.lock().unwrap(), vec![100, 200, 300]);
    }

    #[test]
    fn scan_over_empty_range_invokes_downstream_zero_times() {
        let provider = FakeStorageProvider::new();
        let provider: Arc<dyn crate::storage::StorageProvider> = Arc::new({
            let mut p = provider;
            p.add_table("empty");
            p
        });
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        let req = RequestContext::new(job, None, provider, pages.clone());
        let mut vars = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        let mut arena = LifoArena::new(&pages);
        let mut scan = ScanOperator {
            index_name: "empty".into(),
            index_kind: IndexKind::Primary,
            primary_index_name: None,
            range: ScanRange {
                lower: Endpoint::unbound(),
                upper: Endpoint::unbound(),
            },
            row_meta: meta(),
            bindings: vec![],
            downstream: Box::new(NoopRecordSink),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        assert_eq!(scan.invoke(&mut ctx), OpSignal::Continue);
        assert!(!req.has_error());
    }
}
