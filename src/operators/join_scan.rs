//! Join-scan operator (§4.6.4): like join-find, but the inner probe is a
//! range rather than a point. Range endpoints may reference the upstream's
//! variables; the range's key fields may be a prefix of the index key.

use crate::error::ErrorInfo;
use crate::expr::{evaluate, EvalResult, Expr};
use crate::operators::scan::ColumnBinding;
use crate::operators::{JoinKind, OpContext, OpSignal, RecordOperator};
use crate::record::{decode_row, FieldValue, RecordMeta};
use crate::storage::{CursorStatus, IndexKind, ScanRange};
use crate::variable_table::Variable;

/// Builds the inner probe range fresh per upstream record.
pub trait RangeBuilder: Send {
    fn build(&self, ctx: &mut OpContext<'_, '_>) -> Result<ScanRange, ErrorInfo>;
}

pub struct JoinScanOperator {
    pub index_name: String,
    pub index_kind: IndexKind,
    pub primary_index_name: Option<String>,
    pub probe_range: Box<dyn RangeBuilder>,
    pub row_meta: RecordMeta,
    pub bindings: Vec<ColumnBinding>,
    pub null_bindings: Vec<Variable>,
    pub condition: Option<Expr>,
    pub join_kind: JoinKind,
    pub downstream: Box<dyn RecordOperator>,
}

impl JoinScanOperator {
    pub fn invoke(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let range = match self.probe_range.build(ctx) {
            Ok(r) => r,
            Err(info) => return ctx.fail(info),
        };
        let storage = match ctx.request.storage.find_index(&self.index_name) {
            Some(s) => s,
            None => {
                return ctx.fail(ErrorInfo::new(
                    crate::error::ErrorCode::TargetNotFoundException,
                    format!("no such index '{}'", self.index_name),
                ));
            }
        };
        let mut cursor = match storage.storage.content_scan(&range) {
            Ok(c) => c,
            Err(e) => return ctx.fail(e),
        };
        let mut matched = false;
        loop {
            if ctx.should_stop() {
                return OpSignal::Stop;
            }
            match cursor.next() {
                CursorStatus::NotFound => break,
                CursorStatus::Error => {
                    return ctx.fail(ErrorInfo::new(
                        crate::error::ErrorCode::DataCorruptionException,
                        "cursor error",
                    ));
                }
                CursorStatus::Ok => {
                    let value_bytes = if self.index_kind == IndexKind::Secondary {
                        let primary_name = match &self.primary_index_name {
                            Some(n) => n,
                            None => {
                                return ctx.fail(ErrorInfo::new(
                                    crate::error::ErrorCode::InternalError,
                                    "secondary join-scan missing primary index name",
                                ));
                            }
                        };
                        let primary = match ctx.request.storage.find_index(primary_name) {
                            Some(p) => p,
                            None => {
                                return ctx.fail(ErrorInfo::new(
                                    crate::error::ErrorCode::TargetNotFoundException,
                                    format!("no such primary index '{primary_name}'"),
                                ));
                            }
                        };
                        match primary.storage.content_get(cursor.value()) {
                            Ok(Some(v)) => v,
                            Ok(None) => {
                                return ctx.fail(ErrorInfo::new(
                                    crate::error::ErrorCode::DataCorruptionException,
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
                            return ctx.fail(ErrorInfo::new(
                                crate::error::ErrorCode::DataCorruptionException,
                                "row decode failed",
                            ));
                        }
                    };
                    for b in &self.bindings {
                        ctx.vars.set(b.variable, row[b.column].clone());
                    }
                    let keep = match &self.condition {
                        None => true,
                        Some(expr) => match evaluate(expr, ctx.vars, ctx.host_vars.as_deref_mut()) {
                            EvalResult::Error(info) => return ctx.fail(info),
                            EvalResult::Value(FieldValue::Boolean(b)) => b,
                            EvalResult::Value(_) | EvalResult::Null => false,
                        },
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
            }
        }
        match self.join_kind {
            JoinKind::Inner => OpSignal::Continue,
            JoinKind::LeftOuter => {
                if matched {
                    OpSignal::Continue
                } else {
                    for var in &self.null_bindings {
                        ctx.vars.set(*var, FieldValue::Null);
                    }
                    self.downstream.process(ctx)
                }
            }
            JoinKind::Semi => {
                if matched {
                    self.downstream.process(ctx)
                } else {
                    OpSignal::Continue
                }
            }
            JoinKind::Anti => {
                if matched {
                    OpSignal::Continue
                } else {
                    self.downstream.process(ctx)
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
    use crate::record::{encode_row, FieldType};
    use crate::request::RequestContext;
    use crate::storage::{fake::FakeStorageProvider, Endpoint};
    use crate::variable_table::VariableTable;
    use std::sync::Arc;

    struct FixedRange(ScanRange);
    impl RangeBuilder for FixedRange {
        fn build(&self, _ctx: &mut OpContext<'_, '_>) -> Result<ScanRange, ErrorInfo> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn left_outer_nulls_inner_columns_when_range_is_empty() {
        let mut provider = FakeStorageProvider::new();
        provider.add_table("inner_t");
        let provider: Arc<dyn crate::storage::StorageProvider> = Arc::new(provider);
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        let req = RequestContext::new(job, None, provider, pages.clone());
        let mut vars = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        vars.set(Variable(0), FieldValue::Int8(99));
        let mut arena = LifoArena::new(&pages);
        let mut op = JoinScanOperator {
            index_name: "inner_t".into(),
            index_kind: IndexKind::Primary,
            primary_index_name: None,
            probe_range: Box::new(FixedRange(ScanRange {
                lower: Endpoint::unbound(),
                upper: Endpoint::unbound(),
            })),
            row_meta: RecordMeta::new(vec![FieldType::Int8], vec![false]),
            bindings: vec![],
            null_bindings: vec![Variable(0)],
            condition: None,
            join_kind: JoinKind::LeftOuter,
            downstream: Box::new(NoopRecordSink),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        assert_eq!(op.invoke(&mut ctx), OpSignal::Continue);
        assert_eq!(vars.get(Variable(0)), FieldValue::Null);
        let _ = encode_row; // silence unused import when bindings empty in this test
    }
}
