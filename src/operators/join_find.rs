//! Join-find operator (§4.6.3): per upstream record, probe an inner index by
//! a key built from the upstream's variables, merge matching inner rows into
//! the variable table, and invoke downstream per surviving combination.

use crate::error::ErrorInfo;
use crate::expr::{evaluate, EvalResult, Expr};
use crate::operators::find::KeyBuilder;
use crate::operators::scan::ColumnBinding;
use crate::operators::{JoinKind, OpContext, OpSignal, RecordOperator};
use crate::record::{decode_row, encode_key, FieldValue, RecordMeta};
use crate::storage::{CursorStatus, Endpoint, EndpointKind, IndexKind, ScanRange};
use crate::variable_table::Variable;

pub struct JoinFindOperator {
    pub index_name: String,
    pub index_kind: IndexKind,
    pub primary_index_name: Option<String>,
    pub probe_key: Box<dyn KeyBuilder>,
    pub row_meta: RecordMeta,
    pub bindings: Vec<ColumnBinding>,
    /// Inner-side variables to null out for an unmatched left-outer row.
    pub null_bindings: Vec<Variable>,
    pub condition: Option<Expr>,
    pub join_kind: JoinKind,
    pub downstream: Box<dyn RecordOperator>,
}

impl JoinFindOperator {
    pub fn invoke(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let key_values = match self.probe_key.build(ctx) {
            Ok(v) => v,
            Err(info) => return ctx.fail(info),
        };
        let probe = encode_key(&key_values);
        let range = ScanRange {
            lower: Endpoint::inclusive(probe.clone()),
            upper: Endpoint {
                key: probe,
                kind: EndpointKind::PrefixedInclusive,
            },
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
                                    "secondary join-find missing primary index name",
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
                        JoinKind::Semi | JoinKind::Anti => {
                            // Existence is enough; stop probing further rows.
                            break;
                        }
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
