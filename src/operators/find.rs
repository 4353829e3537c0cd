//! Find operator (§4.6.2): like scan, but both endpoints are inclusive and
//! derived from a single key tuple (possibly built from host variables).

use crate::error::ErrorInfo;
use crate::operators::scan::{ColumnBinding, ScanOperator};
use crate::operators::{OpContext, OpSignal, RecordOperator};
use crate::record::{encode_key, FieldValue, RecordMeta};
use crate::storage::{Endpoint, IndexKind, ScanRange};

/// Builds the key tuple to probe with, evaluated fresh per upstream record
/// (the key may reference host variables or upstream-bound variables).
pub trait KeyBuilder: Send {
    fn build(&self, ctx: &mut OpContext<'_, '_>) -> Result<Vec<FieldValue>, ErrorInfo>;
}

pub struct FindOperator {
    pub index_name: String,
    pub index_kind: IndexKind,
    pub primary_index_name: Option<String>,
    pub key: Box<dyn KeyBuilder>,
    pub row_meta: RecordMeta,
    pub bindings: Vec<ColumnBinding>,
    pub downstream: Box<dyn RecordOperator>,
}

impl FindOperator {
    pub fn invoke(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
        let key_values = match self.key.build(ctx) {
            Ok(v) => v,
            Err(info) => return ctx.fail(info),
        };
        let probe = encode_key(&key_values);
        let range = ScanRange {
            lower: Endpoint::inclusive(probe.clone()),
            upper: Endpoint {
                key: probe,
                kind: crate::storage::EndpointKind::PrefixedInclusive,
            },
        };
        // `find` reuses the scan loop: one inclusive range over the probe
        // prefix, which naturally yields at most one row for a primary index
        // and every row sharing the secondary-key prefix for a secondary one.
        let downstream = std::mem::replace(&mut self.downstream, Box::new(crate::operators::NoopRecordSink));
        let mut scan = ScanOperator {
            index_name: self.index_name.clone(),
            index_kind: self.index_kind,
            primary_index_name: self.primary_index_name.clone(),
            range,
            row_meta: self.row_meta.clone(),
            bindings: self.bindings.clone(),
            downstream,
        };
        let result = scan.invoke(ctx);
        self.downstream = scan.downstream;
        result
    }
}

/// A [`KeyBuilder`] over a fixed, already-known key (no host/upstream lookup
/// needed). Useful for plans that fold a constant key at compile time.
pub struct ConstantKey(pub Vec<FieldValue>);

impl KeyBuilder for ConstantKey {
    fn build(&self, _ctx: &mut OpContext<'_, '_>) -> Result<Vec<FieldValue>, ErrorInfo> {
        Ok(self.0.clone())
    }
}

