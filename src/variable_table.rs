//! Variable table (§4.3): binds plan variables to slots in a single owned backing
//! record, fixed at construction.
//!
//! Grounded on the donor crate's lightweight-newtype-id idiom ([`crate::ids::SlotIndex`],
//! same shape as its `NodeId`) for slot identity, with a fresh backing-record layout
//! derived from [`crate::record::RecordMeta`].

use std::collections::HashMap;

use crate::ids::SlotIndex;
use crate::record::{FieldType, FieldValue, RecordMeta, RecordRef};

/// A plan-level variable name. Plans reference variables by this opaque key;
/// the variable table is the only place that maps it to a physical slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Variable(pub u32);

/// Slot info for one variable: its index in declaration order plus its type
/// (needed to size the backing record).
#[derive(Clone, Copy, Debug)]
pub struct SlotInfo {
    pub slot: SlotIndex,
    pub field_type: FieldType,
}

/// Associates plan variables with slots in a backing record.
///
/// Construction fixes the layout permanently: variables never rebind after
/// construction, and each task owns its own `VariableTable` (no concurrent
/// writers, by the per-task-ownership discipline described in §4.1/§5).
pub struct VariableTable {
    info: HashMap<Variable, SlotInfo>,
    meta: RecordMeta,
    backing: Vec<u8>,
    /// Side storage for varying-length values (character/octet/blob/clob).
    /// [`crate::record::RecordRef`]'s fixed-layout backing record only carries a
    /// pointer+length footprint for these kinds (§3 "Record reference"); the
    /// variable table stands in for the varlen arena described in §4.1 and
    /// keeps the actual payload here, indexed by slot.
    varlen: Vec<Option<FieldValue>>,
}

impl VariableTable {
    /// Construct a table with explicit slot info (the "host variables" case: the
    /// caller already knows which variables it needs and in what order).
    pub fn with_explicit_slots(vars: Vec<(Variable, FieldType)>) -> Self {
        let fields: Vec<FieldType> = vars.iter().map(|(_, t)| *t).collect();
        let nullable = vec![true; fields.len()];
        let meta = RecordMeta::new(fields, nullable);
        let mut info = HashMap::with_capacity(vars.len());
        for (i, (var, field_type)) in vars.into_iter().enumerate() {
            info.insert(
                var,
                SlotInfo {
                    slot: SlotIndex(i as u32),
                    field_type,
                },
            );
        }
        let backing = vec![0u8; meta.record_size()];
        let varlen = vec![None; meta.field_count()];
        Self {
            info,
            meta,
            backing,
            varlen,
        }
    }

    /// Construct a table derived from a block's declared variable set (an ordered
    /// list of `(Variable, FieldType)` pairs collected by the plan compiler).
    pub fn derive_from_block(declared: Vec<(Variable, FieldType)>) -> Self {
        Self::with_explicit_slots(declared)
    }

    /// Slot info for `var`. Looking up an unbound variable is a programming
    /// error (the plan compiler is assumed to have resolved all references);
    /// this aborts via panic rather than returning a domain `Result`.
    pub fn info(&self, var: Variable) -> SlotInfo {
        *self
            .info
            .get(&var)
            .unwrap_or_else(|| panic!("unbound variable {:?} in variable table", var))
    }

    pub fn try_info(&self, var: Variable) -> Option<SlotInfo> {
        self.info.get(&var).copied()
    }

    /// Record reference to the single backing record.
    pub fn store(&mut self) -> RecordRef<'_> {
        RecordRef::new(&self.meta, &mut self.backing)
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    /// Convenience: read a variable's current value.
    pub fn get(&mut self, var: Variable) -> FieldValue {
        let slot = self.info(var).slot.0 as usize;
        if self.meta.at(slot).is_varlen() {
            if self.store().is_null(slot) {
                return FieldValue::Null;
            }
            return self.varlen[slot].clone().unwrap_or(FieldValue::Null);
        }
        self.store().get(slot)
    }

    /// Convenience: write a variable's current value.
    pub fn set(&mut self, var: Variable, value: FieldValue) {
        let slot = self.info(var).slot.0 as usize;
        if self.meta.at(slot).is_varlen() {
            let is_null = matches!(value, FieldValue::Null);
            self.store().set_null(slot, is_null);
            self.varlen[slot] = if is_null { None } else { Some(value) };
            return;
        }
        self.store().set(slot, &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_slots() {
        let mut vt = VariableTable::with_explicit_slots(vec![
            (Variable(0), FieldType::Int8),
            (Variable(1), FieldType::Boolean),
        ]);
        vt.set(Variable(0), FieldValue::Int8(7));
        vt.set(Variable(1), FieldValue::Boolean(true));
        assert_eq!(vt.get(Variable(0)), FieldValue::Int8(7));
        assert_eq!(vt.get(Variable(1)), FieldValue::Boolean(true));
    }

    #[test]
    fn varlen_values_round_trip_through_side_storage() {
        let mut vt = VariableTable::with_explicit_slots(vec![(
            Variable(0),
            FieldType::Character {
                varying: true,
                len: None,
            },
        )]);
        vt.set(Variable(0), FieldValue::Character("hello".into()));
        assert_eq!(vt.get(Variable(0)), FieldValue::Character("hello".into()));
        vt.set(Variable(0), FieldValue::Null);
        assert_eq!(vt.get(Variable(0)), FieldValue::Null);
    }

    #[test]
    #[should_panic]
    fn unbound_variable_is_a_programming_error() {
        let vt = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        vt.info(Variable(99));
    }
}
