//! Record & group metadata (§4.2).
//!
//! [`FieldType`] is a tagged descriptor over the engine's closed scalar type set.
//! [`RecordMeta`] lays out an ordered field list plus a nullability bitset into a
//! fixed record footprint, generalizing the donor crate's type-tag dispatch
//! from "one Rust type at runtime" to "one of a closed domain of SQL-ish field
//! kinds with a fixed byte layout."

use ordered_float::OrderedFloat;
use std::sync::Arc;

/// A tagged descriptor over the engine's field-type domain.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldType {
    Boolean,
    Int4,
    Int8,
    Float4,
    Float8,
    Decimal { precision: u8, scale: u8 },
    Character { varying: bool, len: Option<u32> },
    Octet { varying: bool, len: Option<u32> },
    Date,
    TimeOfDay { with_tz: bool },
    TimePoint { with_tz: bool },
    Blob,
    Clob,
    Unknown,
}

impl FieldType {
    /// Fixed on-record footprint in bytes. Varying-length fields store a
    /// pointer+length pair into the varlen arena, not the payload itself.
    pub fn fixed_size(&self) -> usize {
        use FieldType::*;
        match self {
            Boolean => 1,
            Int4 | Float4 => 4,
            Int8 | Float8 | Date => 8,
            Decimal { .. } => 16,
            TimeOfDay { with_tz } => {
                if *with_tz {
                    10
                } else {
                    8
                }
            }
            TimePoint { with_tz } => {
                if *with_tz {
                    12
                } else {
                    8
                }
            }
            Character { .. } | Octet { .. } | Blob | Clob => VARLEN_REF_SIZE,
            Unknown => 0,
        }
    }

    /// Required alignment in bytes.
    pub fn alignment(&self) -> usize {
        self.fixed_size().max(1).min(8)
    }

    pub fn is_varlen(&self) -> bool {
        matches!(
            self,
            FieldType::Character { .. } | FieldType::Octet { .. } | FieldType::Blob | FieldType::Clob
        )
    }
}

/// Size of a (offset, length) reference into the varlen arena.
const VARLEN_REF_SIZE: usize = 16;

/// An ordered, immutable layout of field types plus a nullability bitset.
///
/// Once constructed the layout never changes: offsets, the nullity bit layout,
/// total record size, and alignment are all derived once at construction time.
#[derive(Clone, Debug)]
pub struct RecordMeta {
    fields: Arc<[FieldType]>,
    nullable: Arc<[bool]>,
    value_offsets: Arc<[usize]>,
    nullity_offsets: Arc<[usize]>,
    record_size: usize,
    record_alignment: usize,
}

impl PartialEq for RecordMeta {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(other.fields.iter()).all(|(a, b)| a == b)
    }
}
impl Eq for RecordMeta {}

impl RecordMeta {
    /// Build a record layout from an ordered field list and a nullability bitset
    /// (same length as `fields`). Offsets are packed respecting each field's
    /// alignment; nullity bits are packed, byte-aligned, at the end of the record.
    pub fn new(fields: Vec<FieldType>, nullable: Vec<bool>) -> Self {
        assert_eq!(fields.len(), nullable.len());
        let mut value_offsets = Vec::with_capacity(fields.len());
        let mut cursor = 0usize;
        let mut record_alignment = 1usize;
        for f in &fields {
            let align = f.alignment();
            record_alignment = record_alignment.max(align);
            cursor = cursor.div_ceil(align) * align;
            value_offsets.push(cursor);
            cursor += f.fixed_size();
        }
        let nullity_bits = fields.len();
        let nullity_bytes = nullity_bits.div_ceil(8);
        cursor = cursor.div_ceil(1);
        let nullity_base = cursor;
        let nullity_offsets: Vec<usize> = (0..fields.len()).map(|i| nullity_base * 8 + i).collect();
        cursor += nullity_bytes;
        let record_size = cursor.div_ceil(record_alignment) * record_alignment;
        Self {
            fields: fields.into(),
            nullable: nullable.into(),
            value_offsets: value_offsets.into(),
            nullity_offsets: nullity_offsets.into(),
            record_size,
            record_alignment,
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn record_alignment(&self) -> usize {
        self.record_alignment
    }

    pub fn at(&self, i: usize) -> FieldType {
        self.fields[i]
    }

    pub fn value_offset(&self, i: usize) -> usize {
        self.value_offsets[i]
    }

    /// Bit offset (not byte offset) of field `i`'s nullity flag.
    pub fn nullity_offset(&self, i: usize) -> usize {
        self.nullity_offsets[i]
    }

    pub fn nullable(&self, i: usize) -> bool {
        self.nullable[i]
    }
}

/// A scalar value tagged by its [`FieldType`] kind, used as the in-memory
/// representation read out of / written into a [`RecordMeta`]-described buffer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Int4(i32),
    Int8(i64),
    Float4(OrderedFloat<f32>),
    Float8(OrderedFloat<f64>),
    Decimal(i128, u8),
    Character(String),
    Octet(Vec<u8>),
    Date(i32),
    TimeOfDay(i64),
    TimePoint(i64),
    Blob(Vec<u8>),
    Clob(String),
}

/// A pointer+size pair interpreting raw bytes under some [`RecordMeta`].
///
/// Backed by an owned byte buffer here (rather than a raw pointer) since the
/// engine is Rust, not C++: ownership/lifetime is tracked by the borrow checker
/// instead of by convention.
pub struct RecordRef<'a> {
    meta: &'a RecordMeta,
    buf: &'a mut [u8],
}

impl<'a> RecordRef<'a> {
    pub fn new(meta: &'a RecordMeta, buf: &'a mut [u8]) -> Self {
        assert!(buf.len() >= meta.record_size());
        Self { meta, buf }
    }

    pub fn meta(&self) -> &RecordMeta {
        self.meta
    }

    pub fn is_null(&self, i: usize) -> bool {
        let bit = self.meta.nullity_offset(i);
        let byte = bit / 8;
        let shift = bit % 8;
        (self.buf[byte] >> shift) & 1 == 1
    }

    pub fn set_null(&mut self, i: usize, is_null: bool) {
        let bit = self.meta.nullity_offset(i);
        let byte = bit / 8;
        let shift = bit % 8;
        if is_null {
            self.buf[byte] |= 1 << shift;
        } else {
            self.buf[byte] &= !(1 << shift);
        }
    }

    /// Typed read at field `i`. Returns `FieldValue::Null` if the nullity bit is set.
    pub fn get(&self, i: usize) -> FieldValue {
        if self.is_null(i) {
            return FieldValue::Null;
        }
        let off = self.meta.value_offset(i);
        match self.meta.at(i) {
            FieldType::Boolean => FieldValue::Boolean(self.buf[off] != 0),
            FieldType::Int4 => FieldValue::Int4(i32::from_le_bytes(self.buf[off..off + 4].try_into().unwrap())),
            FieldType::Int8 => FieldValue::Int8(i64::from_le_bytes(self.buf[off..off + 8].try_into().unwrap())),
            FieldType::Float4 => FieldValue::Float4(OrderedFloat(f32::from_le_bytes(
                self.buf[off..off + 4].try_into().unwrap(),
            ))),
            FieldType::Float8 => FieldValue::Float8(OrderedFloat(f64::from_le_bytes(
                self.buf[off..off + 8].try_into().unwrap(),
            ))),
            FieldType::Date => FieldValue::Date(i32::from_le_bytes(self.buf[off..off + 4].try_into().unwrap())),
            FieldType::TimeOfDay { .. } => {
                FieldValue::TimeOfDay(i64::from_le_bytes(self.buf[off..off + 8].try_into().unwrap()))
            }
            FieldType::TimePoint { .. } => {
                FieldValue::TimePoint(i64::from_le_bytes(self.buf[off..off + 8].try_into().unwrap()))
            }
            FieldType::Decimal { scale, .. } => {
                let bytes: [u8; 16] = self.buf[off..off + 16].try_into().unwrap();
                FieldValue::Decimal(i128::from_le_bytes(bytes), scale)
            }
            // Varlen kinds are resolved through the varlen arena by the caller;
            // the raw on-record bytes alone are not enough to reconstruct them.
            FieldType::Character { .. } | FieldType::Octet { .. } | FieldType::Blob | FieldType::Clob => {
                FieldValue::Null
            }
            FieldType::Unknown => FieldValue::Null,
        }
    }

    /// Typed write at field `i`. Clears the nullity bit for non-null values.
    pub fn set(&mut self, i: usize, value: &FieldValue) {
        if matches!(value, FieldValue::Null) {
            self.set_null(i, true);
            return;
        }
        self.set_null(i, false);
        let off = self.meta.value_offset(i);
        match value {
            FieldValue::Boolean(b) => self.buf[off] = *b as u8,
            FieldValue::Int4(v) => self.buf[off..off + 4].copy_from_slice(&v.to_le_bytes()),
            FieldValue::Int8(v) => self.buf[off..off + 8].copy_from_slice(&v.to_le_bytes()),
            FieldValue::Float4(v) => self.buf[off..off + 4].copy_from_slice(&v.0.to_le_bytes()),
            FieldValue::Float8(v) => self.buf[off..off + 8].copy_from_slice(&v.0.to_le_bytes()),
            FieldValue::Date(v) => self.buf[off..off + 4].copy_from_slice(&v.to_le_bytes()),
            FieldValue::TimeOfDay(v) | FieldValue::TimePoint(v) => {
                self.buf[off..off + 8].copy_from_slice(&v.to_le_bytes())
            }
            FieldValue::Decimal(v, _) => self.buf[off..off + 16].copy_from_slice(&v.to_le_bytes()),
            FieldValue::Character(_)
            | FieldValue::Octet(_)
            | FieldValue::Blob(_)
            | FieldValue::Clob(_) => {
                // Varlen payloads are written into the varlen arena by the caller;
                // this on-record store only happens for fixed-size kinds.
            }
            FieldValue::Null => unreachable!(),
        }
    }
}

/// Sort direction for one key field of a [`GroupMeta`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyOrder {
    Asc,
    Desc,
}

/// Pair of (key record metadata, value record metadata) plus a per-field key
/// ordering. Key records within one group are bit-equal under the declared key
/// compare (an invariant enforced by the exchange layer, not by this type).
#[derive(Clone, Debug)]
pub struct GroupMeta {
    pub key: RecordMeta,
    pub value: RecordMeta,
    pub key_order: Vec<KeyOrder>,
}

impl GroupMeta {
    pub fn new(key: RecordMeta, value: RecordMeta, key_order: Vec<KeyOrder>) -> Self {
        assert_eq!(key.field_count(), key_order.len());
        Self { key, value, key_order }
    }
}

/// Order-preserving encoding of a key tuple into bytes suitable for a KVS
/// range scan (§3 "Scan range", §4.6.1). Integers are bias-flipped so that
/// unsigned byte comparison matches signed numeric order; character/octet
/// values are encoded raw (byte-wise comparison already matches their
/// declared order for ASCII/UTF-8 text).
pub fn encode_key(values: &[FieldValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        match v {
            FieldValue::Null => out.push(0u8),
            FieldValue::Boolean(b) => out.push(if *b { 1 } else { 0 }),
            FieldValue::Int4(n) => out.extend_from_slice(&((*n as u32) ^ 0x8000_0000).to_be_bytes()),
            FieldValue::Int8(n) => out.extend_from_slice(&((*n as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()),
            FieldValue::Float4(f) => out.extend_from_slice(&f.0.to_be_bytes()),
            FieldValue::Float8(f) => out.extend_from_slice(&f.0.to_be_bytes()),
            FieldValue::Decimal(n, _) => out.extend_from_slice(&((*n as u128) ^ (1u128 << 127)).to_be_bytes()),
            FieldValue::Character(s) => out.extend_from_slice(s.as_bytes()),
            FieldValue::Octet(b) => out.extend_from_slice(b),
            FieldValue::Date(d) => out.extend_from_slice(&((*d as u32) ^ 0x8000_0000).to_be_bytes()),
            FieldValue::TimeOfDay(t) | FieldValue::TimePoint(t) => {
                out.extend_from_slice(&((*t as u64) ^ 0x8000_0000_0000_0000).to_be_bytes())
            }
            FieldValue::Blob(b) => out.extend_from_slice(b),
            FieldValue::Clob(s) => out.extend_from_slice(s.as_bytes()),
        }
    }
    out
}

/// Encode a row (in declared field order) into a self-describing byte buffer:
/// the KVS value format used by scan/find (§4.6.1, §6). Distinct from
/// [`RecordRef`]'s fixed in-memory layout, which is sized for a variable
/// table's backing record rather than an on-disk value.
pub fn encode_row(meta: &RecordMeta, values: &[FieldValue]) -> Vec<u8> {
    assert_eq!(meta.field_count(), values.len());
    let mut out = Vec::new();
    for v in values {
        if matches!(v, FieldValue::Null) {
            out.push(1);
            continue;
        }
        out.push(0);
        match v {
            FieldValue::Boolean(b) => out.push(*b as u8),
            FieldValue::Int4(n) => out.extend_from_slice(&n.to_le_bytes()),
            FieldValue::Int8(n) => out.extend_from_slice(&n.to_le_bytes()),
            FieldValue::Float4(f) => out.extend_from_slice(&f.0.to_le_bytes()),
            FieldValue::Float8(f) => out.extend_from_slice(&f.0.to_le_bytes()),
            FieldValue::Decimal(n, scale) => {
                out.extend_from_slice(&n.to_le_bytes());
                out.push(*scale);
            }
            FieldValue::Character(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            FieldValue::Clob(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            FieldValue::Octet(b) | FieldValue::Blob(b) => {
                out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                out.extend_from_slice(b);
            }
            FieldValue::Date(d) => out.extend_from_slice(&d.to_le_bytes()),
            FieldValue::TimeOfDay(t) | FieldValue::TimePoint(t) => out.extend_from_slice(&t.to_le_bytes()),
            FieldValue::Null => unreachable!(),
        }
    }
    out
}

/// Decode a row previously written by [`encode_row`] under the same `meta`.
/// Identity with `encode_row` is a tested invariant (§8 "Round-trip laws").
pub fn decode_row(meta: &RecordMeta, bytes: &[u8]) -> Result<Vec<FieldValue>, ()> {
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(meta.field_count());
    for i in 0..meta.field_count() {
        let is_null = *bytes.get(pos).ok_or(())?;
        pos += 1;
        if is_null == 1 {
            out.push(FieldValue::Null);
            continue;
        }
        let v = match meta.at(i) {
            FieldType::Boolean => {
                let b = *bytes.get(pos).ok_or(())?;
                pos += 1;
                FieldValue::Boolean(b != 0)
            }
            FieldType::Int4 => {
                let v = i32::from_le_bytes(bytes.get(pos..pos + 4).ok_or(())?.try_into().unwrap());
                pos += 4;
                FieldValue::Int4(v)
            }
            FieldType::Int8 => {
                let v = i64::from_le_bytes(bytes.get(pos..pos + 8).ok_or(())?.try_into().unwrap());
                pos += 8;
                FieldValue::Int8(v)
            }
            FieldType::Float4 => {
                let v = f32::from_le_bytes(bytes.get(pos..pos + 4).ok_or(())?.try_into().unwrap());
                pos += 4;
                FieldValue::Float4(OrderedFloat(v))
            }
            FieldType::Float8 => {
                let v = f64::from_le_bytes(bytes.get(pos..pos + 8).ok_or(())?.try_into().unwrap());
                pos += 8;
                FieldValue::Float8(OrderedFloat(v))
            }
            FieldType::Decimal { .. } => {
                let n = i128::from_le_bytes(bytes.get(pos..pos + 16).ok_or(())?.try_into().unwrap());
                pos += 16;
                let scale = *bytes.get(pos).ok_or(())?;
                pos += 1;
                FieldValue::Decimal(n, scale)
            }
            FieldType::Character { .. } => {
                let len = u32::from_le_bytes(bytes.get(pos..pos + 4).ok_or(())?.try_into().unwrap()) as usize;
                pos += 4;
                let s = std::str::from_utf8(bytes.get(pos..pos + len).ok_or(())?).map_err(|_| ())?;
                pos += len;
                FieldValue::Character(s.to_string())
            }
            FieldType::Clob => {
                let len = u32::from_le_bytes(bytes.get(pos..pos + 4).ok_or(())?.try_into().unwrap()) as usize;
                pos += 4;
                let s = std::str::from_utf8(bytes.get(pos..pos + len).ok_or(())?).map_err(|_| ())?;
                pos += len;
                FieldValue::Clob(s.to_string())
            }
            FieldType::Octet { .. } => {
                let len = u32::from_le_bytes(bytes.get(pos..pos + 4).ok_or(())?.try_into().unwrap()) as usize;
                pos += 4;
                let b = bytes.get(pos..pos + len).ok_or(())?.to_vec();
                pos += len;
                FieldValue::Octet(b)
            }
            FieldType::Blob => {
                let len = u32::from_le_bytes(bytes.get(pos..pos + 4).ok_or(())?.try_into().unwrap()) as usize;
                pos += 4;
                let b = bytes.get(pos..pos + len).ok_or(())?.to_vec();
                pos += len;
                FieldValue::Blob(b)
            }
            FieldType::Date => {
                let v = i32::from_le_bytes(bytes.get(pos..pos + 4).ok_or(())?.try_into().unwrap());
                pos += 4;
                FieldValue::Date(v)
            }
            FieldType::TimeOfDay { .. } => {
                let v = i64::from_le_bytes(bytes.get(pos..pos + 8).ok_or(())?.try_into().unwrap());
                pos += 8;
                FieldValue::TimeOfDay(v)
            }
            FieldType::TimePoint { .. } => {
                let v = i64::from_le_bytes(bytes.get(pos..pos + 8).ok_or(())?.try_into().unwrap());
                pos += 8;
                FieldValue::TimePoint(v)
            }
            FieldType::Unknown => FieldValue::Null,
        };
        out.push(v);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_encode_decode_round_trips() {
        let meta = RecordMeta::new(
            vec![FieldType::Int8, FieldType::Character { varying: true, len: None }, FieldType::Boolean],
            vec![false, true, true],
        );
        let values = vec![
            FieldValue::Int8(42),
            FieldValue::Character("hi there".into()),
            FieldValue::Null,
        ];
        let bytes = encode_row(&meta, &values);
        let decoded = decode_row(&meta, &bytes).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn key_encoding_preserves_int8_order() {
        let a = encode_key(&[FieldValue::Int8(-5)]);
        let b = encode_key(&[FieldValue::Int8(3)]);
        let c = encode_key(&[FieldValue::Int8(1000)]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn layout_respects_alignment_and_nullity() {
        let meta = RecordMeta::new(
            vec![FieldType::Boolean, FieldType::Int8, FieldType::Int4],
            vec![false, true, true],
        );
        assert_eq!(meta.field_count(), 3);
        // int8 must land on an 8-byte boundary even though boolean is 1 byte.
        assert_eq!(meta.value_offset(1) % 8, 0);
        assert!(meta.record_size() >= meta.value_offset(2) + 4);
    }

    #[test]
    fn record_ref_round_trips_values() {
        let meta = RecordMeta::new(vec![FieldType::Int8, FieldType::Boolean], vec![true, true]);
        let mut buf = vec![0u8; meta.record_size()];
        let mut rr = RecordRef::new(&meta, &mut buf);
        rr.set(0, &FieldValue::Int8(42));
        rr.set(1, &FieldValue::Null);
        assert_eq!(rr.get(0), FieldValue::Int8(42));
        assert!(rr.is_null(1));
    }
}
