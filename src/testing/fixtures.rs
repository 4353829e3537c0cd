//! Pre-built table row fixtures for the six end-to-end scenarios (§8) plus a
//! few general-purpose datasets for one-off unit tests.
//!
//! Each scenario fixture returns plain `(RecordMeta, Vec<Vec<FieldValue>>)`
//! data rather than a seeded [`crate::storage::fake::FakeStorageProvider`]
//! directly, since tests build their storage provider differently depending
//! on whether they need a primary index alone or a primary-plus-secondary
//! pair; [`seed_table`] does the row -> KVS-entry encoding once a provider
//! and key column list are in hand.

use crate::record::{encode_key, encode_row, FieldType, FieldValue, RecordMeta};
use serde::{Deserialize, Serialize};

#[cfg(feature = "testing-fakes")]
use crate::storage::fake::FakeKvsStorage;

/// Encode `rows` under `meta` and seed them into `storage`, keyed on the
/// given 0-based column indices (§4.6.1's scan/find key encoding, via
/// [`encode_key`]/[`encode_row`]).
#[cfg(feature = "testing-fakes")]
pub fn seed_table(storage: &FakeKvsStorage, meta: &RecordMeta, rows: &[Vec<FieldValue>], key_columns: &[usize]) {
    for row in rows {
        let key_values: Vec<FieldValue> = key_columns.iter().map(|&i| row[i].clone()).collect();
        storage.seed(encode_key(&key_values), encode_row(meta, row));
    }
}

fn int8_pair_meta() -> RecordMeta {
    RecordMeta::new(vec![FieldType::Int8, FieldType::Int8], vec![false, false])
}

/// Scenario 1, "simple scan + filter + emit" (§8): `T(c0 PK, c1)` with rows
/// `(1,100),(2,200),(3,300)`.
#[must_use]
pub fn scan_filter_table() -> (RecordMeta, Vec<Vec<FieldValue>>) {
    let meta = int8_pair_meta();
    let rows = vec![
        vec![FieldValue::Int8(1), FieldValue::Int8(100)],
        vec![FieldValue::Int8(2), FieldValue::Int8(200)],
        vec![FieldValue::Int8(3), FieldValue::Int8(300)],
    ];
    (meta, rows)
}

/// Scenario 2, "grouped aggregate" (§8): same shape as [`scan_filter_table`],
/// grouped by `c0 % 2` downstream of the fixture (the grouping itself is a
/// plan concern, not a fixture concern).
#[must_use]
pub fn grouped_aggregate_table() -> (RecordMeta, Vec<Vec<FieldValue>>) {
    scan_filter_table()
}

/// Scenario 3/4, "cogroup inner join" / "left-outer join with null
/// predicate" (§8): `R(k,v)` and `S(k,v)`.
///
/// `R`: `(1,100),(1,101),(2,200)`. `S`: `(1,1000),(1,1001),(3,300)`.
#[must_use]
pub fn cogroup_join_tables() -> (RecordMeta, Vec<Vec<FieldValue>>, Vec<Vec<FieldValue>>) {
    let meta = int8_pair_meta();
    let r = vec![
        vec![FieldValue::Int8(1), FieldValue::Int8(100)],
        vec![FieldValue::Int8(1), FieldValue::Int8(101)],
        vec![FieldValue::Int8(2), FieldValue::Int8(200)],
    ];
    let s = vec![
        vec![FieldValue::Int8(1), FieldValue::Int8(1000)],
        vec![FieldValue::Int8(1), FieldValue::Int8(1001)],
        vec![FieldValue::Int8(3), FieldValue::Int8(300)],
    ];
    (meta, r, s)
}

/// Scenario 5, "join-find via secondary index" (§8): `T1(c0 PK, c1)` with
/// rows `(100,10),(200,20),(201,20)`, a secondary index `I1` on `c1`, and the
/// outer row `(2,20)` that drives the probe.
#[must_use]
pub fn secondary_index_fixture() -> (RecordMeta, Vec<Vec<FieldValue>>, Vec<FieldValue>) {
    let meta = int8_pair_meta();
    let t1 = vec![
        vec![FieldValue::Int8(100), FieldValue::Int8(10)],
        vec![FieldValue::Int8(200), FieldValue::Int8(20)],
        vec![FieldValue::Int8(201), FieldValue::Int8(20)],
    ];
    let outer_row = vec![FieldValue::Int8(2), FieldValue::Int8(20)];
    (meta, t1, outer_row)
}

/// Sample log entry structure for testing ETL-style pipelines layered on top
/// of this crate (e.g. a write statement's input rows before they're turned
/// into `FieldValue`s).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleLogEntry {
    pub timestamp: u64,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub bytes: u64,
}

/// Generate sample log entries for testing.
///
/// # Example
///
/// ```
/// use dagq::testing::sample_log_entries;
///
/// let logs = sample_log_entries();
/// assert!(!logs.is_empty());
/// ```
#[must_use]
pub fn sample_log_entries() -> Vec<SampleLogEntry> {
    vec![
        SampleLogEntry {
            timestamp: 1_000_000,
            ip: "192.168.1.100".to_string(),
            method: "GET".to_string(),
            path: "/api/users".to_string(),
            status: 200,
            bytes: 1024,
        },
        SampleLogEntry {
            timestamp: 1_000_100,
            ip: "192.168.1.101".to_string(),
            method: "POST".to_string(),
            path: "/api/users".to_string(),
            status: 201,
            bytes: 512,
        },
        SampleLogEntry {
            timestamp: 1_000_200,
            ip: "192.168.1.102".to_string(),
            method: "GET".to_string(),
            path: "/api/posts".to_string(),
            status: 200,
            bytes: 2048,
        },
        SampleLogEntry {
            timestamp: 1_000_300,
            ip: "192.168.1.100".to_string(),
            method: "GET".to_string(),
            path: "/api/users".to_string(),
            status: 404,
            bytes: 256,
        },
        SampleLogEntry {
            timestamp: 1_000_400,
            ip: "192.168.1.103".to_string(),
            method: "DELETE".to_string(),
            path: "/api/posts".to_string(),
            status: 500,
            bytes: 128,
        },
    ]
}

/// Generate key-value data with a skewed distribution.
///
/// This mimics real-world scenarios where some keys appear much more
/// frequently than others (e.g. user activity, product views) — useful for
/// stress-testing the aggregate-group / cogroup operators' memory behavior
/// under a hot key.
///
/// # Example
///
/// ```
/// use dagq::testing::skewed_key_value_data;
///
/// let kvs = skewed_key_value_data();
/// let hot_key_count = kvs.iter().filter(|(k, _)| k == "hot_key").count();
/// assert!(hot_key_count > 10);
/// ```
#[must_use]
pub fn skewed_key_value_data() -> Vec<(String, i32)> {
    let mut data = Vec::new();
    for i in 0..50 {
        data.push(("hot_key".to_string(), i));
    }
    for i in 0..30 {
        data.push((format!("warm_key_{}", i % 3), i));
    }
    for i in 0..20 {
        data.push((format!("cold_key_{i}"), i));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_filter_table_matches_spec_example() {
        let (_, rows) = scan_filter_table();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec![FieldValue::Int8(2), FieldValue::Int8(200)]);
    }

    #[test]
    fn cogroup_join_tables_has_expected_key_overlap() {
        let (_, r, s) = cogroup_join_tables();
        let r_keys: Vec<_> = r.iter().map(|row| row[0].clone()).collect();
        let s_keys: Vec<_> = s.iter().map(|row| row[0].clone()).collect();
        assert!(r_keys.contains(&FieldValue::Int8(1)) && s_keys.contains(&FieldValue::Int8(1)));
        assert!(!s_keys.contains(&FieldValue::Int8(2)));
    }

    #[test]
    fn secondary_index_fixture_has_two_rows_matching_the_probe_key() {
        let (_, t1, outer_row) = secondary_index_fixture();
        let probe = &outer_row[1];
        let matches = t1.iter().filter(|row| &row[1] == probe).count();
        assert_eq!(matches, 2);
    }

    #[test]
    fn sample_log_entries_are_non_empty() {
        let logs = sample_log_entries();
        assert_eq!(logs.len(), 5);
        assert!(logs.iter().all(|l| l.timestamp > 0));
    }

    #[test]
    fn skewed_key_value_data_has_the_expected_hot_key_count() {
        let kvs = skewed_key_value_data();
        let hot_key_count = kvs.iter().filter(|(k, _)| k == "hot_key").count();
        assert_eq!(hot_key_count, 50);
    }
}
