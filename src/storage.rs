//! Storage provider and KVS contracts (§6), plus `testing`-gated in-memory
//! fakes that satisfy them exactly.
//!
//! Grounded on `io/cloud/fake.rs`'s in-memory fake store and
//! `testing/mock_io.rs`'s mock-collaborator pattern, generalized from "fake
//! file storage" to "fake ordered key-value storage plus a table/index
//! catalog".

use std::ops::Bound;

use crate::error::ErrorInfo;

/// Inclusivity of a scan-range endpoint (§3 "Scan range").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EndpointKind {
    Inclusive,
    Exclusive,
    PrefixedInclusive,
    PrefixedExclusive,
    Unbound,
}

/// One endpoint of a [`ScanRange`]: a key prefix plus its inclusivity.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub key: Vec<u8>,
    pub kind: EndpointKind,
}

impl Endpoint {
    pub fn unbound() -> Self {
        Self {
            key: Vec::new(),
            kind: EndpointKind::Unbound,
        }
    }

    pub fn inclusive(key: Vec<u8>) -> Self {
        Self {
            key,
            kind: EndpointKind::Inclusive,
        }
    }

    pub fn exclusive(key: Vec<u8>) -> Self {
        Self {
            key,
            kind: EndpointKind::Exclusive,
        }
    }
}

/// A pair of endpoints describing a key range to scan (§3 "Scan range").
#[derive(Clone, Debug)]
pub struct ScanRange {
    pub lower: Endpoint,
    pub upper: Endpoint,
}

impl ScanRange {
    /// Whether `key` lies inside this half-open interval, used by the §8
    /// invariant check ("no emitted row's key lies outside the half-open
    /// interval implied by the endpoints").
    pub fn contains(&self, key: &[u8]) -> bool {
        let lower_ok = match self.lower.kind {
            EndpointKind::Unbound => true,
            EndpointKind::Inclusive | EndpointKind::PrefixedInclusive => key >= self.lower.key.as_slice(),
            EndpointKind::Exclusive | EndpointKind::PrefixedExclusive => key > self.lower.key.as_slice(),
        };
        let upper_ok = match self.upper.kind {
            EndpointKind::Unbound => true,
            EndpointKind::Inclusive => key <= self.upper.key.as_slice(),
            EndpointKind::PrefixedInclusive => key.starts_with(&self.upper.key) || key <= self.upper.key.as_slice(),
            EndpointKind::Exclusive | EndpointKind::PrefixedExclusive => key < self.upper.key.as_slice(),
        };
        lower_ok && upper_ok
    }

    /// Split this range into `n` sub-ranges at evenly-spaced split keys drawn
    /// from `split_keys` (already sorted, ascending). §4.6.1 "Parallelism":
    /// the first range keeps the caller's start endpoint; each subsequent
    /// range's start is inclusive at its split key; each range's end except
    /// the last is exclusive at the next split key.
    pub fn split(&self, split_keys: &[Vec<u8>]) -> Vec<ScanRange> {
        if split_keys.is_empty() {
            return vec![self.clone()];
        }
        let mut out = Vec::with_capacity(split_keys.len() + 1);
        let mut lower = self.lower.clone();
        for sk in split_keys {
            out.push(ScanRange {
                lower: lower.clone(),
                upper: Endpoint::exclusive(sk.clone()),
            });
            lower = Endpoint::inclusive(sk.clone());
        }
        out.push(ScanRange {
            lower,
            upper: self.upper.clone(),
        });
        out
    }
}

/// Iterator status for [`KvsCursor::next`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorStatus {
    Ok,
    NotFound,
    Error,
}

/// A KVS cursor (§6 "Iterator").
pub trait KvsCursor {
    fn next(&mut self) -> CursorStatus;
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
}

/// Per-storage KVS operations (§6 "KVS contract"). All calls are implicitly
/// under the caller-supplied transaction in the fake; a real backend threads
/// a transaction handle through explicitly.
pub trait KvsStorage: Send + Sync {
    fn content_scan(&self, range: &ScanRange) -> Result<Box<dyn KvsCursor + '_>, ErrorInfo>;
    fn content_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ErrorInfo>;
    fn content_put(&self, key: &[u8], value: &[u8]) -> Result<(), ErrorInfo>;
    fn content_delete(&self, key: &[u8]) -> Result<(), ErrorInfo>;
}

/// Index kind, used by operators to know whether a found row still needs a
/// primary-row fetch (§4.6.1 step 2).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IndexKind {
    Primary,
    Secondary,
}

/// A named table or index backed by the KVS.
pub struct StorageObject {
    pub name: String,
    pub kind: IndexKind,
    pub storage: Box<dyn KvsStorage>,
}

/// Storage provider contract (§6): a named directory of tables/indices/
/// sequences, plus per-table DDL locks.
pub trait StorageProvider: Send + Sync {
    fn find_table(&self, name: &str) -> Option<&StorageObject>;
    fn find_index(&self, name: &str) -> Option<&StorageObject>;
    fn find_primary_index(&self, table: &str) -> Option<&StorageObject>;
}

/// `testing-fakes`-gated in-memory storage provider / KVS: an ordered
/// `BTreeMap<Vec<u8>, Vec<u8>>` per storage object, behind a `Mutex`, and a
/// name -> object catalog, satisfying the traits above exactly.
#[cfg(feature = "testing-fakes")]
pub mod fake {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct FakeKvsStorage {
        data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    }

    impl FakeKvsStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, key: Vec<u8>, value: Vec<u8>) {
            self.data.lock().unwrap().insert(key, value);
        }
    }

    pub struct FakeCursor {
        rows: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
        current: Option<(Vec<u8>, Vec<u8>)>,
    }

    impl KvsCursor for FakeCursor {
        fn next(&mut self) -> CursorStatus {
            match self.rows.next() {
                Some(kv) => {
                    self.current = Some(kv);
                    CursorStatus::Ok
                }
                None => {
                    self.current = None;
                    CursorStatus::NotFound
                }
            }
        }

        fn key(&self) -> &[u8] {
            &self.current.as_ref().expect("next() not called or exhausted").0
        }

        fn value(&self) -> &[u8] {
            &self.current.as_ref().expect("next() not called or exhausted").1
        }
    }

    impl KvsStorage for FakeKvsStorage {
        fn content_scan(&self, range: &ScanRange) -> Result<Box<dyn KvsCursor + '_>, ErrorInfo> {
            let data = self.data.lock().unwrap();
            let lower_bound = match range.lower.kind {
                EndpointKind::Unbound => Bound::Unbounded,
                EndpointKind::Inclusive | EndpointKind::PrefixedInclusive => {
                    Bound::Included(range.lower.key.clone())
                }
                EndpointKind::Exclusive | EndpointKind::PrefixedExclusive => {
                    Bound::Excluded(range.lower.key.clone())
                }
            };
            let rows: Vec<(Vec<u8>, Vec<u8>)> = data
                .range((lower_bound, Bound::Unbounded))
                .map(|(k, v)| (k.clone(), v.clone()))
                .filter(|(k, _)| range.contains(k))
                .collect();
            Ok(Box::new(FakeCursor {
                rows: rows.into_iter(),
                current: None,
            }))
        }

        fn content_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ErrorInfo> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn content_put(&self, key: &[u8], value: &[u8]) -> Result<(), ErrorInfo> {
            self.data.lock().unwrap().insert(key.to_vec(), value.to_vec());
            Ok(())
        }

        fn content_delete(&self, key: &[u8]) -> Result<(), ErrorInfo> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeStorageProvider {
        objects: std::collections::HashMap<String, StorageObject>,
        backing: std::collections::HashMap<String, Arc<FakeKvsStorage>>,
        primary_of: std::collections::HashMap<String, String>,
    }

    impl FakeStorageProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_table(&mut self, name: impl Into<String>) -> Arc<FakeKvsStorage> {
            let name = name.into();
            self.primary_of.insert(name.clone(), name.clone());
            self.insert_object(name.clone(), IndexKind::Primary);
            self.storage_of(&name)
        }

        pub fn add_secondary_index(&mut self, name: impl Into<String>, table: impl Into<String>) -> Arc<FakeKvsStorage> {
            let name = name.into();
            self.primary_of.insert(name.clone(), table.into());
            self.insert_object(name.clone(), IndexKind::Secondary);
            self.storage_of(&name)
        }

        fn insert_object(&mut self, name: String, kind: IndexKind) {
            let backing = Arc::new(FakeKvsStorage::new());
            self.backing.insert(name.clone(), backing.clone());
            self.objects.insert(
                name.clone(),
                StorageObject {
                    name,
                    kind,
                    storage: Box::new(ArcKvsStorage(backing)),
                },
            );
        }

        pub fn storage_of(&self, name: &str) -> Arc<FakeKvsStorage> {
            self.backing
                .get(name)
                .cloned()
                .unwrap_or_else(|| panic!("no such storage object {name}"))
        }
    }

    /// Wraps an `Arc<FakeKvsStorage>` so the catalog can own a trait object
    /// while tests keep a cloneable handle to seed data directly.
    struct ArcKvsStorage(Arc<FakeKvsStorage>);

    impl KvsStorage for ArcKvsStorage {
        fn content_scan(&self, range: &ScanRange) -> Result<Box<dyn KvsCursor + '_>, ErrorInfo> {
            self.0.content_scan(range)
        }
        fn content_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ErrorInfo> {
            self.0.content_get(key)
        }
        fn content_put(&self, key: &[u8], value: &[u8]) -> Result<(), ErrorInfo> {
            self.0.content_put(key, value)
        }
        fn content_delete(&self, key: &[u8]) -> Result<(), ErrorInfo> {
            self.0.content_delete(key)
        }
    }

    impl StorageProvider for FakeStorageProvider {
        fn find_table(&self, name: &str) -> Option<&StorageObject> {
            self.objects.get(name).filter(|o| o.kind == IndexKind::Primary)
        }

        fn find_index(&self, name: &str) -> Option<&StorageObject> {
            self.objects.get(name)
        }

        fn find_primary_index(&self, table: &str) -> Option<&StorageObject> {
            self.primary_of.get(table).and_then(|t| self.objects.get(t))
        }
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;

    #[test]
    fn scan_range_contains_respects_inclusivity() {
        let range = ScanRange {
            lower: Endpoint::inclusive(vec![1]),
            upper: Endpoint::exclusive(vec![5]),
        };
        assert!(range.contains(&[1]));
        assert!(range.contains(&[4]));
        assert!(!range.contains(&[5]));
        assert!(!range.contains(&[0]));
    }

    #[test]
    fn split_ranges_do_not_overlap() {
        let range = ScanRange {
            lower: Endpoint::inclusive(vec![0]),
            upper: Endpoint::exclusive(vec![100]),
        };
        let parts = range.split(&[vec![30], vec![60]]);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].upper.key, vec![30]);
        assert_eq!(parts[1].lower.key, vec![30]);
        assert_eq!(parts[1].upper.key, vec![60]);
        assert_eq!(parts[2].lower.key, vec![60]);
    }
}
