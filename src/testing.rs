//! Testing utilities for `dagq` plans and operators.
//!
//! This module provides a comprehensive testing facility for end-users to
//! write idiomatic Rust tests against query plans and the operators that
//! drive them. It includes:
//!
//! - **Assertions**: compare row/collection outputs with expected results
//! - **Test data builders**: generate rows and key-value test data fluently
//! - **Debug utilities**: inspect a [`PlanGraph`] or a row set during test runs
//! - **Fixtures**: pre-built table row sets for common join/aggregate scenarios
//! - **Mock I/O**: exercise the `io` modules against temp files
//!
//! # Quick Start
//!
//! ```
//! use dagq::testing::*;
//! use dagq::record::FieldValue;
//!
//! let rows = vec![vec![FieldValue::Int4(1)], vec![FieldValue::Int4(2)]];
//! assert_collections_equal(&rows, &rows.clone());
//! ```
//!
//! Tests that need a full [`RequestContext`] over a fake storage/CC-engine
//! pair should build one directly from [`crate::storage::fake::FakeStorageProvider`]
//! and [`crate::transaction::fake::FakeCcEngine`] (see `executor.rs`'s own test
//! module for the pattern); [`test_request_context`] covers the common case of
//! a bare context with no seeded tables.

pub mod assertions;
pub mod builders;
pub mod debug;
pub mod fixtures;

#[cfg(any(feature = "io-csv", feature = "io-jsonl", feature = "io-parquet"))]
pub mod mock_io;

// Re-export commonly used items
pub use assertions::*;
pub use builders::*;
pub use debug::*;
pub use fixtures::*;

#[cfg(any(feature = "io-csv", feature = "io-jsonl", feature = "io-parquet"))]
pub use mock_io::*;

#[cfg(feature = "testing-fakes")]
use std::sync::Arc;

#[cfg(feature = "testing-fakes")]
use crate::arena::PagePool;
#[cfg(feature = "testing-fakes")]
use crate::ids::JobId;
#[cfg(feature = "testing-fakes")]
use crate::job::{JobContext, JobKind};
#[cfg(feature = "testing-fakes")]
use crate::request::RequestContext;
#[cfg(feature = "testing-fakes")]
use crate::storage::fake::FakeStorageProvider;
#[cfg(feature = "testing-fakes")]
use crate::storage::StorageProvider;

/// Build a bare [`RequestContext`] over a fresh, empty
/// [`FakeStorageProvider`], for tests that only need to exercise one flat
/// task or operator in isolation and don't care about table contents.
///
/// Tests that need seeded tables should build their own
/// [`FakeStorageProvider`] (see [`fixtures`] for ready-made row sets) and
/// call [`RequestContext::new`] directly instead.
#[cfg(feature = "testing-fakes")]
#[must_use]
pub fn test_request_context(job_id: u64, kind: JobKind) -> Arc<RequestContext> {
    let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
    let job = Arc::new(JobContext::new(JobId::from_raw(job_id), kind));
    let pages = Arc::new(PagePool::default());
    Arc::new(RequestContext::new(job, None, storage, pages))
}
