//! Lightweight identifiers used throughout the engine.
//!
//! These are opaque, `Copy`, hashable handles — the same shape the donor crate used
//! for its `NodeId`, generalized from "one id kind" to the handful the engine needs:
//! steps within a plan graph, tasks submitted to the scheduler, jobs, and slots
//! within a variable table.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(u64);

        impl $name {
            /// Construct from a raw value (used by tests and fixture builders).
            pub const fn from_raw(v: u64) -> Self {
                Self(v)
            }

            /// Return the underlying numeric value.
            pub const fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

id_type!(StepId, "Unique identifier of a step within one plan graph.");
id_type!(TaskId, "Unique identifier of a task submitted to the scheduler.");
id_type!(JobId, "Unique identifier of one end-to-end execution of a plan.");
id_type!(TransactionId, "Opaque identifier of a CC-engine transaction.");

/// Index of a slot within a variable table's backing record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SlotIndex(pub u32);

/// Index of a port on a step (ordinal among that step's main or sub ports).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PortIndex(pub u32);

/// Monotonic generator for [`TaskId`]/[`JobId`]-style sequence numbers.
///
/// One instance per scheduler; tasks and jobs each get their own counter so ids
/// never collide across the two spaces even though both are `u64`-backed.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Return the next value, starting at 0 and incrementing on every call.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
