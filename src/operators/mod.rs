//! Relational operators (§4.6): scan, find, join-find, join-scan, filter,
//! take-group, take-cogroup, aggregate-group, join, offer, emit.
//!
//! Per the design doc's resolution of the "deep operator hierarchy" open
//! question (SPEC_FULL.md §9), every operator is one of three closed shapes —
//! [`RecordOperator`], [`GroupOperator`], [`CogroupOperator`] — each owning at
//! most one downstream operator of the matching shape, wired once at
//! step-activation time. There is no open-ended dynamic dispatch beyond these
//! three traits.

pub mod aggregate_group;
pub mod filter;
pub mod find;
pub mod join;
pub mod join_find;
pub mod join_scan;
pub mod offer_emit;
pub mod scan;
pub mod take_cogroup;
pub mod take_group;

use crate::arena::LifoArena;
use crate::error::ErrorInfo;
use crate::exchange::CogroupTuple;
use crate::request::RequestContext;
use crate::variable_table::VariableTable;

/// Join semantics shared by join-find, join-scan, and join (§4.6.3/.4/.9).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    Semi,
    Anti,
}

/// Outcome of one operator invocation, propagated back up the call chain so an
/// upstream driver (a scan's cursor loop, a cogroup's per-key loop, ...) knows
/// whether to keep producing more input.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpSignal {
    /// Keep going; produce the next record/member/cogroup.
    Continue,
    /// An error was recorded (or cancellation observed); stop producing
    /// immediately. The driver that receives `Stop` does not itself re-report
    /// the error — whoever first called `request.set_error` already did.
    Stop,
}

impl OpSignal {
    pub fn is_stop(self) -> bool {
        matches!(self, OpSignal::Stop)
    }
}

/// Per-invocation context threaded through an operator chain: the per-task
/// variable table, a scoped LIFO arena (for cogroup/take-cogroup value
/// buffers, §4.6.7), and the request context (storage, transaction, error
/// cell). `'p` is the page pool's lifetime backing `arena`; `'a` is this
/// invocation's own lifetime.
pub struct OpContext<'a, 'p> {
    pub request: &'a RequestContext,
    pub vars: &'a mut VariableTable,
    pub host_vars: Option<&'a mut VariableTable>,
    pub arena: &'a mut LifoArena<'p>,
}

impl<'a, 'p> OpContext<'a, 'p> {
    /// Record a terminal error on the request and return the `Stop` signal a
    /// caller should propagate immediately (§4.6.5 "Filter": "if error,
    /// records error and stops the task").
    pub fn fail(&self, info: ErrorInfo) -> OpSignal {
        self.request.set_error(info);
        OpSignal::Stop
    }

    /// Whether the current invocation should stop early: either this request
    /// already carries a terminal error, or cancellation was observed
    /// (§5 "Cancellation").
    pub fn should_stop(&self) -> bool {
        self.request.should_abort()
    }
}

/// Processes one record at a time; chained to zero or one downstream operator
/// of the same shape (§4.6 "record operator").
pub trait RecordOperator: Send {
    fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal;
}

/// A downstream chain terminator: does nothing and always continues. Used as
/// the tail of an operator chain when a step's subgraph legitimately ends
/// without offer/emit (e.g. in isolated unit tests of a single operator).
pub struct NoopRecordSink;

impl RecordOperator for NoopRecordSink {
    fn process(&mut self, _ctx: &mut OpContext<'_, '_>) -> OpSignal {
        OpSignal::Continue
    }
}

/// Processes one group member at a time, with a `last_member` flag
/// (§4.6 "group operator").
pub trait GroupOperator: Send {
    fn process_member(&mut self, ctx: &mut OpContext<'_, '_>, last_member: bool) -> OpSignal;
}

/// Processes one cogroup tuple at a time (§4.6 "cogroup operator").
pub trait CogroupOperator: Send {
    fn process_cogroup(&mut self, ctx: &mut OpContext<'_, '_>, tuple: &CogroupTuple<'_>) -> OpSignal;
}
