//! Aggregate-group operator (§4.6.8): a state machine driven by a sequence of
//! `(member, last_member?)` calls from an upstream group operator (typically
//! [`crate::operators::take_group::TakeGroupOperator`]). Running state is kept
//! per declared aggregate function; on `last_member` the finalized values are
//! written into the variable table and the downstream record operator is
//! invoked once for the whole group.
//!
//! `sum`/`count`/`count$distinct` are named directly by the design doc;
//! `min`/`max`/`avg` are supplemented from the original implementation's
//! aggregate function set (SPEC_FULL.md §4.6.8) since the same running-state
//! machine covers them for free.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;

use crate::operators::{GroupOperator, OpContext, OpSignal, RecordOperator};
use crate::record::FieldValue;
use crate::variable_table::Variable;

/// Aggregate function applied to one argument variable across a group.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AggFunc {
    Sum,
    Count,
    CountDistinct,
    Min,
    Max,
    Avg,
}

/// One aggregate to compute: read `source` per member, write the finalized
/// result to `output` when the group ends.
#[derive(Clone, Copy, Debug)]
pub struct AggregateSpec {
    pub function: AggFunc,
    pub source: Variable,
    pub output: Variable,
}

#[derive(Default)]
struct AggState {
    count: i64,
    sum_i8: Option<i64>,
    sum_f8: Option<f64>,
    min: Option<FieldValue>,
    max: Option<FieldValue>,
    /// Distinct non-null values seen so far, for `count$distinct` (§4.6.8
    /// "maintain a per-group set... reset it at group boundaries").
    seen: Vec<FieldValue>,
}

pub struct AggregateGroupOperator {
    pub specs: Vec<AggregateSpec>,
    pub downstream: Box<dyn RecordOperator>,
    state: Vec<AggState>,
    /// Whether `state` holds a group already in progress; cleared once a
    /// group finalizes so the next member resets it.
    in_progress: bool,
}

impl AggregateGroupOperator {
    pub fn new(specs: Vec<AggregateSpec>, downstream: Box<dyn RecordOperator>) -> Self {
        let state = specs.iter().map(|_| AggState::default()).collect();
        Self {
            specs,
            downstream,
            state,
            in_progress: false,
        }
    }
}

impl GroupOperator for AggregateGroupOperator {
    fn process_member(&mut self, ctx: &mut OpContext<'_, '_>, last_member: bool) -> OpSignal {
        if !self.in_progress {
            for s in &mut self.state {
                *s = AggState::default();
            }
            self.in_progress = true;
        }
        for (spec, state) in self.specs.iter().zip(self.state.iter_mut()) {
            let value = ctx.vars.get(spec.source);
            accumulate(state, spec.function, value);
        }
        if !last_member {
            return OpSignal::Continue;
        }
        self.in_progress = false;
        for (spec, state) in self.specs.iter().zip(self.state.iter()) {
            let result = finalize(state, spec.function);
            ctx.vars.set(spec.output, result);
        }
        self.downstream.process(ctx)
    }
}

fn accumulate(state: &mut AggState, func: AggFunc, value: FieldValue) {
    if matches!(value, FieldValue::Null) {
        return;
    }
    match func {
        AggFunc::Count => state.count += 1,
        AggFunc::CountDistinct => {
            if !state.seen.iter().any(|v| *v == value) {
                state.seen.push(value);
            }
        }
        AggFunc::Sum | AggFunc::Avg => {
            state.count += 1;
            match value {
                FieldValue::Int8(n) => *state.sum_i8.get_or_insert(0) += n,
                FieldValue::Int4(n) => *state.sum_i8.get_or_insert(0) += n as i64,
                FieldValue::Float8(f) => *state.sum_f8.get_or_insert(0.0) += f.0,
                FieldValue::Float4(f) => *state.sum_f8.get_or_insert(0.0) += f.0 as f64,
                _ => {}
            }
        }
        AggFunc::Min => {
            if state.min.as_ref().map_or(true, |cur| cmp_agg(&value, cur) == Ordering::Less) {
                state.min = Some(value);
            }
        }
        AggFunc::Max => {
            if state.max.as_ref().map_or(true, |cur| cmp_agg(&value, cur) == Ordering::Greater) {
                state.max = Some(value);
            }
        }
    }
}

fn cmp_agg(a: &FieldValue, b: &FieldValue) -> Ordering {
    use FieldValue::*;
    match (a, b) {
        (Int8(a), Int8(b)) => a.cmp(b),
        (Int4(a), Int4(b)) => a.cmp(b),
        (Float8(a), Float8(b)) => a.cmp(b),
        (Float4(a), Float4(b)) => a.cmp(b),
        (Character(a), Character(b)) => a.cmp(b),
        (Octet(a), Octet(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

fn finalize(state: &AggState, func: AggFunc) -> FieldValue {
    match func {
        AggFunc::Count => FieldValue::Int8(state.count),
        AggFunc::CountDistinct => FieldValue::Int8(state.seen.len() as i64),
        AggFunc::Sum => state
            .sum_i8
            .map(FieldValue::Int8)
            .or_else(|| state.sum_f8.map(|f| FieldValue::Float8(OrderedFloat(f))))
            .unwrap_or(FieldValue::Null),
        AggFunc::Avg => {
            if state.count == 0 {
                FieldValue::Null
            } else if let Some(s) = state.sum_i8 {
                FieldValue::Float8(OrderedFloat(s as f64 / state.count as f64))
            } else if let Some(s) = state.sum_f8 {
                FieldValue::Float8(OrderedFloat(s / state.count as f64))
            } else {
                FieldValue::Null
            }
        }
        AggFunc::Min => state.min.clone().unwrap_or(FieldValue::Null),
        AggFunc::Max => state.max.clone().unwrap_or(FieldValue::Null),
    }
}

#[cfg(all(test, feature = "testing-fakes"))]
mod tests {
    use super::*;
    use crate::arena::{LifoArena, PagePool};
    use crate::exchange::GroupReader;
    use crate::exchange::Group as ExGroup;
    use crate::ids::JobId;
    use crate::job::{JobContext, JobKind};
    use crate::operators::scan::ColumnBinding;
    use crate::operators::take_group::TakeGroupOperator;
    use crate::record::FieldType;
    use crate::request::RequestContext;
    use crate::storage::fake::FakeStorageProvider;
    use crate::storage::StorageProvider;
    use crate::variable_table::VariableTable;
    use std::sync::{Arc, Mutex};

    struct CollectSink(Arc<Mutex<Vec<(i64, i64, f64)>>>);
    impl RecordOperator for CollectSink {
        fn process(&mut self, ctx: &mut OpContext<'_, '_>) -> OpSignal {
            let sum = match ctx.vars.get(Variable(10)) {
                FieldValue::Int8(n) => n,
                _ => panic!("expected int8 sum"),
            };
            let count = match ctx.vars.get(Variable(11)) {
                FieldValue::Int8(n) => n,
                other => panic!("expected int8 count, got {:?}", other),
            };
            let avg = match ctx.vars.get(Variable(12)) {
                FieldValue::Float8(f) => f.0,
                other => panic!("expected float8 avg, got {:?}", other),
            };
            self.0.lock().unwrap().push((sum, count, avg));
            OpSignal::Continue
        }
    }

    #[test]
    fn sum_count_avg_finalize_once_per_group() {
        let storage: Arc<dyn StorageProvider> = Arc::new(FakeStorageProvider::new());
        let job = Arc::new(JobContext::new(JobId::from_raw(1), JobKind::Read));
        let pages = Arc::new(PagePool::default());
        let req = RequestContext::new(job, None, storage, pages.clone());
        let mut arena = LifoArena::new(&pages);
        let mut vars = VariableTable::with_explicit_slots(vec![
            (Variable(0), FieldType::Int8),
            (Variable(10), FieldType::Int8),
            (Variable(11), FieldType::Int8),
            (Variable(12), FieldType::Float8),
        ]);
        let groups = vec![
            ExGroup {
                key: vec![FieldValue::Int8(1)],
                values: vec![vec![FieldValue::Int8(10)], vec![FieldValue::Int8(20)]],
            },
            ExGroup {
                key: vec![FieldValue::Int8(2)],
                values: vec![vec![FieldValue::Int8(5)]],
            },
        ];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let agg = AggregateGroupOperator::new(
            vec![
                AggregateSpec { function: AggFunc::Sum, source: Variable(0), output: Variable(10) },
                AggregateSpec { function: AggFunc::Count, source: Variable(0), output: Variable(11) },
                AggregateSpec { function: AggFunc::Avg, source: Variable(0), output: Variable(12) },
            ],
            Box::new(CollectSink(seen.clone())),
        );
        let mut take = TakeGroupOperator {
            reader: GroupReader::new(groups),
            key_bindings: vec![],
            value_bindings: vec![ColumnBinding { column: 0, variable: Variable(0) }],
            downstream: Box::new(agg),
        };
        let mut ctx = OpContext {
            request: &req,
            vars: &mut vars,
            host_vars: None,
            arena: &mut arena,
        };
        assert_eq!(take.invoke(&mut ctx), OpSignal::Continue);
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(30, 2, 15.0), (5, 1, 5.0)]);
    }
}
