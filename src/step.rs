//! Step & flow model (§4.7).
//!
//! Grounded on `pipeline.rs`'s `Pipeline`/`PipelineInner` (`Arc<Mutex<...>>`-guarded
//! graph, `insert_node`/`connect`) generalized from an untyped node graph into
//! typed `Step`/`Port`/`Flow`. Per the design doc's resolution of the "cyclic
//! owner/downstream" open question, steps are stored in a flat `Vec<Step>` and
//! referenced everywhere else by [`StepId`] index — no back-pointers.

use std::sync::{Arc, Mutex};

use crate::dag_controller::StepState;
use crate::flat_task::FlatTask;
use crate::ids::{PortIndex, StepId};

/// Which lifecycle timing a port drives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PortKind {
    /// Drives preparation/pre-tasks.
    Sub,
    /// Drives consumption/main tasks.
    Main,
}

/// Typed endpoint connecting steps. A port's opposite list is fixed after
/// graph construction.
#[derive(Clone, Debug)]
pub struct Port {
    pub kind: PortKind,
    pub index: PortIndex,
    /// Steps on the other end of this port (a port may fan out to several).
    pub opposite: Vec<StepId>,
}

/// What kind of work a step represents.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StepKind {
    /// An operator subgraph (scan/filter/join/... chain).
    Process,
    /// Shuffle/group/aggregate/forward.
    Exchange,
    /// Sink: writes to the result channel.
    Emit,
}

/// A node of the physical DAG.
pub struct Step {
    pub id: StepId,
    pub kind: StepKind,
    pub input_ports: Vec<Port>,
    pub output_ports: Vec<Port>,
    pub partition_count: usize,
    state: StepState,
    flow: Option<Box<dyn Flow>>,
}

impl Step {
    pub fn new(id: StepId, kind: StepKind, partition_count: usize) -> Self {
        Self {
            id,
            kind,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            partition_count,
            state: StepState::Uninitialized,
            flow: None,
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub(crate) fn set_state(&mut self, s: StepState) {
        debug_assert!(s >= self.state, "step state must not move backward");
        self.state = s;
    }

    pub fn sub_input_ports(&self) -> impl Iterator<Item = &Port> {
        self.input_ports.iter().filter(|p| p.kind == PortKind::Sub)
    }

    /// Construct this step's flow and move it to `Activated`. Must be called
    /// exactly once per job per step.
    pub fn activate(&mut self, flow: Box<dyn Flow>) {
        assert!(self.flow.is_none(), "activate called more than once for step");
        self.flow = Some(flow);
        self.set_state(StepState::Activated);
    }

    /// Release the flow and any large buffers it held.
    pub fn deactivate(&mut self) {
        self.flow = None;
        self.set_state(StepState::Deactivated);
    }

    pub fn flow(&mut self) -> Option<&mut dyn Flow> {
        self.flow.as_deref_mut()
    }
}

/// Per-step, per-activation task factory. One-shot per activation: each method
/// is invoked at most once per the cardinality described on it.
pub trait Flow: Send {
    /// Called exactly once after all upstream steps have reached `Completed`.
    fn create_tasks(&mut self, step: StepId) -> Vec<FlatTask>;

    /// Called at most once per subinput port.
    fn create_pretask(&mut self, step: StepId, port_index: PortIndex) -> Option<FlatTask>;
}

/// Shared, mutable plan graph. Shared but immutable after construction in the
/// sense that the `Vec<Step>` never grows/shrinks after the caller finishes
/// building it; per-step *state* is still mutated, but only by the DAG
/// controller under its own mutex (see `dag_controller.rs`).
#[derive(Clone)]
pub struct PlanGraph {
    inner: Arc<Mutex<PlanGraphInner>>,
}

struct PlanGraphInner {
    steps: Vec<Step>,
}

impl PlanGraph {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlanGraphInner { steps: Vec::new() })),
        }
    }

    pub fn insert_step(&self, kind: StepKind, partition_count: usize) -> StepId {
        let mut inner = self.inner.lock().unwrap();
        let id = StepId::from_raw(inner.steps.len() as u64);
        inner.steps.push(Step::new(id, kind, partition_count));
        id
    }

    /// Connect an output port of `from` to an input port of `to`.
    pub fn connect(&self, from: StepId, from_port: PortIndex, to: StepId, to_port: PortIndex, kind: PortKind) {
        let mut inner = self.inner.lock().unwrap();
        {
            let from_step = &mut inner.steps[from.raw() as usize];
            ensure_port(&mut from_step.output_ports, from_port, kind).opposite.push(to);
        }
        let to_step = &mut inner.steps[to.raw() as usize];
        ensure_port(&mut to_step.input_ports, to_port, kind).opposite.push(from);
    }

    pub fn step_count(&self) -> usize {
        self.inner.lock().unwrap().steps.len()
    }

    pub fn with_step<R>(&self, id: StepId, f: impl FnOnce(&Step) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        f(&inner.steps[id.raw() as usize])
    }

    pub fn with_step_mut<R>(&self, id: StepId, f: impl FnOnce(&mut Step) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner.steps[id.raw() as usize])
    }

    /// Snapshot of every step's upstream/downstream ids, used by the DAG
    /// controller to evaluate transition predicates without holding the lock
    /// for the whole event-processing pass.
    pub fn snapshot_topology(&self) -> Vec<StepTopology> {
        let inner = self.inner.lock().unwrap();
        inner
            .steps
            .iter()
            .map(|s| StepTopology {
                id: s.id,
                upstream: s.input_ports.iter().flat_map(|p| p.opposite.iter().copied()).collect(),
                downstream: s.output_ports.iter().flat_map(|p| p.opposite.iter().copied()).collect(),
                has_sub_inputs: s.sub_input_ports().next().is_some(),
            })
            .collect()
    }
}

impl Default for PlanGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_port(ports: &mut Vec<Port>, index: PortIndex, kind: PortKind) -> &mut Port {
    if let Some(pos) = ports.iter().position(|p| p.index == index) {
        &mut ports[pos]
    } else {
        ports.push(Port {
            kind,
            index,
            opposite: Vec::new(),
        });
        ports.last_mut().unwrap()
    }
}

/// A step's upstream/downstream neighbor ids, snapshotted for the controller.
#[derive(Clone, Debug)]
pub struct StepTopology {
    pub id: StepId,
    pub upstream: Vec<StepId>,
    pub downstream: Vec<StepId>,
    pub has_sub_inputs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_populates_both_sides() {
        let g = PlanGraph::new();
        let a = g.insert_step(StepKind::Process, 1);
        let b = g.insert_step(StepKind::Process, 1);
        g.connect(a, PortIndex(0), b, PortIndex(0), PortKind::Main);
        let topo = g.snapshot_topology();
        assert_eq!(topo[1].upstream, vec![a]);
        assert_eq!(topo[0].downstream, vec![b]);
    }
}
