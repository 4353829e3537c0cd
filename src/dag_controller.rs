//! DAG controller (§4.8): per-step lifecycle state machine, event queue,
//! scheduling of bootstrap / pre-tasks / main tasks / teardown.
//!
//! Grounded on `examples/original_source/src/jogasaki/scheduler/step_state.h`
//! for the state enum and its monotone ordering, and on the donor crate's
//! `planner.rs::build_plan()` for the "process one explicit pass, then stop"
//! structural idiom (the actual cost-based passes there are not carried).
//!
//! Concurrency: a single mutex guards one event-processing pass; task
//! execution itself is concurrent with the controller. The controller never
//! blocks on I/O — its only job is to move state and hand back tasks to
//! submit.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::flat_task::FlatTask;
use crate::ids::{PortIndex, StepId, TaskId};
use crate::job::JobContext;
use crate::step::{PlanGraph, PortKind, StepTopology};

/// Per-step lifecycle state. Order is significant: transitions only ever move
/// forward (§8: "no backward transitions").
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum StepState {
    Uninitialized,
    Created,
    Activated,
    Preparing,
    Prepared,
    Running,
    Completing,
    Completed,
    Deactivated,
}

/// Sub-state of one pre-task or main-task instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskSubstate {
    Uninitialized,
    Running,
    Completed,
}

/// Events posted from outside the controller (by external mechanisms, or by
/// completed tasks reporting back in).
#[derive(Clone, Debug)]
pub enum ExternalEvent {
    /// Upstream began producing on a given port of `target`.
    Providing {
        target: StepId,
        source_port_kind: PortKind,
        source_port_index: PortIndex,
    },
    /// A specific task of `target` completed.
    TaskCompleted { target: StepId, task_id: TaskId },
    /// Cooperative request to finish `target` early.
    CompletionInstructed { target: StepId },
}

/// Events the controller generates for itself while evaluating transitions.
#[derive(Clone, Copy, Debug)]
enum InternalEvent {
    Activate(StepId),
    Prepare(StepId),
    Consume(StepId),
    Deactivate(StepId),
    /// Reserved: not emitted by any transition rule in §4.8, kept as a named
    /// variant so the event type matches the spec's enumeration exactly.
    #[allow(dead_code)]
    PropagateDownstreamCompleting(StepId),
}

struct StepSlots {
    pretasks: HashMap<PortIndex, TaskSubstate>,
    main_tasks: HashMap<TaskId, TaskSubstate>,
    main_tasks_created: bool,
    completion_instructed: bool,
}

impl StepSlots {
    fn new(topo: &StepTopology, sub_ports: &[PortIndex]) -> Self {
        let _ = topo;
        Self {
            pretasks: sub_ports.iter().map(|p| (*p, TaskSubstate::Uninitialized)).collect(),
            main_tasks: HashMap::new(),
            main_tasks_created: false,
            completion_instructed: false,
        }
    }

    fn pretasks_all_completed(&self) -> bool {
        self.pretasks.values().all(|s| *s == TaskSubstate::Completed)
    }

    fn main_tasks_all_completed(&self) -> bool {
        self.main_tasks_created && self.main_tasks.values().all(|s| *s == TaskSubstate::Completed)
    }
}

struct Inner {
    states: Vec<StepState>,
    slots: Vec<StepSlots>,
    queue: VecDeque<InternalEvent>,
}

/// Drives a [`PlanGraph`]'s steps through their lifecycle, producing
/// [`FlatTask`]s for the caller (normally the `dag_events`/`bootstrap` flat
/// task handlers) to submit to the scheduler.
pub struct DagController {
    graph: PlanGraph,
    topology: Vec<StepTopology>,
    inner: Mutex<Inner>,
}

impl DagController {
    pub fn new(graph: PlanGraph) -> Self {
        let topology = graph.snapshot_topology();
        let sub_ports: Vec<Vec<PortIndex>> = topology
            .iter()
            .map(|t| {
                graph.with_step(t.id, |s| s.sub_input_ports().map(|p| p.index).collect())
            })
            .collect();
        let states = vec![StepState::Uninitialized; topology.len()];
        let slots = topology
            .iter()
            .zip(sub_ports.iter())
            .map(|(t, sp)| StepSlots::new(t, sp))
            .collect();
        Self {
            graph,
            topology,
            inner: Mutex::new(Inner {
                states,
                slots,
                queue: VecDeque::new(),
            }),
        }
    }

    pub fn state_of(&self, step: StepId) -> StepState {
        self.inner.lock().unwrap().states[step.raw() as usize]
    }

    pub fn completion_instructed(&self, step: StepId) -> bool {
        self.inner.lock().unwrap().slots[step.raw() as usize].completion_instructed
    }

    /// Initialize the controller: every step starts `Created`, and the
    /// `created -> activated` rule is evaluated immediately (steps with no
    /// upstream are eligible right away). Returns the resulting tasks.
    pub fn bootstrap(&self) -> Vec<FlatTask> {
        {
            let mut inner = self.inner.lock().unwrap();
            for s in inner.states.iter_mut() {
                *s = StepState::Created;
            }
        }
        self.drain_events()
    }

    /// Post an external event for later processing by [`Self::drain_events`].
    pub fn post_external(&self, event: ExternalEvent) {
        let mut inner = self.inner.lock().unwrap();
        match event {
            ExternalEvent::Providing {
                target,
                source_port_kind,
                source_port_index,
            } => {
                if source_port_kind == PortKind::Sub {
                    let slots = &mut inner.slots[target.raw() as usize];
                    slots
                        .pretasks
                        .entry(source_port_index)
                        .or_insert(TaskSubstate::Uninitialized);
                    inner.queue.push_back(InternalEvent::Prepare(target));
                } else if inner.states[target.raw() as usize] == StepState::Prepared
                    && self.downstream_outputs_activated(&inner, target)
                {
                    inner.queue.push_back(InternalEvent::Consume(target));
                }
            }
            ExternalEvent::TaskCompleted { target, task_id } => {
                // Pre-tasks are addressed by port (see `mark_pretask_completed`);
                // this path only tracks main-task completions.
                let slots = &mut inner.slots[target.raw() as usize];
                if let Some(s) = slots.main_tasks.get_mut(&task_id) {
                    *s = TaskSubstate::Completed;
                }
                inner.queue.push_back(InternalEvent::Deactivate(target));
            }
            ExternalEvent::CompletionInstructed { target } => {
                inner.slots[target.raw() as usize].completion_instructed = true;
            }
        }
    }

    /// Mark a specific sub-input port's pre-task as started/completed. Kept
    /// distinct from [`ExternalEvent::TaskCompleted`] since pre-tasks are
    /// addressed by port, not by task id, in §4.7/§4.8.
    pub fn mark_pretask_running(&self, step: StepId, port: PortIndex) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots[step.raw() as usize]
            .pretasks
            .insert(port, TaskSubstate::Running);
    }

    pub fn mark_pretask_completed(&self, step: StepId, port: PortIndex) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots[step.raw() as usize]
            .pretasks
            .insert(port, TaskSubstate::Completed);
        inner.queue.push_back(InternalEvent::Prepare(step));
    }

    pub fn mark_main_task_completed(&self, step: StepId, task_id: TaskId) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots[step.raw() as usize]
            .main_tasks
            .insert(task_id, TaskSubstate::Completed);
        inner.queue.push_back(InternalEvent::Deactivate(step));
    }

    fn downstream_outputs_activated(&self, inner: &Inner, step: StepId) -> bool {
        self.topology[step.raw() as usize]
            .downstream
            .iter()
            .all(|d| inner.states[d.raw() as usize] >= StepState::Activated)
    }

    /// Drain pending internal events (one pass over the queue), re-evaluating
    /// every transition rule to a fixed point, then return whichever
    /// [`FlatTask`]s were generated along the way. Never blocks.
    pub fn drain_events(&self) -> Vec<FlatTask> {
        let mut inner = self.inner.lock().unwrap();
        let mut tasks = Vec::new();
        loop {
            let mut progressed = false;
            while let Some(ev) = inner.queue.pop_front() {
                self.handle_internal(&mut inner, ev, &mut tasks);
                progressed = true;
            }
            if self.evaluate_all(&mut inner, &mut tasks) {
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        tasks
    }

    fn handle_internal(&self, inner: &mut Inner, ev: InternalEvent, tasks: &mut Vec<FlatTask>) {
        match ev {
            InternalEvent::Activate(step) => self.do_activate(inner, step, tasks),
            InternalEvent::Prepare(step) => self.do_prepare(inner, step, tasks),
            InternalEvent::Consume(step) => self.do_consume(inner, step, tasks),
            InternalEvent::Deactivate(step) => self.do_deactivate(inner, step),
            InternalEvent::PropagateDownstreamCompleting(_) => {}
        }
    }

    /// Re-check every transition predicate once; returns whether any step
    /// moved. Used to reach the fixed point implied by one `drain_events` call
    /// draining everything that is *currently* possible.
    fn evaluate_all(&self, inner: &mut Inner, tasks: &mut Vec<FlatTask>) -> bool {
        let mut any = false;
        for idx in 0..self.topology.len() {
            let step = self.topology[idx].id;
            let state = inner.states[idx];
            match state {
                StepState::Created => {
                    let all_upstream_activated = self.topology[idx]
                        .upstream
                        .iter()
                        .all(|u| inner.states[u.raw() as usize] >= StepState::Activated);
                    if all_upstream_activated {
                        self.do_activate(inner, step, tasks);
                        any = true;
                    }
                }
                StepState::Activated => {
                    let all_upstream_completed = self.topology[idx]
                        .upstream
                        .iter()
                        .all(|u| inner.states[u.raw() as usize] >= StepState::Completed);
                    if all_upstream_completed {
                        self.do_prepare(inner, step, tasks);
                        any = true;
                    }
                }
                StepState::Preparing => {
                    if inner.slots[idx].pretasks_all_completed() {
                        inner.states[idx] = StepState::Prepared;
                        any = true;
                        // fast-path: try to consume immediately.
                        let all_upstream_completed = self.topology[idx]
                            .upstream
                            .iter()
                            .all(|u| inner.states[u.raw() as usize] >= StepState::Completed);
                        if all_upstream_completed && self.downstream_outputs_activated(inner, step) {
                            self.do_consume(inner, step, tasks);
                        }
                    }
                }
                StepState::Prepared => {
                    let all_upstream_completed = self.topology[idx]
                        .upstream
                        .iter()
                        .all(|u| inner.states[u.raw() as usize] >= StepState::Completed);
                    if all_upstream_completed && self.downstream_outputs_activated(inner, step) {
                        self.do_consume(inner, step, tasks);
                        any = true;
                    }
                }
                StepState::Running => {
                    if inner.slots[idx].main_tasks_all_completed() {
                        inner.states[idx] = StepState::Completed;
                        any = true;
                    }
                }
                StepState::Completed => {
                    let upstream_past = self.topology[idx]
                        .upstream
                        .iter()
                        .all(|u| inner.states[u.raw() as usize] >= StepState::Completed);
                    let downstream_past = self.topology[idx]
                        .downstream
                        .iter()
                        .all(|d| inner.states[d.raw() as usize] >= StepState::Completed);
                    if upstream_past && downstream_past {
                        self.do_deactivate(inner, step);
                        any = true;
                    }
                }
                _ => {}
            }
        }
        any
    }

    /// `created -> activated`: wires the step's flow and fixes its pretask
    /// slot count. Does *not* create any pretasks itself — those are only
    /// created one at a time, off the `providing` external event (see
    /// `post_external`'s `Providing{Sub}` arm), or en masse off the `prepare`
    /// internal event once all upstream has completed (`evaluate_all`'s
    /// `Activated` arm). Creating them here unconditionally would start
    /// pretasks before either gate is satisfied.
    fn do_activate(&self, inner: &mut Inner, step: StepId, _tasks: &mut Vec<FlatTask>) {
        let idx = step.raw() as usize;
        if inner.states[idx] >= StepState::Activated {
            return;
        }
        // The caller (bootstrap task / flow factory) is expected to have
        // already wired a Flow via `Step::activate`; if absent, this step
        // simply has no tasks to emit yet.
        let has_sub_inputs = self.topology[idx].has_sub_inputs;
        inner.states[idx] = StepState::Activated;
        if !has_sub_inputs {
            // `activated -> prepared` directly per §4.8: "either moves to
            // `activated` (if step has sub-inputs) or directly to `prepared`".
            inner.states[idx] = StepState::Prepared;
        }
    }

    /// `activated -> preparing -> prepared`: creates any pretask still
    /// `Uninitialized`. Reached two ways — once per port from the `providing`
    /// external event (`post_external`'s `Providing{Sub}` arm queues a single
    /// `Prepare`, and only that port is still `Uninitialized` at that point),
    /// and en masse once all upstream has completed (`evaluate_all`'s
    /// `Activated` arm, where every remaining port is still `Uninitialized`).
    fn do_prepare(&self, inner: &mut Inner, step: StepId, tasks: &mut Vec<FlatTask>) {
        let idx = step.raw() as usize;
        if inner.states[idx] != StepState::Activated {
            return;
        }
        inner.states[idx] = StepState::Preparing;
        for port in inner.slots[idx].pretasks.keys().copied().collect::<Vec<_>>() {
            if matches!(
                inner.slots[idx].pretasks.get(&port),
                Some(TaskSubstate::Uninitialized)
            ) {
                if let Some(ft) = self.graph.with_step_mut(step, |s| {
                    s.flow().and_then(|f| f.create_pretask(step, port))
                }) {
                    inner.slots[idx].pretasks.insert(port, TaskSubstate::Running);
                    tasks.push(ft);
                }
            }
        }
        if inner.slots[idx].pretasks_all_completed() {
            inner.states[idx] = StepState::Prepared;
        }
    }

    fn do_consume(&self, inner: &mut Inner, step: StepId, tasks: &mut Vec<FlatTask>) {
        let idx = step.raw() as usize;
        if inner.states[idx] != StepState::Prepared || inner.slots[idx].main_tasks_created {
            return;
        }
        inner.states[idx] = StepState::Running;
        let created = self.graph.with_step_mut(step, |s| {
            s.flow().map(|f| f.create_tasks(step)).unwrap_or_default()
        });
        inner.slots[idx].main_tasks_created = true;
        for t in &created {
            inner.slots[idx].main_tasks.insert(t.id, TaskSubstate::Running);
        }
        if created.is_empty() {
            inner.states[idx] = StepState::Completed;
        }
        tasks.extend(created);
    }

    fn do_deactivate(&self, inner: &mut Inner, step: StepId) {
        let idx = step.raw() as usize;
        if inner.states[idx] != StepState::Completed {
            return;
        }
        let upstream_past = self.topology[idx]
            .upstream
            .iter()
            .all(|u| inner.states[u.raw() as usize] >= StepState::Completed);
        let downstream_past = self.topology[idx]
            .downstream
            .iter()
            .all(|d| inner.states[d.raw() as usize] >= StepState::Completed);
        if upstream_past && downstream_past {
            self.graph.with_step_mut(step, |s| s.deactivate());
            inner.states[idx] = StepState::Deactivated;
        }
    }

    /// True once every step has reached `Deactivated`.
    pub fn all_deactivated(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.states.iter().all(|s| *s == StepState::Deactivated)
    }

    /// If every step is deactivated and the job hasn't already started
    /// teardown, flip the job's `completing` flag and report readiness.
    pub fn try_schedule_teardown(&self, job: &JobContext) -> bool {
        self.all_deactivated() && job.try_begin_teardown()
    }
}
