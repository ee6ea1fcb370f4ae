//! Tasks, their subtask decomposition, and the shared task arena.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::dependency::{Dependency, DependencyMatrix};
use crate::error::{AccordError, Result};
use crate::types::{Capability, Position, SubtaskId, TaskId};

/// Inherent cost of performing a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExecutionCost {
    /// Fixed cost regardless of the performing agent.
    Constant(f64),
    /// Fraction of the agent's resources left after travel and coalition penalties.
    Proportional(f64),
}

impl Default for ExecutionCost {
    fn default() -> Self {
        ExecutionCost::Constant(0.0)
    }
}

/// Availability window of a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Earliest time the task may be performed; also the urgency reference `t_0`.
    pub start: f64,
    /// Latest allowed arrival. `None` leaves the window open.
    pub end: Option<f64>,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// A window opening at `start` that never closes.
    pub fn open(start: f64) -> Self {
        Self { start, end: None }
    }

    /// Returns true if an arrival at `t` is inside the window.
    pub fn admits(&self, t: f64) -> bool {
        t >= self.start && self.end.map_or(true, |end| t <= end)
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::open(0.0)
    }
}

/// Declarative description of a task, as supplied by a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Name used in logs.
    pub name: String,

    /// Where the task is performed.
    pub location: Position,

    /// Capabilities the task requires.
    pub capabilities: Vec<Capability>,

    /// Inherent execution cost.
    #[serde(default)]
    pub cost: ExecutionCost,

    /// Availability window.
    #[serde(default)]
    pub window: TimeWindow,

    /// Time spent at the task once arrived.
    #[serde(default)]
    pub duration: f64,

    /// Maximum arrival offset between coalition partners (`t_corr`). `None` is unbounded.
    #[serde(default)]
    pub correlation_time: Option<f64>,

    /// Score decay rate `lambda` with respect to arrival time.
    #[serde(default)]
    pub urgency_decay: f64,

    /// Proximity decay `gamma` with respect to travelled distance. `None` disables it.
    #[serde(default)]
    pub proximity_decay: Option<f64>,

    /// Maximum achievable score `S_max`.
    pub max_score: f64,
}

impl TaskSpec {
    /// Create a new TaskSpecBuilder.
    pub fn builder() -> TaskSpecBuilder {
        TaskSpecBuilder::new()
    }

    /// Validate the specification.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| AccordError::InvalidTask { message };

        if self.capabilities.is_empty() {
            return Err(invalid(format!("task {} requires no capability", self.name)));
        }
        for (i, capability) in self.capabilities.iter().enumerate() {
            if self.capabilities[..i].contains(capability) {
                return Err(invalid(format!(
                    "task {} lists capability {} twice",
                    self.name, capability
                )));
            }
        }
        if !(self.max_score > 0.0) {
            return Err(invalid(format!("task {} has non-positive max score", self.name)));
        }
        if self.duration < 0.0 {
            return Err(invalid(format!("task {} has negative duration", self.name)));
        }
        if self.urgency_decay < 0.0 {
            return Err(invalid(format!("task {} has negative urgency decay", self.name)));
        }
        if matches!(self.correlation_time, Some(t) if t < 0.0) {
            return Err(invalid(format!(
                "task {} has negative correlation time",
                self.name
            )));
        }
        if let Some(end) = self.window.end {
            if end < self.window.start {
                return Err(invalid(format!(
                    "task {} window ends before it starts",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Builder for creating TaskSpecs with a fluent API.
#[derive(Debug, Default)]
pub struct TaskSpecBuilder {
    name: Option<String>,
    location: Position,
    capabilities: Vec<Capability>,
    cost: ExecutionCost,
    window: TimeWindow,
    duration: f64,
    correlation_time: Option<f64>,
    urgency_decay: f64,
    proximity_decay: Option<f64>,
    max_score: Option<f64>,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the task location.
    pub fn location(mut self, location: Position) -> Self {
        self.location = location;
        self
    }

    /// Add a required capability.
    pub fn capability(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Set the execution cost.
    pub fn cost(mut self, cost: ExecutionCost) -> Self {
        self.cost = cost;
        self
    }

    /// Set the availability window.
    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the time spent performing the task.
    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// Bound the arrival offset between coalition partners.
    pub fn correlation_time(mut self, t_corr: f64) -> Self {
        self.correlation_time = Some(t_corr);
        self
    }

    /// Set the score decay rate over arrival time.
    pub fn urgency_decay(mut self, lambda: f64) -> Self {
        self.urgency_decay = lambda;
        self
    }

    /// Set the proximity decay over travelled distance.
    pub fn proximity_decay(mut self, gamma: f64) -> Self {
        self.proximity_decay = Some(gamma);
        self
    }

    /// Set the maximum achievable score.
    pub fn max_score(mut self, max_score: f64) -> Self {
        self.max_score = Some(max_score);
        self
    }

    /// Build and validate the TaskSpec.
    pub fn build(self) -> Result<TaskSpec> {
        let name = self.name.ok_or_else(|| AccordError::InvalidTask {
            message: "Task name is required".to_string(),
        })?;
        let max_score = self.max_score.ok_or_else(|| AccordError::InvalidTask {
            message: format!("task {} has no max score", name),
        })?;

        let spec = TaskSpec {
            name,
            location: self.location,
            capabilities: self.capabilities,
            cost: self.cost,
            window: self.window,
            duration: self.duration,
            correlation_time: self.correlation_time,
            urgency_decay: self.urgency_decay,
            proximity_decay: self.proximity_decay,
            max_score,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// One way of contributing to a task: a main capability, optionally performed
/// jointly with agents providing the listed co-dependency capabilities.
#[derive(Debug)]
pub struct Subtask {
    id: SubtaskId,
    task: TaskId,
    main: Capability,
    dependencies: Vec<Capability>,
    partiality: usize,
    local_index: usize,
    completed: AtomicBool,
}

impl Subtask {
    pub fn id(&self) -> SubtaskId {
        self.id
    }

    /// Parent task.
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Capability an agent needs to bid on this subtask.
    pub fn main_capability(&self) -> &Capability {
        &self.main
    }

    /// Capabilities that must be supplied by coalition partners.
    pub fn dependencies(&self) -> &[Capability] {
        &self.dependencies
    }

    /// Number of capabilities this subtask satisfies (`K`).
    pub fn partiality(&self) -> usize {
        self.partiality
    }

    /// Position within the parent task (`i_q`).
    pub fn local_index(&self) -> usize {
        self.local_index
    }

    /// Identity string, e.g. `IR` or `IR_{MW}`.
    pub fn name(&self) -> String {
        if self.dependencies.is_empty() {
            return self.main.to_string();
        }
        let deps: Vec<&str> = self.dependencies.iter().map(Capability::as_str).collect();
        format!("{}_{{{}}}", self.main, deps.join(","))
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn set_complete(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }
}

/// A task with its derived subtasks and their dependency model.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    spec: TaskSpec,
    subtasks: Vec<SubtaskId>,
    dependencies: DependencyMatrix,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Number of required capabilities (`I`).
    pub fn capability_count(&self) -> usize {
        self.spec.capabilities.len()
    }

    /// Subtasks in decomposition order.
    pub fn subtasks(&self) -> &[SubtaskId] {
        &self.subtasks
    }

    pub fn dependencies(&self) -> &DependencyMatrix {
        &self.dependencies
    }
}

/// Split a capability list into `(main, co-dependencies)` pairs.
///
/// `{A}` yields `A`. `{A, B}` yields `A_{B}`, `B_{A}`, `A`, `B`: the task is
/// satisfied either jointly at full score or by one capability at partial score.
pub fn decompose(
    task: &str,
    capabilities: &[Capability],
) -> Result<Vec<(Capability, Vec<Capability>)>> {
    match capabilities {
        [] => Err(AccordError::InvalidTask {
            message: format!("task {} requires no capability", task),
        }),
        [only] => Ok(vec![(only.clone(), Vec::new())]),
        [a, b] => Ok(vec![
            (a.clone(), vec![b.clone()]),
            (b.clone(), vec![a.clone()]),
            (a.clone(), Vec::new()),
            (b.clone(), Vec::new()),
        ]),
        _ => Err(AccordError::UnsupportedDecomposition {
            task: task.to_string(),
            capabilities: capabilities.len(),
        }),
    }
}

fn relation(
    deps_i: &[Capability],
    main_i: &Capability,
    deps_k: &[Capability],
    main_k: &Capability,
) -> Dependency {
    if deps_i.is_empty() || deps_k.is_empty() {
        Dependency::Exclusive
    } else if deps_i.contains(main_k) || deps_k.contains(main_i) {
        Dependency::Coalition
    } else {
        Dependency::Independent
    }
}

/// Append-only arena of tasks and subtasks shared read-only by every agent.
///
/// Only the completion flags change after construction; they are set by the
/// execution side and observed on each bundle-building pass.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Vec<Task>,
    subtasks: Vec<Subtask>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena from a list of specifications.
    pub fn from_specs(specs: impl IntoIterator<Item = TaskSpec>) -> Result<Self> {
        let mut set = Self::new();
        for spec in specs {
            set.push(spec)?;
        }
        Ok(set)
    }

    /// Validate, decompose and append a task.
    pub fn push(&mut self, spec: TaskSpec) -> Result<TaskId> {
        spec.validate()?;
        let parts = decompose(&spec.name, &spec.capabilities)?;

        let task_id = TaskId(self.tasks.len());
        let first = self.subtasks.len();
        let mut dependencies = DependencyMatrix::new(parts.len());

        for i in 0..parts.len() {
            for k in (i + 1)..parts.len() {
                let rel = relation(&parts[i].1, &parts[i].0, &parts[k].1, &parts[k].0);
                dependencies.set(i, k, rel, spec.correlation_time);
            }
        }

        let mut ids = Vec::with_capacity(parts.len());
        for (local_index, (main, deps)) in parts.into_iter().enumerate() {
            let id = SubtaskId(first + local_index);
            ids.push(id);
            self.subtasks.push(Subtask {
                id,
                task: task_id,
                main,
                partiality: 1 + deps.len(),
                dependencies: deps,
                local_index,
                completed: AtomicBool::new(false),
            });
        }

        self.tasks.push(Task {
            id: task_id,
            spec,
            subtasks: ids,
            dependencies,
        });
        Ok(task_id)
    }

    /// Number of subtasks in the arena.
    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    /// # Panics
    ///
    /// Panics if `id` is not in the arena.
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    /// # Panics
    ///
    /// Panics if `id` is not in the arena. Use [`TaskSet::try_subtask`] for
    /// indices received from other agents.
    pub fn subtask(&self, id: SubtaskId) -> &Subtask {
        &self.subtasks[id.0]
    }

    pub fn try_subtask(&self, id: SubtaskId) -> Result<&Subtask> {
        self.subtasks
            .get(id.0)
            .ok_or(AccordError::UnknownSubtask { subtask: id })
    }

    /// Parent task of a subtask.
    pub fn parent(&self, id: SubtaskId) -> &Task {
        self.task(self.subtask(id).task)
    }

    /// `D` between two subtasks; independent across tasks.
    pub fn dependency(&self, j: SubtaskId, q: SubtaskId) -> Dependency {
        let (sj, sq) = (self.subtask(j), self.subtask(q));
        if sj.task != sq.task {
            return Dependency::Independent;
        }
        self.task(sj.task)
            .dependencies
            .get(sj.local_index, sq.local_index)
    }

    /// `T` between two subtasks; unbounded across tasks.
    pub fn time_limit(&self, j: SubtaskId, q: SubtaskId) -> Option<f64> {
        let (sj, sq) = (self.subtask(j), self.subtask(q));
        if sj.task != sq.task {
            return None;
        }
        self.task(sj.task)
            .dependencies
            .time_limit(sj.local_index, sq.local_index)
    }

    /// Subtasks that must be co-awarded with `j`.
    pub fn coalition_partners(&self, j: SubtaskId) -> Vec<SubtaskId> {
        let sub = self.subtask(j);
        let task = self.task(sub.task);
        task.dependencies
            .coalition_partners(sub.local_index)
            .map(|k| task.subtasks[k])
            .collect()
    }

    /// Subtasks mutually exclusive with `j`.
    pub fn exclusive_with(&self, j: SubtaskId) -> Vec<SubtaskId> {
        let sub = self.subtask(j);
        let task = self.task(sub.task);
        task.dependencies
            .exclusive_with(sub.local_index)
            .map(|k| task.subtasks[k])
            .collect()
    }

    pub fn is_complete(&self, j: SubtaskId) -> bool {
        self.subtask(j).is_complete()
    }

    /// A task is complete once every one of its subtasks is.
    pub fn is_task_complete(&self, id: TaskId) -> bool {
        self.task(id)
            .subtasks
            .iter()
            .all(|&j| self.subtask(j).is_complete())
    }

    /// Subtasks still open for bidding.
    pub fn incomplete(&self) -> impl Iterator<Item = &Subtask> + '_ {
        self.subtasks.iter().filter(|s| !s.is_complete())
    }

    /// Mark `j` performed. Its mutually exclusive alternatives can no longer
    /// be performed and are closed with it.
    ///
    /// Returns every subtask newly marked complete.
    pub fn mark_complete(&self, j: SubtaskId) -> Result<Vec<SubtaskId>> {
        let sub = self.try_subtask(j)?;
        let mut closed = Vec::new();
        if sub.set_complete() {
            closed.push(j);
        }
        for q in self.exclusive_with(j) {
            if self.subtask(q).set_complete() {
                closed.push(q);
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_capability_spec() -> TaskSpec {
        TaskSpec::builder()
            .name("survey")
            .location(Position::new(3.0, 4.0, 0.0))
            .capability("IR")
            .capability("MW")
            .correlation_time(2.0)
            .max_score(100.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_capability_decomposition() {
        let spec = TaskSpec::builder()
            .name("photo")
            .capability("IR")
            .max_score(10.0)
            .build()
            .unwrap();
        let set = TaskSet::from_specs([spec]).unwrap();

        assert_eq!(set.len(), 1);
        let sub = set.subtask(SubtaskId(0));
        assert_eq!(sub.name(), "IR");
        assert_eq!(sub.partiality(), 1);
        assert_eq!(set.task(TaskId(0)).dependencies().to_rows(), vec![vec![0]]);
    }

    #[test]
    fn test_two_capability_decomposition() {
        let set = TaskSet::from_specs([two_capability_spec()]).unwrap();
        let names: Vec<String> = set.subtasks().iter().map(Subtask::name).collect();

        assert_eq!(names, vec!["IR_{MW}", "MW_{IR}", "IR", "MW"]);
        assert_eq!(
            set.subtasks().iter().map(Subtask::partiality).collect::<Vec<_>>(),
            vec![2, 2, 1, 1]
        );

        let matrix = set.task(TaskId(0)).dependencies();
        assert_eq!(
            matrix.to_rows(),
            vec![
                vec![0, 1, -1, -1],
                vec![1, 0, -1, -1],
                vec![-1, -1, 0, -1],
                vec![-1, -1, -1, 0],
            ]
        );
        assert_eq!(matrix.time_limit(0, 1), Some(2.0));
        assert_eq!(matrix.time_limit(0, 2), None);
    }

    #[test]
    fn test_three_capabilities_unsupported() {
        let spec = TaskSpec::builder()
            .name("triple")
            .capability("IR")
            .capability("MW")
            .capability("VIS")
            .max_score(10.0)
            .build()
            .unwrap();

        let err = TaskSet::new().push(spec).unwrap_err();
        assert!(matches!(
            err,
            AccordError::UnsupportedDecomposition { capabilities: 3, .. }
        ));
    }

    #[test]
    fn test_invalid_specs_rejected() {
        assert!(TaskSpec::builder().capability("IR").max_score(1.0).build().is_err());
        assert!(TaskSpec::builder().name("x").max_score(1.0).build().is_err());
        assert!(TaskSpec::builder()
            .name("x")
            .capability("IR")
            .capability("IR")
            .max_score(1.0)
            .build()
            .is_err());
        assert!(TaskSpec::builder()
            .name("x")
            .capability("IR")
            .window(TimeWindow::new(5.0, 1.0))
            .max_score(1.0)
            .build()
            .is_err());
    }

    #[test]
    fn test_arena_indices_across_tasks() {
        let single = TaskSpec::builder()
            .name("photo")
            .capability("MW")
            .max_score(10.0)
            .build()
            .unwrap();
        let set = TaskSet::from_specs([single, two_capability_spec()]).unwrap();

        assert_eq!(set.len(), 5);
        assert_eq!(set.task(TaskId(1)).subtasks()[0], SubtaskId(1));
        assert_eq!(set.coalition_partners(SubtaskId(1)), vec![SubtaskId(2)]);
        assert_eq!(set.dependency(SubtaskId(0), SubtaskId(3)), Dependency::Independent);
        assert_eq!(set.time_limit(SubtaskId(2), SubtaskId(1)), Some(2.0));
        assert!(set.try_subtask(SubtaskId(9)).is_err());
    }

    #[test]
    fn test_mark_complete_closes_exclusive_alternatives() {
        let set = TaskSet::from_specs([two_capability_spec()]).unwrap();

        let closed = set.mark_complete(SubtaskId(2)).unwrap();
        assert_eq!(closed, vec![SubtaskId(2), SubtaskId(0), SubtaskId(1), SubtaskId(3)]);
        assert!(set.is_task_complete(TaskId(0)));
        assert_eq!(set.incomplete().count(), 0);
        assert!(set.mark_complete(SubtaskId(2)).unwrap().is_empty());
    }

    #[test]
    fn test_joint_completion_leaves_partner_open() {
        let set = TaskSet::from_specs([two_capability_spec()]).unwrap();

        set.mark_complete(SubtaskId(0)).unwrap();
        assert!(set.is_complete(SubtaskId(2)));
        assert!(set.is_complete(SubtaskId(3)));
        assert!(!set.is_complete(SubtaskId(1)));
        assert!(!set.is_task_complete(TaskId(0)));

        set.mark_complete(SubtaskId(1)).unwrap();
        assert!(set.is_task_complete(TaskId(0)));
    }

    fn capability_list() -> impl Strategy<Value = Vec<String>> {
        prop::sample::subsequence(vec!["IR", "MW", "VIS", "SAR"], 1..=2)
            .prop_map(|caps| caps.into_iter().map(String::from).collect())
    }

    proptest! {
        #[test]
        fn prop_dependency_matrix_symmetric(
            lists in prop::collection::vec(capability_list(), 1..6),
            t_corr in prop::option::of(0.0f64..50.0),
        ) {
            let mut set = TaskSet::new();
            for (i, caps) in lists.iter().enumerate() {
                let spec = TaskSpec {
                    name: format!("task-{}", i),
                    location: Position::default(),
                    capabilities: caps.iter().map(|c| Capability::new(c.as_str())).collect(),
                    cost: ExecutionCost::default(),
                    window: TimeWindow::default(),
                    duration: 0.0,
                    correlation_time: t_corr,
                    urgency_decay: 0.0,
                    proximity_decay: None,
                    max_score: 10.0,
                };
                set.push(spec).unwrap();
            }

            for task in set.tasks() {
                prop_assert!(task.dependencies().is_symmetric());
            }
            for a in set.subtasks() {
                prop_assert_eq!(set.dependency(a.id(), a.id()), Dependency::Independent);
                for b in set.subtasks() {
                    prop_assert_eq!(set.dependency(a.id(), b.id()), set.dependency(b.id(), a.id()));
                }
            }
        }
    }
}
