//! Path utility: score, travel, coalition penalties and execution cost of
//! every subtask along a candidate path.

use accord_core::{AgentId, AgentProfile, ExecutionCost, Position, SubtaskId, TaskSet};
use accord_state::LocalPlanState;

use crate::geometry::GeometryProvider;
use crate::planner::PlannerConfig;

/// Contribution of one subtask to a path.
#[derive(Debug, Clone, PartialEq)]
pub struct StepValue {
    pub subtask: SubtaskId,
    pub arrival: f64,
    pub distance: f64,
    pub score: f64,
    pub travel_cost: f64,
    pub penalty: f64,
    pub execution_cost: f64,
}

impl StepValue {
    /// Everything subtracted from the score.
    pub fn cost(&self) -> f64 {
        self.travel_cost + self.penalty + self.execution_cost
    }

    pub fn utility(&self) -> f64 {
        self.score - self.cost()
    }
}

/// Evaluated path, one step per subtask in execution order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathValue {
    pub steps: Vec<StepValue>,
}

impl PathValue {
    pub fn total(&self) -> f64 {
        self.steps.iter().map(StepValue::utility).sum()
    }

    pub fn step(&self, j: SubtaskId) -> Option<&StepValue> {
        self.steps.iter().find(|s| s.subtask == j)
    }

    pub fn arrivals(&self) -> Vec<(SubtaskId, f64)> {
        self.steps.iter().map(|s| (s.subtask, s.arrival)).collect()
    }
}

/// Everything needed to value a path for one agent.
#[derive(Clone, Copy)]
pub struct PathContext<'a> {
    pub tasks: &'a TaskSet,
    pub agent: &'a AgentProfile,
    pub geometry: &'a dyn GeometryProvider,
    pub config: &'a PlannerConfig,
    pub state: &'a LocalPlanState,
}

impl<'a> PathContext<'a> {
    /// Value `path`, or `None` if some arrival falls after its task's window.
    pub fn evaluate(&self, path: &[SubtaskId]) -> Option<PathValue> {
        let (mut origin, mut departure, mut previous) = self.starting_point();
        let mut steps: Vec<StepValue> = Vec::with_capacity(path.len());

        for &j in path {
            let task = self.tasks.parent(j);
            let spec = task.spec();
            let sub = self.tasks.subtask(j);

            let distance = self.geometry.distance(&origin, &spec.location);
            let reachable = self
                .geometry
                .earliest_arrival(&origin, departure, &spec.location)
                .max(spec.window.start);
            let arrival = self.constrained_arrival(j, reachable, &steps);
            if matches!(spec.window.end, Some(end) if arrival > end) {
                return None;
            }

            let urgency = (-spec.urgency_decay * (arrival - spec.window.start)).exp();
            let alpha = if sub.partiality() == task.capability_count() {
                1.0
            } else {
                self.config.partial_credit
            };
            let proximity = spec
                .proximity_decay
                .map_or(1.0, |gamma| 1.0 / (1.0 + (gamma * distance).exp()));
            let score = spec.max_score / sub.partiality() as f64 * urgency * alpha * proximity;

            let travel_cost = distance * self.agent.travel_cost;
            let coalition = self.state.coalition_of(self.tasks, j);
            let penalty = coalition_penalty(self.agent, &previous, &coalition);
            let execution_cost = match spec.cost {
                ExecutionCost::Constant(c) => c,
                ExecutionCost::Proportional(f) => {
                    f * (self.agent.resources - travel_cost - penalty).max(0.0)
                }
            };

            steps.push(StepValue {
                subtask: j,
                arrival,
                distance,
                score,
                travel_cost,
                penalty,
                execution_cost,
            });

            origin = spec.location;
            departure = arrival + spec.duration;
            previous = coalition;
        }

        Some(PathValue { steps })
    }

    /// Where the path begins: the end of the executed history if there is
    /// one, otherwise the agent's own position.
    fn starting_point(&self) -> (Position, f64, Vec<AgentId>) {
        match self.state.overall_path().last() {
            Some(last) => {
                let spec = self.tasks.parent(last.subtask).spec();
                (
                    spec.location,
                    last.arrival + spec.duration,
                    last.coalition.clone(),
                )
            }
            None => (self.agent.position, self.agent.start_time, Vec::new()),
        }
    }

    /// Delay `reachable` so `j` starts no earlier than `t_corr` before any
    /// assigned coalition partner.
    fn constrained_arrival(&self, j: SubtaskId, reachable: f64, earlier: &[StepValue]) -> f64 {
        let owner = self.state.owner();
        self.tasks
            .coalition_partners(j)
            .into_iter()
            .filter_map(|u| {
                let limit = self.tasks.time_limit(j, u)?;
                let partner_arrival = match earlier.iter().find(|s| s.subtask == u) {
                    Some(step) => step.arrival,
                    None => {
                        let record = self.state.record(u);
                        match record.winner.agent() {
                            Some(agent) if agent != owner => record.arrival,
                            _ => return None,
                        }
                    }
                };
                Some(partner_arrival - limit)
            })
            .fold(reachable, f64::max)
    }
}

/// Merge cost when a coalition forms, split cost when it dissolves, both
/// when it changes membership.
pub fn coalition_penalty(agent: &AgentProfile, previous: &[AgentId], current: &[AgentId]) -> f64 {
    match (previous.is_empty(), current.is_empty()) {
        (true, true) => 0.0,
        (true, false) => agent.merge_cost,
        (false, true) => agent.split_cost,
        (false, false) if previous == current => 0.0,
        (false, false) => agent.merge_cost + agent.split_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::{Position, TaskSpec, TimeWindow, Winner};
    use accord_state::{Award, SubtaskRecord};

    use crate::geometry::ConstantSpeed;

    fn agent() -> AgentProfile {
        AgentProfile::new("a", Position::default())
            .with_capability("IR")
            .with_travel_cost(1.0)
    }

    fn single(name: &str, x: f64) -> TaskSpec {
        TaskSpec::builder()
            .name(name)
            .location(Position::new(x, 0.0, 0.0))
            .capability("IR")
            .max_score(100.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_step_value() {
        let tasks = TaskSet::from_specs([single("t", 5.0)]).unwrap();
        let agent = agent();
        let config = PlannerConfig::default();
        let geo = ConstantSpeed::default();
        let state = config.plan_state(agent.id, &tasks);
        let ctx = PathContext {
            tasks: &tasks,
            agent: &agent,
            geometry: &geo,
            config: &config,
            state: &state,
        };

        let value = ctx.evaluate(&[SubtaskId(0)]).unwrap();
        let step = &value.steps[0];
        assert_eq!(step.arrival, 5.0);
        assert_eq!(step.score, 100.0);
        assert_eq!(step.travel_cost, 5.0);
        assert_eq!(value.total(), 95.0);
    }

    #[test]
    fn test_urgency_and_window() {
        let mut spec = single("late", 10.0);
        spec.urgency_decay = 0.1;
        spec.window = TimeWindow::new(2.0, 20.0);
        let mut closed = single("closed", 10.0);
        closed.window = TimeWindow::new(0.0, 4.0);
        let tasks = TaskSet::from_specs([spec, closed]).unwrap();
        let agent = agent();
        let config = PlannerConfig::default();
        let geo = ConstantSpeed::default();
        let state = config.plan_state(agent.id, &tasks);
        let ctx = PathContext {
            tasks: &tasks,
            agent: &agent,
            geometry: &geo,
            config: &config,
            state: &state,
        };

        let value = ctx.evaluate(&[SubtaskId(0)]).unwrap();
        let expected = 100.0 * (-0.1f64 * 8.0).exp();
        assert!((value.steps[0].score - expected).abs() < 1e-9);
        assert!(ctx.evaluate(&[SubtaskId(1)]).is_none());
    }

    #[test]
    fn test_arrival_waits_for_partner() {
        let spec = TaskSpec::builder()
            .name("joint")
            .location(Position::new(5.0, 0.0, 0.0))
            .capability("IR")
            .capability("MW")
            .correlation_time(2.0)
            .max_score(100.0)
            .build()
            .unwrap();
        let tasks = TaskSet::from_specs([spec]).unwrap();
        let agent = agent();
        let config = PlannerConfig::default();
        let geo = ConstantSpeed::default();
        let mut state = config.plan_state(agent.id, &tasks);
        state.adopt(
            SubtaskId(1),
            &SubtaskRecord {
                subtask: SubtaskId(1),
                bid: 40.0,
                winner: Winner::Agent(AgentId::new()),
                arrival: 20.0,
                stamp: 1,
            },
        );
        let ctx = PathContext {
            tasks: &tasks,
            agent: &agent,
            geometry: &geo,
            config: &config,
            state: &state,
        };

        let value = ctx.evaluate(&[SubtaskId(0)]).unwrap();
        assert_eq!(value.steps[0].arrival, 18.0);
        assert_eq!(value.steps[0].score, 50.0);
    }

    #[test]
    fn test_history_sets_starting_point() {
        let tasks = TaskSet::from_specs([single("first", 5.0), single("second", 8.0)]).unwrap();
        let agent = agent();
        let config = PlannerConfig::default();
        let geo = ConstantSpeed::default();
        let mut state = config.plan_state(agent.id, &tasks);
        state.award(
            SubtaskId(0),
            Award {
                bid: 95.0,
                arrival: 5.0,
                cost: 5.0,
                score: 100.0,
            },
            0,
            1,
        );
        state.commit_cycle();
        let ctx = PathContext {
            tasks: &tasks,
            agent: &agent,
            geometry: &geo,
            config: &config,
            state: &state,
        };

        let step = &ctx.evaluate(&[SubtaskId(1)]).unwrap().steps[0];
        assert_eq!(step.distance, 3.0);
        assert_eq!(step.arrival, 8.0);
    }

    #[test]
    fn test_coalition_penalty_cases() {
        let agent = agent().with_coalition_costs(1.0, 2.0);
        let a = AgentId::new();
        let b = AgentId::new();

        assert_eq!(coalition_penalty(&agent, &[], &[]), 0.0);
        assert_eq!(coalition_penalty(&agent, &[], &[a]), 1.0);
        assert_eq!(coalition_penalty(&agent, &[a], &[]), 2.0);
        assert_eq!(coalition_penalty(&agent, &[a], &[a]), 0.0);
        assert_eq!(coalition_penalty(&agent, &[a], &[b]), 3.0);
    }
}
