//! Phase 1: greedy bundle construction.

use std::sync::Arc;

use accord_core::{AccordError, AgentProfile, Dependency, Result, SubtaskId, TaskSet};
use accord_state::LocalPlanState;
use tracing::debug;

use crate::bid::{Bid, BidEvaluator};
use crate::geometry::{ConstantSpeed, GeometryProvider};
use crate::planner::{BiddingStrategy, Planner, PlannerConfig};
use crate::utility::PathContext;

/// State of the bundle-building loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// A subtask was inserted; another step may follow.
    Building,
    /// The bundle is full or nothing is eligible.
    Done,
}

/// Recorded claim of the grouping `j` belongs to: `y_j` plus the bids on
/// every coalition partner of `j`.
pub fn grouping_claim(tasks: &TaskSet, state: &LocalPlanState, j: SubtaskId) -> f64 {
    state.record(j).bid
        + tasks
            .coalition_partners(j)
            .into_iter()
            .map(|u| state.record(u).bid)
            .sum::<f64>()
}

/// Largest recorded claim among groupings mutually exclusive with `j`,
/// paired with the lowest subtask index of that grouping.
pub fn strongest_alternative(
    tasks: &TaskSet,
    state: &LocalPlanState,
    j: SubtaskId,
) -> Option<(f64, SubtaskId)> {
    tasks
        .exclusive_with(j)
        .into_iter()
        .map(|q| {
            let lowest = tasks
                .coalition_partners(q)
                .into_iter()
                .chain(std::iter::once(q))
                .min()
                .unwrap_or(q);
            (grouping_claim(tasks, state, q), lowest)
        })
        .fold(None, |best: Option<(f64, SubtaskId)>, (claim, lowest)| match best {
            Some((top, _)) if top >= claim => best,
            _ => Some((claim, lowest)),
        })
}

/// Runs bundle-building passes for one agent.
pub struct BundleBuilder<'a> {
    tasks: &'a TaskSet,
    agent: &'a AgentProfile,
    geometry: &'a dyn GeometryProvider,
    config: &'a PlannerConfig,
}

impl<'a> BundleBuilder<'a> {
    pub fn new(
        tasks: &'a TaskSet,
        agent: &'a AgentProfile,
        geometry: &'a dyn GeometryProvider,
        config: &'a PlannerConfig,
    ) -> Self {
        Self {
            tasks,
            agent,
            geometry,
            config,
        }
    }

    /// Insert subtasks until the bundle is full or nothing is eligible.
    /// Returns the subtasks inserted in this pass.
    pub fn build(&self, state: &mut LocalPlanState, round: u64) -> Vec<SubtaskId> {
        let start = state.bundle().len();
        state.reset_availability();
        while self.step(state, round) == BuildState::Building {}
        state.bundle()[start..].to_vec()
    }

    /// One greedy step: bid on every open subtask, then insert the best.
    pub fn step(&self, state: &mut LocalPlanState, round: u64) -> BuildState {
        if state.is_full() || !state.any_available() {
            return BuildState::Done;
        }

        let decisions = self.bid_all(state);
        let mut best: Option<Bid> = None;
        for (j, bid) in decisions {
            let entry = state.entry_mut(j);
            match bid {
                Some(bid) => {
                    entry.self_bid = bid.value;
                    entry.available = true;
                    if best.as_ref().map_or(true, |b| bid.value > b.value) {
                        best = Some(bid);
                    }
                }
                None => {
                    entry.self_bid = 0.0;
                    entry.available = false;
                }
            }
        }

        let Some(best) = best else {
            return BuildState::Done;
        };
        if !state.award(best.subtask, best.award(), best.insertion, round) {
            return BuildState::Done;
        }
        for &(k, arrival) in &best.arrivals {
            state.set_arrival(k, arrival);
        }
        state.refresh_coalitions(self.tasks);

        debug!(
            "Agent {} bid {:.3} on {} ({}) at path position {}",
            self.agent.name,
            best.value,
            best.subtask,
            self.tasks.subtask(best.subtask).name(),
            best.insertion
        );
        BuildState::Building
    }

    /// Bid on every subtask not yet in the bundle. `None` marks a subtask
    /// unavailable this step.
    fn bid_all(&self, state: &LocalPlanState) -> Vec<(SubtaskId, Option<Bid>)> {
        let evaluator = BidEvaluator::new(PathContext {
            tasks: self.tasks,
            agent: self.agent,
            geometry: self.geometry,
            config: self.config,
            state,
        });
        let baseline = evaluator.baseline();

        self.tasks
            .subtasks()
            .iter()
            .map(|sub| sub.id())
            .filter(|&j| !state.in_bundle(j))
            .map(|j| {
                if !self.can_bid(state, j) {
                    return (j, None);
                }
                let bid = baseline
                    .and_then(|base| evaluator.evaluate_against(j, base))
                    .filter(|bid| bid.value > state.record(j).bid)
                    .filter(|bid| self.coalition_test(state, j, bid.value))
                    .filter(|bid| self.mutex_test(state, j, bid.value));
                (j, bid)
            })
            .collect()
    }

    /// Capability, completion, permission and strategy checks.
    pub fn can_bid(&self, state: &LocalPlanState, j: SubtaskId) -> bool {
        let sub = self.tasks.subtask(j);
        if !self.agent.has_capability(sub.main_capability())
            || sub.is_complete()
            || state.in_bundle(j)
        {
            return false;
        }

        let permissions = state.entry(j).permissions;
        if permissions.total == 0 {
            return false;
        }
        if state
            .bundle()
            .iter()
            .any(|&b| self.tasks.dependency(j, b) == Dependency::Exclusive)
        {
            return false;
        }

        let partners = self.tasks.coalition_partners(j);
        let required = partners.len();
        let satisfied = partners
            .iter()
            .filter(|&&u| state.winner(u).is_some())
            .count();
        if satisfied == required {
            return true;
        }

        match self.config.strategy {
            BiddingStrategy::Optimistic if permissions.allows_optimistic() => {
                (permissions.any > 0 && satisfied > 0) || permissions.solo > 0
            }
            _ => false,
        }
    }

    /// The agent's own side of the coalition must outbid the recorded one.
    ///
    /// Own side: `bid` plus partners this agent already holds. Recorded side:
    /// `y_j` plus partners held by the current winner of `j`.
    pub fn coalition_test(&self, state: &LocalPlanState, j: SubtaskId, bid: f64) -> bool {
        let owner = state.owner();
        let incumbent = state.winner(j);
        let partners = self.tasks.coalition_partners(j);

        let own = bid
            + partners
                .iter()
                .filter(|&&u| state.winner(u).is(owner))
                .map(|&u| state.record(u).bid)
                .sum::<f64>();
        let recorded = state.record(j).bid
            + partners
                .iter()
                .filter(|&&u| incumbent.is_some() && state.winner(u) == incumbent)
                .map(|&u| state.record(u).bid)
                .sum::<f64>();
        own > recorded
    }

    /// The grouping `j` would complete must outbid every mutually exclusive
    /// grouping already recorded.
    pub fn mutex_test(&self, state: &LocalPlanState, j: SubtaskId, bid: f64) -> bool {
        let own = bid
            + self
                .tasks
                .coalition_partners(j)
                .into_iter()
                .map(|u| state.record(u).bid)
                .sum::<f64>();
        match strongest_alternative(self.tasks, state, j) {
            Some((claim, _)) => own > claim,
            None => true,
        }
    }
}

/// Consensus-based bundle planner for one agent.
pub struct CcbbaPlanner {
    agent: AgentProfile,
    geometry: Arc<dyn GeometryProvider>,
    config: PlannerConfig,
}

impl CcbbaPlanner {
    /// Create a planner with default configuration and straight-line motion
    /// at the agent's speed.
    pub fn new(agent: AgentProfile) -> Self {
        Self::with_config(agent, PlannerConfig::default())
    }

    /// Create a planner with custom configuration.
    pub fn with_config(agent: AgentProfile, config: PlannerConfig) -> Self {
        let geometry = Arc::new(ConstantSpeed::new(agent.speed));
        Self {
            agent,
            geometry,
            config,
        }
    }

    /// Replace the geometry provider.
    pub fn with_geometry(mut self, geometry: Arc<dyn GeometryProvider>) -> Self {
        self.geometry = geometry;
        self
    }
}

impl Planner for CcbbaPlanner {
    fn build_bundle(
        &self,
        tasks: &TaskSet,
        state: &mut LocalPlanState,
        round: u64,
    ) -> Result<Vec<SubtaskId>> {
        if state.len() != tasks.len() {
            return Err(AccordError::Internal(format!(
                "plan state tracks {} subtasks but the task set has {}",
                state.len(),
                tasks.len()
            )));
        }
        if state.owner() != self.agent.id {
            return Err(AccordError::Internal(format!(
                "planner for {} given the plan state of {}",
                self.agent.id,
                state.owner()
            )));
        }

        let builder = BundleBuilder::new(tasks, &self.agent, self.geometry.as_ref(), &self.config);
        Ok(builder.build(state, round))
    }

    fn agent(&self) -> &AgentProfile {
        &self.agent
    }

    fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn set_config(&mut self, config: PlannerConfig) {
        self.config = config;
    }
}
