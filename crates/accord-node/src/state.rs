//! Fleet state shared by the engine and its planning cycles.

use std::collections::HashMap;
use std::sync::Arc;

use accord_core::{AgentId, AgentProfile, Result, TaskSet};
use accord_negotiate::ExecutionHandoff;
use accord_state::LocalPlanState;
use tokio::sync::RwLock;

use crate::scenario::Scenario;

/// Shared fleet state.
#[derive(Clone)]
pub struct FleetState {
    /// The task arena every agent plans over.
    pub tasks: Arc<TaskSet>,

    /// Agents in the fleet.
    pub agents: Arc<Vec<AgentProfile>>,

    /// Plan state carried between cycles, per agent.
    pub plans: Arc<RwLock<HashMap<AgentId, LocalPlanState>>>,

    /// Every handoff executed so far, in cycle order.
    pub handoffs: Arc<RwLock<Vec<ExecutionHandoff>>>,
}

impl FleetState {
    pub fn new(tasks: TaskSet, agents: Vec<AgentProfile>) -> Self {
        Self {
            tasks: Arc::new(tasks),
            agents: Arc::new(agents),
            plans: Arc::new(RwLock::new(HashMap::new())),
            handoffs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Build the fleet declared by `scenario`.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        scenario.validate()?;
        Ok(Self::new(scenario.task_set()?, scenario.agents.clone()))
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id).collect()
    }

    /// Remove and return an agent's carried plan state.
    pub async fn take_plan(&self, agent: AgentId) -> Option<LocalPlanState> {
        let mut plans = self.plans.write().await;
        plans.remove(&agent)
    }

    /// Store an agent's plan state for the next cycle.
    pub async fn store_plan(&self, plan: LocalPlanState) {
        let mut plans = self.plans.write().await;
        plans.insert(plan.owner(), plan);
    }

    /// Get an agent's carried plan state.
    pub async fn get_plan(&self, agent: AgentId) -> Option<LocalPlanState> {
        let plans = self.plans.read().await;
        plans.get(&agent).cloned()
    }

    pub async fn record_handoff(&self, handoff: ExecutionHandoff) {
        let mut handoffs = self.handoffs.write().await;
        handoffs.push(handoff);
    }

    pub async fn handoffs(&self) -> Vec<ExecutionHandoff> {
        let handoffs = self.handoffs.read().await;
        handoffs.clone()
    }

    /// Handoffs of one agent across all cycles.
    pub async fn handoffs_for(&self, agent: AgentId) -> Vec<ExecutionHandoff> {
        let handoffs = self.handoffs.read().await;
        handoffs.iter().filter(|h| h.agent == agent).cloned().collect()
    }

    /// Returns true once every subtask is complete.
    pub fn all_complete(&self) -> bool {
        self.tasks.incomplete().next().is_none()
    }
}
