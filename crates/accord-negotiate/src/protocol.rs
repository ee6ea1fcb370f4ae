//! Consensus protocol messages and the execution handoff.

use accord_core::{AgentId, SubtaskId};
use accord_state::{LocalPlanState, PlanSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message types exchanged between agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsensusMessage {
    /// An agent's plan state for one round.
    Results(PlanSnapshot),

    /// An agent stops participating; peers no longer wait for it.
    Leave { agent: AgentId, reason: String },
}

impl ConsensusMessage {
    /// The agent that produced the message.
    pub fn sender(&self) -> AgentId {
        match self {
            ConsensusMessage::Results(snapshot) => snapshot.sender,
            ConsensusMessage::Leave { agent, .. } => *agent,
        }
    }

    /// Round the message belongs to, if it is round-scoped.
    pub fn round(&self) -> Option<u64> {
        match self {
            ConsensusMessage::Results(snapshot) => Some(snapshot.round),
            ConsensusMessage::Leave { .. } => None,
        }
    }
}

/// Final assignment of one agent, handed to the execution side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHandoff {
    pub agent: AgentId,

    /// Planning cycle that produced the assignment.
    pub cycle: u32,

    /// Consensus rounds the cycle took.
    pub rounds: u64,

    /// Subtasks in insertion order.
    pub bundle: Vec<SubtaskId>,

    /// Subtasks in execution order.
    pub path: Vec<SubtaskId>,

    /// Arrival time at each path entry.
    pub arrival_times: Vec<f64>,

    /// Coalition partners at each path entry.
    pub coalitions: Vec<Vec<AgentId>>,

    /// False when the round limit was hit before global convergence.
    pub converged: bool,

    pub handed_off_at: DateTime<Utc>,
}

impl ExecutionHandoff {
    pub fn from_state(state: &LocalPlanState, cycle: u32, rounds: u64, converged: bool) -> Self {
        Self {
            agent: state.owner(),
            cycle,
            rounds,
            bundle: state.bundle().to_vec(),
            path: state.path().to_vec(),
            arrival_times: state.arrival_times(),
            coalitions: state.coalitions().to_vec(),
            converged,
            handed_off_at: Utc::now(),
        }
    }

    /// Returns true if the agent was assigned nothing.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}
