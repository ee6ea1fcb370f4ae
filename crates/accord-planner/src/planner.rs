//! Planner trait and configuration.

use accord_core::{AccordError, AgentId, AgentProfile, Result, SubtaskId, TaskSet};
use accord_state::{LocalPlanState, Permissions};
use serde::{Deserialize, Serialize};

/// When an agent may bid on a subtask whose coalition partners are not all assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiddingStrategy {
    /// Bid ahead of partners while bidding permissions remain.
    #[default]
    Optimistic,
    /// Bid only once every partner is assigned.
    Pessimistic,
}

/// Configuration for the bundle builder and constraint checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Planning horizon `M`: maximum bundle size.
    pub horizon: usize,

    /// Consecutive constraint violations tolerated before an entry is released.
    pub max_violations: u32,

    /// Bids allowed per subtask while no partner is assigned.
    pub solo_permissions: u32,

    /// Bids allowed per subtask while some partner is assigned.
    pub any_permissions: u32,

    /// Total bids allowed per subtask.
    pub total_permissions: u32,

    /// Consecutive clean rounds before an agent declares convergence (`N`).
    pub convergence_rounds: u32,

    /// Subtracted from a marginal bid whose insertion shifts existing path entries.
    pub reorder_penalty: f64,

    /// Score multiplier for subtasks satisfying only part of a task.
    pub partial_credit: f64,

    /// Bidding strategy while permissions remain.
    pub strategy: BiddingStrategy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon: 4,
            max_violations: 5,
            solo_permissions: 3,
            any_permissions: 10,
            total_permissions: 100,
            convergence_rounds: 10,
            reorder_penalty: 5.0,
            partial_credit: 1.0 / 3.0,
            strategy: BiddingStrategy::Optimistic,
        }
    }
}

impl PlannerConfig {
    /// Reject configurations the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| AccordError::InvalidConfig {
            message: message.to_string(),
        };
        if self.horizon == 0 {
            return Err(invalid("horizon must be at least 1"));
        }
        if self.convergence_rounds == 0 {
            return Err(invalid("convergence_rounds must be at least 1"));
        }
        if self.total_permissions == 0 {
            return Err(invalid("total_permissions must be at least 1"));
        }
        if !(self.reorder_penalty >= 0.0) {
            return Err(invalid("reorder_penalty must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.partial_credit) {
            return Err(invalid("partial_credit must lie in [0, 1]"));
        }
        Ok(())
    }

    /// Initial permissions granted on every subtask.
    pub fn permissions(&self) -> Permissions {
        Permissions::new(
            self.solo_permissions,
            self.any_permissions,
            self.total_permissions,
        )
    }

    /// A fresh plan state sized for `tasks`.
    pub fn plan_state(&self, owner: AgentId, tasks: &TaskSet) -> LocalPlanState {
        LocalPlanState::new(owner, tasks.len(), self.horizon, self.permissions())
    }
}

/// Trait for bundle-building engines.
pub trait Planner: Send + Sync {
    /// Run one bundle-building pass and return the subtasks inserted.
    fn build_bundle(
        &self,
        tasks: &TaskSet,
        state: &mut LocalPlanState,
        round: u64,
    ) -> Result<Vec<SubtaskId>>;

    /// The agent this planner bids for.
    fn agent(&self) -> &AgentProfile;

    /// Get the planner configuration.
    fn config(&self) -> &PlannerConfig;

    /// Update the planner configuration.
    fn set_config(&mut self, config: PlannerConfig);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.permissions(), Permissions::new(3, 10, 100));
    }

    #[test]
    fn test_invalid_configs() {
        let zero_horizon = PlannerConfig {
            horizon: 0,
            ..Default::default()
        };
        assert!(zero_horizon.validate().is_err());

        let bad_credit = PlannerConfig {
            partial_credit: 1.5,
            ..Default::default()
        };
        assert!(bad_credit.validate().is_err());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"horizon": 2, "strategy": "pessimistic"}"#).unwrap();

        assert_eq!(config.horizon, 2);
        assert_eq!(config.strategy, BiddingStrategy::Pessimistic);
        assert_eq!(config.max_violations, 5);
    }
}
