//! Static description of an agent taking part in the auction.

use serde::{Deserialize, Serialize};

use crate::error::{AccordError, Result};
use crate::types::{AgentId, Capability, Position};

/// Capabilities, kinematics and cost coefficients of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique identity used in winner records.
    #[serde(default)]
    pub id: AgentId,

    /// Human-readable name for logs.
    pub name: String,

    /// Capabilities carried by the agent.
    pub capabilities: Vec<Capability>,

    /// Position at the start of planning.
    pub position: Position,

    /// Time at which the agent becomes available.
    #[serde(default)]
    pub start_time: f64,

    /// Cruise speed in distance units per time unit.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Cost per unit of distance travelled.
    #[serde(default)]
    pub travel_cost: f64,

    /// Penalty paid when joining a coalition.
    #[serde(default)]
    pub merge_cost: f64,

    /// Penalty paid when leaving a coalition.
    #[serde(default)]
    pub split_cost: f64,

    /// Resource budget against which proportional execution costs are charged.
    #[serde(default)]
    pub resources: f64,
}

fn default_speed() -> f64 {
    1.0
}

impl AgentProfile {
    /// Create a profile at `position` with no capabilities and zero costs.
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            capabilities: Vec::new(),
            position,
            start_time: 0.0,
            speed: default_speed(),
            travel_cost: 0.0,
            merge_cost: 0.0,
            split_cost: 0.0,
            resources: 0.0,
        }
    }

    /// Add a capability.
    pub fn with_capability(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Set the cruise speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set the per-distance travel cost.
    pub fn with_travel_cost(mut self, cost: f64) -> Self {
        self.travel_cost = cost;
        self
    }

    /// Set coalition merge and split penalties.
    pub fn with_coalition_costs(mut self, merge: f64, split: f64) -> Self {
        self.merge_cost = merge;
        self.split_cost = split;
        self
    }

    /// Set the resource budget.
    pub fn with_resources(mut self, resources: f64) -> Self {
        self.resources = resources;
        self
    }

    /// Set the time at which the agent becomes available.
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Reject non-positive speeds and negative cost coefficients.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| AccordError::InvalidConfig { message };

        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return Err(invalid(format!(
                "agent {} has non-positive speed {}",
                self.name, self.speed
            )));
        }
        let costs = [
            ("travel cost", self.travel_cost),
            ("merge cost", self.merge_cost),
            ("split cost", self.split_cost),
            ("resources", self.resources),
        ];
        for (what, value) in costs {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(invalid(format!("agent {} has invalid {} {}", self.name, what, value)));
            }
        }
        Ok(())
    }
}
