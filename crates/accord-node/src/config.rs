//! Node configuration.

use std::path::Path;

use accord_negotiate::SessionConfig;
use accord_planner::PlannerConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;

/// Everything the node reads from its optional JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub planner: PlannerConfig,
    pub session: SessionConfig,

    /// Maximum number of plan-and-execute cycles.
    pub cycles: u32,

    /// Fleet and tasks. The built-in demo is used when absent.
    pub scenario: Option<Scenario>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            session: SessionConfig::default(),
            cycles: 3,
            scenario: None,
        }
    }
}

impl NodeConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: NodeConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.planner.validate()?;
        self.session.validate()?;
        if self.cycles == 0 {
            anyhow::bail!("cycles must be at least 1");
        }
        if let Some(scenario) = &self.scenario {
            scenario.validate()?;
        }
        Ok(())
    }

    /// The configured scenario, or the demo fleet.
    pub fn scenario(&self) -> Scenario {
        self.scenario.clone().unwrap_or_else(Scenario::demo)
    }
}
