//! Fleet and task declarations.

use std::collections::HashSet;

use accord_core::{AccordError, AgentProfile, Position, Result, TaskSet, TaskSpec, TimeWindow};
use serde::{Deserialize, Serialize};

/// Agents and tasks for one run, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub agents: Vec<AgentProfile>,
    pub tasks: Vec<TaskSpec>,
}

impl Scenario {
    /// Harbor inspection: two infrared and two multispectral drones, two
    /// single-sensor tasks and two tasks that need both sensors.
    pub fn demo() -> Self {
        let drone = |name: &str, x: f64, y: f64, capability: &str| {
            AgentProfile::new(name, Position::new(x, y, 0.0))
                .with_capability(capability)
                .with_speed(2.0)
                .with_travel_cost(0.5)
                .with_coalition_costs(1.0, 1.0)
        };
        let agents = vec![
            drone("ir-north", 0.0, 20.0, "IR"),
            drone("ir-south", 0.0, 0.0, "IR"),
            drone("mw-north", 5.0, 20.0, "MW"),
            drone("mw-south", 5.0, 0.0, "MW"),
        ];

        let tasks = vec![
            TaskSpec {
                name: "pier-survey".to_string(),
                location: Position::new(8.0, 18.0, 0.0),
                capabilities: vec!["IR".into()],
                cost: Default::default(),
                window: TimeWindow::open(0.0),
                duration: 2.0,
                correlation_time: None,
                urgency_decay: 0.01,
                proximity_decay: None,
                max_score: 60.0,
            },
            TaskSpec {
                name: "buoy-check".to_string(),
                location: Position::new(12.0, 4.0, 0.0),
                capabilities: vec!["MW".into()],
                cost: Default::default(),
                window: TimeWindow::new(0.0, 40.0),
                duration: 1.0,
                correlation_time: None,
                urgency_decay: 0.02,
                proximity_decay: None,
                max_score: 50.0,
            },
            TaskSpec {
                name: "hull-scan".to_string(),
                location: Position::new(15.0, 10.0, 0.0),
                capabilities: vec!["IR".into(), "MW".into()],
                cost: Default::default(),
                window: TimeWindow::open(0.0),
                duration: 3.0,
                correlation_time: Some(4.0),
                urgency_decay: 0.01,
                proximity_decay: None,
                max_score: 150.0,
            },
            TaskSpec {
                name: "channel-sweep".to_string(),
                location: Position::new(25.0, 2.0, 0.0),
                capabilities: vec!["MW".into(), "IR".into()],
                cost: Default::default(),
                window: TimeWindow::new(5.0, 60.0),
                duration: 4.0,
                correlation_time: Some(6.0),
                urgency_decay: 0.02,
                proximity_decay: Some(0.05),
                max_score: 180.0,
            },
        ];

        Self { agents, tasks }
    }

    /// Reject empty fleets, duplicate agent ids and invalid agent profiles,
    /// and validate every task.
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(AccordError::InvalidConfig {
                message: "scenario has no agents".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id) {
                return Err(AccordError::InvalidConfig {
                    message: format!("agent id {} used twice", agent.id),
                });
            }
            agent.validate()?;
        }
        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }

    /// Decompose the declared tasks into a shared arena.
    pub fn task_set(&self) -> Result<TaskSet> {
        TaskSet::from_specs(self.tasks.iter().cloned())
    }
}
