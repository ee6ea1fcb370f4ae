//! # Accord Node
//!
//! Runs a fleet of agents, each as its own consensus session over an
//! in-memory bus, and prints the executed assignments as JSON.
//!
//! Usage: `accord-node [config.json]`

use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod scenario;
mod state;

use config::NodeConfig;
use engine::Engine;
use state::FleetState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Accord node starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            NodeConfig::load(path)?
        }
        None => NodeConfig::default(),
    };
    config.validate()?;

    let state = FleetState::from_scenario(&config.scenario())?;
    let engine = Engine::new(state.clone(), &config);
    let summaries = engine.run().await?;

    for summary in &summaries {
        info!(
            "Cycle {}: {} subtasks in {} rounds (converged: {})",
            summary.cycle, summary.assigned, summary.rounds, summary.converged
        );
    }

    for agent in state.agents.iter() {
        let executed: usize = state
            .handoffs_for(agent.id)
            .await
            .iter()
            .map(|h| h.path.len())
            .sum();
        let history = state
            .get_plan(agent.id)
            .await
            .map_or(0, |plan| plan.overall_path().len());
        info!(
            "Agent {} ({}) executed {} subtasks, {} in its history",
            agent.name, agent.id, executed, history
        );
    }

    let report = serde_json::json!({
        "cycles": summaries,
        "handoffs": state.handoffs().await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
