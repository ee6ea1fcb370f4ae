//! Fleet engine: runs every agent's consensus session concurrently, then
//! executes the agreed assignments and starts the next planning cycle.

use accord_core::AccordError;
use accord_negotiate::{ConsensusSession, ExecutionHandoff, InMemoryBus, SessionConfig};
use accord_planner::{CcbbaPlanner, PlannerConfig};
use accord_state::LocalPlanState;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::NodeConfig;
use crate::state::FleetState;

/// Outcome of one plan-and-execute cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle: u32,
    /// Subtasks assigned across the fleet.
    pub assigned: usize,
    /// Rounds the longest session took.
    pub rounds: u64,
    /// Every session finished by global convergence.
    pub converged: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The fleet engine.
pub struct Engine {
    state: FleetState,
    planner: PlannerConfig,
    session: SessionConfig,
    cycles: u32,
}

impl Engine {
    pub fn new(state: FleetState, config: &NodeConfig) -> Self {
        Self {
            state,
            planner: config.planner.clone(),
            session: config.session.clone(),
            cycles: config.cycles,
        }
    }

    /// Plan and execute until every task is done, nothing more is assigned,
    /// a cycle fails to converge, or the cycle limit is reached.
    pub async fn run(&self) -> anyhow::Result<Vec<CycleSummary>> {
        info!(
            "🔧 Engine started: {} agents, {} subtasks",
            self.state.agents.len(),
            self.state.tasks.len()
        );

        let mut summaries = Vec::new();
        for cycle in 1..=self.cycles {
            if self.state.all_complete() {
                info!("🏁 All tasks complete");
                break;
            }

            let summary = self.run_cycle(cycle).await?;
            let stop = summary.assigned == 0 || !summary.converged;
            if summary.assigned == 0 {
                info!("🏁 Cycle {} assigned nothing", cycle);
            }
            summaries.push(summary);
            if stop {
                break;
            }
        }
        Ok(summaries)
    }

    /// Run one planning cycle over a fresh bus and execute its result.
    async fn run_cycle(&self, cycle: u32) -> anyhow::Result<CycleSummary> {
        info!("📋 Starting planning cycle {}", cycle);
        let started_at = Utc::now();
        let ids = self.state.agent_ids();
        let endpoints = InMemoryBus::connect(&ids);

        let mut handles = Vec::with_capacity(ids.len());
        for (profile, endpoint) in self.state.agents.iter().cloned().zip(endpoints) {
            let carried = self.state.take_plan(profile.id).await;
            let planner = CcbbaPlanner::with_config(profile, self.planner.clone());
            let mut session = ConsensusSession::new(
                planner,
                endpoint,
                self.state.tasks.clone(),
                &ids,
                self.session.clone(),
            )?
            .with_cycle(cycle);
            if let Some(plan) = carried {
                session = session.with_plan_state(plan)?;
            }

            handles.push(tokio::spawn(async move {
                let outcome = session.run().await;
                match outcome {
                    Ok(handoff) => Ok((handoff, session.into_plan_state())),
                    Err(e) => {
                        let agent = session.agent();
                        if let Err(leave_err) = session.leave(e.to_string()).await {
                            error!("Agent {} could not announce departure: {}", agent, leave_err);
                        }
                        Err(e)
                    }
                }
            }));
        }

        let mut results: Vec<(ExecutionHandoff, LocalPlanState)> = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            let outcome: Result<_, AccordError> = joined?;
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("❌ Session failed in cycle {}: {}", cycle, e);
                    return Err(e.into());
                }
            }
        }

        let converged = results.iter().all(|(handoff, _)| handoff.converged);
        let rounds = results.iter().map(|(h, _)| h.rounds).max().unwrap_or(0);
        let assigned = results.iter().map(|(h, _)| h.path.len()).sum();

        if converged {
            for (handoff, _) in &results {
                self.execute(handoff)?;
            }
        } else {
            warn!(
                "Cycle {} stopped after {} rounds without global convergence; nothing executed",
                cycle, rounds
            );
        }

        for (handoff, mut plan) in results {
            if converged {
                plan.commit_cycle();
                self.state.record_handoff(handoff).await;
            }
            self.state.store_plan(plan).await;
        }

        info!(
            "✅ Cycle {} agreed on {} subtasks in {} rounds",
            cycle, assigned, rounds
        );
        Ok(CycleSummary {
            cycle,
            assigned,
            rounds,
            converged,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Mark every subtask on a handoff's path performed.
    fn execute(&self, handoff: &ExecutionHandoff) -> anyhow::Result<()> {
        if handoff.is_empty() {
            return Ok(());
        }
        info!(
            "🚀 Agent {} executing {} subtasks",
            handoff.agent,
            handoff.path.len()
        );
        for (&j, arrival) in handoff.path.iter().zip(&handoff.arrival_times) {
            let closed = self.state.tasks.mark_complete(j)?;
            info!(
                "  📌 {} ({}) at t={:.2}, closing {} subtasks",
                j,
                self.state.tasks.subtask(j).name(),
                arrival,
                closed.len()
            );
        }
        Ok(())
    }
}
