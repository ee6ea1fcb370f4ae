//! Per-agent consensus session: the round loop of bundle building,
//! broadcast, barrier receive and reconciliation.

use std::sync::Arc;
use std::time::Duration;

use accord_core::{AccordError, AgentId, Result, SubtaskId, TaskSet};
use accord_planner::Planner;
use accord_state::LocalPlanState;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::protocol::{ConsensusMessage, ExecutionHandoff};
use crate::reconciler::{ConvergenceTracker, ReconcileOutcome, Reconciler};
use crate::transport::Transport;

/// What to do when peers miss a round deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Reconcile without the missing snapshots.
    #[default]
    AssumeSilent,
    /// Abort the round with [`AccordError::RoundTimeout`].
    Fail,
}

/// Round loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Global round limit.
    pub max_rounds: u64,

    /// Per-round receive deadline. `None` waits for every peer.
    pub round_timeout_ms: Option<u64>,

    /// Applied when the deadline passes with peers outstanding.
    pub timeout_policy: TimeoutPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_rounds: 500,
            round_timeout_ms: None,
            timeout_policy: TimeoutPolicy::AssumeSilent,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(AccordError::InvalidConfig {
                message: "max_rounds must be at least 1".to_string(),
            });
        }
        if self.round_timeout_ms == Some(0) {
            return Err(AccordError::InvalidConfig {
                message: "round_timeout_ms must be positive when set".to_string(),
            });
        }
        Ok(())
    }

    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout_ms.map(Duration::from_millis)
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Building bundles and reconciling.
    Planning,
    /// Locally converged; broadcasting and reconciling only.
    Converged,
    /// Every participant reported convergence in the same round.
    Finished,
    /// The round limit was reached first.
    Exhausted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Exhausted)
    }
}

/// Summary of one round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: u64,
    /// Subtasks added by bundle building.
    pub inserted: Vec<SubtaskId>,
    pub outcome: ReconcileOutcome,
    /// Peer snapshots reconciled.
    pub received: usize,
    pub missing: Vec<AgentId>,
    pub departed: Vec<AgentId>,
    /// State after the round.
    pub state: SessionState,
    /// Digest of the snapshot broadcast this round.
    pub fingerprint: String,
}

/// One agent's side of a consensus run.
pub struct ConsensusSession<P: Planner, T: Transport> {
    planner: P,
    transport: T,
    tasks: Arc<TaskSet>,
    plan: LocalPlanState,
    reconciler: Reconciler,
    tracker: ConvergenceTracker,
    config: SessionConfig,
    participants: Vec<AgentId>,
    round: u64,
    cycle: u32,
    state: SessionState,
}

impl<P: Planner, T: Transport> ConsensusSession<P, T> {
    /// Create a session with a fresh plan state. `peers` lists the other
    /// agents taking part; the agent itself is ignored if present.
    pub fn new(
        planner: P,
        transport: T,
        tasks: Arc<TaskSet>,
        peers: &[AgentId],
        config: SessionConfig,
    ) -> Result<Self> {
        planner.config().validate()?;
        config.validate()?;

        let me = planner.agent().id;
        if transport.agent() != me {
            return Err(AccordError::Internal(format!(
                "transport endpoint of {} given to the planner of {}",
                transport.agent(),
                me
            )));
        }

        let mut participants: Vec<AgentId> = peers.iter().copied().filter(|&p| p != me).collect();
        participants.sort();
        participants.dedup();

        let plan = planner.config().plan_state(me, &tasks);
        let reconciler = Reconciler::new(planner.config().clone());
        let tracker = ConvergenceTracker::new(planner.config().convergence_rounds);

        Ok(Self {
            planner,
            transport,
            tasks,
            plan,
            reconciler,
            tracker,
            config,
            participants,
            round: 0,
            cycle: 1,
            state: SessionState::Planning,
        })
    }

    /// Continue from a plan state kept across planning cycles.
    pub fn with_plan_state(mut self, plan: LocalPlanState) -> Result<Self> {
        if plan.owner() != self.plan.owner() || plan.len() != self.tasks.len() {
            return Err(AccordError::Internal(format!(
                "plan state of {} with {} subtasks does not fit session of {} over {}",
                plan.owner(),
                plan.len(),
                self.plan.owner(),
                self.tasks.len()
            )));
        }
        self.plan = plan;
        Ok(self)
    }

    /// Label handoffs with planning cycle `cycle`.
    pub fn with_cycle(mut self, cycle: u32) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn agent(&self) -> AgentId {
        self.plan.owner()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn plan(&self) -> &LocalPlanState {
        &self.plan
    }

    /// Peers still expected each round.
    pub fn participants(&self) -> &[AgentId] {
        &self.participants
    }

    /// Run one round.
    pub async fn run_round(&mut self) -> Result<RoundReport> {
        if self.state.is_terminal() {
            return Err(AccordError::Internal(format!(
                "session of {} already ended in round {}",
                self.agent(),
                self.round
            )));
        }
        self.round += 1;
        let round = self.round;
        let me = self.agent();

        let inserted = if self.state == SessionState::Planning {
            self.planner.build_bundle(&self.tasks, &mut self.plan, round)?
        } else {
            Vec::new()
        };

        let announced = self.state == SessionState::Converged;
        let snapshot = self.plan.snapshot(round, announced);
        let fingerprint = snapshot.fingerprint()?;
        self.transport
            .broadcast(ConsensusMessage::Results(snapshot))
            .await?;

        let delivery = self
            .transport
            .receive_all(round, &self.participants, self.config.round_timeout())
            .await?;
        if !delivery.missing.is_empty() {
            match self.config.timeout_policy {
                TimeoutPolicy::Fail => {
                    return Err(AccordError::RoundTimeout {
                        round,
                        missing: delivery.missing.len(),
                    })
                }
                TimeoutPolicy::AssumeSilent => warn!(
                    "Agent {} reconciling round {} without {} peers",
                    me,
                    round,
                    delivery.missing.len()
                ),
            }
        }
        for agent in &delivery.departed {
            self.participants.retain(|p| p != agent);
        }

        let outcome = self
            .reconciler
            .reconcile(&self.tasks, &mut self.plan, &delivery.snapshots, round)?;
        let converged = self.tracker.observe(!inserted.is_empty(), &outcome);
        let everyone_converged = announced && delivery.snapshots.iter().all(|s| s.converged);

        let previous = self.state;
        self.state = if everyone_converged {
            SessionState::Finished
        } else if converged {
            SessionState::Converged
        } else {
            SessionState::Planning
        };

        match (previous, self.state) {
            (_, SessionState::Finished) if !delivery.missing.is_empty() => {
                let silent: Vec<String> = delivery.missing.iter().map(|p| p.to_string()).collect();
                warn!(
                    "Agent {} finished after {} rounds assuming silent peers [{}] converged",
                    me,
                    round,
                    silent.join(", ")
                )
            }
            (_, SessionState::Finished) => {
                info!("Agent {} finished after {} rounds", me, round)
            }
            (SessionState::Planning, SessionState::Converged) => info!(
                "Agent {} converged after {} clean rounds",
                me,
                self.tracker.clean_rounds()
            ),
            (SessionState::Converged, SessionState::Planning) => {
                debug!("Agent {} resumed planning in round {}", me, round)
            }
            _ => {}
        }
        if !self.state.is_terminal() && round >= self.config.max_rounds {
            warn!("Agent {} hit the round limit of {}", me, self.config.max_rounds);
            self.state = SessionState::Exhausted;
        }

        debug!(
            "Agent {} round {}: {} inserted, {} updates, {} resets, {} released, {} discrepancies",
            me,
            round,
            inserted.len(),
            outcome.updates,
            outcome.resets,
            outcome.released.len(),
            outcome.discrepancies
        );

        Ok(RoundReport {
            round,
            inserted,
            outcome,
            received: delivery.snapshots.len(),
            missing: delivery.missing,
            departed: delivery.departed,
            state: self.state,
            fingerprint,
        })
    }

    /// Run rounds until the session finishes or exhausts its round limit.
    pub async fn run(&mut self) -> Result<ExecutionHandoff> {
        while !self.state.is_terminal() {
            self.run_round().await?;
        }
        Ok(self.handoff())
    }

    /// The current assignment, as handed to execution.
    pub fn handoff(&self) -> ExecutionHandoff {
        ExecutionHandoff::from_state(
            &self.plan,
            self.cycle,
            self.round,
            self.state == SessionState::Finished,
        )
    }

    /// Announce departure to every peer and give up the plan state.
    pub async fn leave(mut self, reason: impl Into<String>) -> Result<LocalPlanState> {
        let agent = self.agent();
        self.transport
            .broadcast(ConsensusMessage::Leave {
                agent,
                reason: reason.into(),
            })
            .await?;
        Ok(self.plan)
    }

    pub fn into_plan_state(self) -> LocalPlanState {
        self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::{AgentProfile, Position, TaskSpec, Winner};
    use accord_planner::{CcbbaPlanner, PlannerConfig};

    use crate::transport::{BusEndpoint, InMemoryBus};

    fn fast_config() -> PlannerConfig {
        PlannerConfig {
            convergence_rounds: 2,
            ..Default::default()
        }
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

    fn agent(name: &str, x: f64, capability: &str) -> AgentProfile {
        AgentProfile::new(name, Position::new(x, 0.0, 0.0))
            .with_capability(capability)
            .with_travel_cost(1.0)
    }

    fn sessions(
        agents: Vec<AgentProfile>,
        tasks: &Arc<TaskSet>,
        config: SessionConfig,
    ) -> Vec<ConsensusSession<CcbbaPlanner, BusEndpoint>> {
        let ids: Vec<AgentId> = agents.iter().map(|a| a.id).collect();
        agents
            .into_iter()
            .zip(InMemoryBus::connect(&ids))
            .map(|(profile, endpoint)| {
                let planner = CcbbaPlanner::with_config(profile, fast_config());
                ConsensusSession::new(planner, endpoint, tasks.clone(), &ids, config.clone())
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_agent_converges() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 5.0)]).unwrap());
        let mut all = sessions(vec![agent("a", 0.0, "IR")], &tasks, SessionConfig::default());
        let mut session = all.pop().unwrap();

        let handoff = session.run().await.unwrap();

        assert_eq!(session.state(), SessionState::Finished);
        assert!(handoff.converged);
        assert_eq!(handoff.rounds, 4);
        assert_eq!(handoff.path, vec![SubtaskId(0)]);
        assert_eq!(handoff.arrival_times, vec![5.0]);
    }

    #[tokio::test]
    async fn test_first_round_report() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 5.0)]).unwrap());
        let mut all = sessions(vec![agent("a", 0.0, "IR")], &tasks, SessionConfig::default());
        let mut session = all.pop().unwrap();

        let first = session.run_round().await.unwrap();
        let second = session.run_round().await.unwrap();

        assert_eq!(first.inserted, vec![SubtaskId(0)]);
        assert_eq!(first.state, SessionState::Planning);
        assert!(second.inserted.is_empty());
        assert!(second.outcome.is_clean());
        assert_eq!(first.fingerprint.len(), 64);
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[tokio::test]
    async fn test_joint_task_forms_coalition() {
        let spec = TaskSpec::builder()
            .name("inspect")
            .location(Position::new(3.0, 4.0, 0.0))
            .capability("IR")
            .capability("MW")
            .correlation_time(5.0)
            .max_score(100.0)
            .build()
            .unwrap();
        let tasks = Arc::new(TaskSet::from_specs([spec]).unwrap());
        let a = agent("a", 0.0, "IR");
        let b = agent("b", 0.0, "MW");
        let (a_id, b_id) = (a.id, b.id);
        let mut all = sessions(vec![a, b], &tasks, SessionConfig::default());
        let mut second = all.pop().unwrap();
        let mut first = all.pop().unwrap();

        let (a_handoff, b_handoff) = tokio::join!(first.run(), second.run());
        let (a_handoff, b_handoff) = (a_handoff.unwrap(), b_handoff.unwrap());

        assert_eq!(a_handoff.path, vec![SubtaskId(0)]);
        assert_eq!(b_handoff.path, vec![SubtaskId(1)]);
        assert_eq!(a_handoff.coalitions, vec![vec![b_id]]);
        assert_eq!(b_handoff.coalitions, vec![vec![a_id]]);
        assert_eq!(a_handoff.rounds, b_handoff.rounds);
        assert!(a_handoff.converged && b_handoff.converged);
        assert_eq!(first.plan().winners(), second.plan().winners());

        let a_plan = first.into_plan_state();
        let b_plan = second.into_plan_state();
        for (a_entry, b_entry) in a_plan.entries().iter().zip(b_plan.entries()) {
            assert_eq!(a_entry.record.bid, b_entry.record.bid);
        }
        assert!(a_plan.record(SubtaskId(0)).bid > 0.0);
        assert!(a_plan.record(SubtaskId(1)).bid > 0.0);
        assert_eq!(a_plan.record(SubtaskId(2)).bid, 0.0);
        assert_eq!(a_plan.record(SubtaskId(3)).bid, 0.0);
    }

    #[tokio::test]
    async fn test_closer_agent_wins_contest() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 2.0)]).unwrap());
        let near = agent("near", 0.0, "IR");
        let far = agent("far", 10.0, "IR");
        let near_id = near.id;
        let mut all = sessions(vec![near, far], &tasks, SessionConfig::default());
        let mut far_session = all.pop().unwrap();
        let mut near_session = all.pop().unwrap();

        let (near_handoff, far_handoff) = tokio::join!(near_session.run(), far_session.run());
        let (near_handoff, far_handoff) = (near_handoff.unwrap(), far_handoff.unwrap());

        assert_eq!(near_handoff.path, vec![SubtaskId(0)]);
        assert!(far_handoff.is_empty());
        assert_eq!(far_session.plan().winner(SubtaskId(0)), Winner::Agent(near_id));
        assert_eq!(far_session.plan().record(SubtaskId(0)).bid, 98.0);
        assert_eq!(near_handoff.rounds, far_handoff.rounds);
    }

    #[tokio::test]
    async fn test_timeout_fail_policy() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 5.0)]).unwrap());
        let config = SessionConfig {
            round_timeout_ms: Some(20),
            timeout_policy: TimeoutPolicy::Fail,
            ..Default::default()
        };
        let mut all = sessions(
            vec![agent("a", 0.0, "IR"), agent("b", 1.0, "IR")],
            &tasks,
            config,
        );
        let _silent = all.pop().unwrap();
        let mut session = all.pop().unwrap();

        let err = session.run_round().await.unwrap_err();
        assert!(matches!(err, AccordError::RoundTimeout { round: 1, missing: 1 }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_timeout_assume_silent() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 5.0)]).unwrap());
        let config = SessionConfig {
            round_timeout_ms: Some(20),
            ..Default::default()
        };
        let mut all = sessions(
            vec![agent("a", 0.0, "IR"), agent("b", 1.0, "IR")],
            &tasks,
            config,
        );
        let silent = all.pop().unwrap();
        let mut session = all.pop().unwrap();

        let report = session.run_round().await.unwrap();
        assert_eq!(report.missing, vec![silent.agent()]);
        assert_eq!(report.received, 0);

        let mut last = report;
        while !session.state().is_terminal() {
            last = session.run_round().await.unwrap();
        }
        assert_eq!(last.state, SessionState::Finished);
        assert_eq!(last.missing, vec![silent.agent()]);

        let handoff = session.handoff();
        assert_eq!(handoff.rounds, 4);
        assert_eq!(handoff.path, vec![SubtaskId(0)]);
        assert!(handoff.converged);
    }

    #[tokio::test]
    async fn test_departed_peer_is_not_awaited() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 5.0)]).unwrap());
        let mut all = sessions(
            vec![agent("a", 0.0, "IR"), agent("b", 1.0, "IR")],
            &tasks,
            SessionConfig::default(),
        );
        let leaving = all.pop().unwrap();
        let leaving_id = leaving.agent();
        let mut session = all.pop().unwrap();

        let plan = leaving.leave("recalled").await.unwrap();
        assert!(plan.bundle().is_empty());

        let report = session.run_round().await.unwrap();
        assert_eq!(report.departed, vec![leaving_id]);
        assert!(session.participants().is_empty());

        let handoff = session.run().await.unwrap();
        assert!(handoff.converged);
        assert_eq!(handoff.rounds, 4);
    }

    #[tokio::test]
    async fn test_round_limit_exhausts() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 5.0)]).unwrap());
        let config = SessionConfig {
            max_rounds: 2,
            ..Default::default()
        };
        let mut all = sessions(vec![agent("a", 0.0, "IR")], &tasks, config);
        let mut session = all.pop().unwrap();

        let handoff = session.run().await.unwrap();
        assert_eq!(session.state(), SessionState::Exhausted);
        assert!(!handoff.converged);
        assert_eq!(handoff.rounds, 2);
        assert!(session.run_round().await.is_err());
    }

    #[tokio::test]
    async fn test_mismatched_endpoint_rejected() {
        let tasks = Arc::new(TaskSet::from_specs([single("survey", 5.0)]).unwrap());
        let profile = agent("a", 0.0, "IR");
        let stranger = AgentId::new();
        let mut endpoints = InMemoryBus::connect(&[stranger]);
        let planner = CcbbaPlanner::with_config(profile, fast_config());

        let result = ConsensusSession::new(
            planner,
            endpoints.remove(0),
            tasks,
            &[],
            SessionConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_session_config_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert!(config.round_timeout().is_none());

        let config: SessionConfig =
            serde_json::from_str(r#"{"round_timeout_ms": 50, "timeout_policy": "fail"}"#).unwrap();
        assert_eq!(config.round_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(config.timeout_policy, TimeoutPolicy::Fail);
        assert!(SessionConfig {
            max_rounds: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
