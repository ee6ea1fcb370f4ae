//! Round-scoped message delivery between agents.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use accord_core::{AccordError, AgentId, Result};
use accord_state::PlanSnapshot;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::protocol::ConsensusMessage;

/// Queue depth of every bus inbox.
const INBOX_CAPACITY: usize = 1024;

/// Everything delivered for one round.
#[derive(Debug, Clone, Default)]
pub struct RoundDelivery {
    /// Snapshots for the round, ordered by sender.
    pub snapshots: Vec<PlanSnapshot>,
    /// Peers that announced they are leaving.
    pub departed: Vec<AgentId>,
    /// Expected peers not heard from before the timeout.
    pub missing: Vec<AgentId>,
}

impl RoundDelivery {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Broadcast and per-round barrier receive.
#[async_trait]
pub trait Transport: Send {
    /// The agent this endpoint belongs to.
    fn agent(&self) -> AgentId;

    /// Send `message` to every other agent.
    async fn broadcast(&mut self, message: ConsensusMessage) -> Result<()>;

    /// Wait for the round-`round` snapshot of every agent in `expected`.
    ///
    /// Without a timeout this waits until every expected peer has either sent
    /// its snapshot or left. With one, peers still outstanding when it fires
    /// are reported in [`RoundDelivery::missing`].
    async fn receive_all(
        &mut self,
        round: u64,
        expected: &[AgentId],
        timeout: Option<Duration>,
    ) -> Result<RoundDelivery>;
}

/// In-process bus connecting a fixed set of agents.
pub struct InMemoryBus;

impl InMemoryBus {
    /// Create one connected endpoint per agent, in the order given.
    pub fn connect(agents: &[AgentId]) -> Vec<BusEndpoint> {
        let (senders, inboxes): (Vec<_>, Vec<_>) = agents
            .iter()
            .map(|_| mpsc::channel::<ConsensusMessage>(INBOX_CAPACITY))
            .unzip();

        agents
            .iter()
            .zip(inboxes)
            .map(|(&agent, inbox)| BusEndpoint {
                agent,
                peers: agents
                    .iter()
                    .zip(&senders)
                    .filter(|(peer, _)| **peer != agent)
                    .map(|(&peer, tx)| (peer, tx.clone()))
                    .collect(),
                inbox,
                pending: BTreeMap::new(),
            })
            .collect()
    }
}

/// One agent's connection to an [`InMemoryBus`].
pub struct BusEndpoint {
    agent: AgentId,
    peers: Vec<(AgentId, mpsc::Sender<ConsensusMessage>)>,
    inbox: mpsc::Receiver<ConsensusMessage>,
    /// Snapshots that arrived ahead of the round being collected.
    pending: BTreeMap<u64, Vec<PlanSnapshot>>,
}

impl BusEndpoint {
    /// Agents this endpoint broadcasts to.
    pub fn peers(&self) -> Vec<AgentId> {
        self.peers.iter().map(|(peer, _)| *peer).collect()
    }
}

#[async_trait]
impl Transport for BusEndpoint {
    fn agent(&self) -> AgentId {
        self.agent
    }

    async fn broadcast(&mut self, message: ConsensusMessage) -> Result<()> {
        for (peer, tx) in &self.peers {
            if tx.send(message.clone()).await.is_err() {
                debug!("Agent {} not delivering to {}: endpoint closed", self.agent, peer);
            }
        }
        Ok(())
    }

    async fn receive_all(
        &mut self,
        round: u64,
        expected: &[AgentId],
        timeout: Option<Duration>,
    ) -> Result<RoundDelivery> {
        let mut waiting: HashSet<AgentId> = expected
            .iter()
            .copied()
            .filter(|&peer| peer != self.agent)
            .collect();
        let mut received: HashMap<AgentId, PlanSnapshot> = HashMap::new();
        let mut departed = Vec::new();

        for snapshot in self.pending.remove(&round).unwrap_or_default() {
            if waiting.remove(&snapshot.sender) {
                received.insert(snapshot.sender, snapshot);
            }
        }
        self.pending.retain(|&r, _| r > round);

        let deadline = timeout.map(|t| Instant::now() + t);
        while !waiting.is_empty() {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(
                                "Agent {} timed out in round {} waiting for {} peers",
                                self.agent,
                                round,
                                waiting.len()
                            );
                            break;
                        }
                    }
                }
                None => self.inbox.recv().await,
            };
            let Some(message) = next else {
                return Err(AccordError::Transport(format!(
                    "inbox of agent {} closed in round {}",
                    self.agent, round
                )));
            };

            match message {
                ConsensusMessage::Results(snapshot) if snapshot.round == round => {
                    if waiting.remove(&snapshot.sender) {
                        received.insert(snapshot.sender, snapshot);
                    }
                }
                ConsensusMessage::Results(snapshot) if snapshot.round > round => {
                    self.pending.entry(snapshot.round).or_default().push(snapshot);
                }
                ConsensusMessage::Results(snapshot) => {
                    debug!(
                        "Agent {} dropping stale round {} snapshot from {}",
                        self.agent, snapshot.round, snapshot.sender
                    );
                }
                ConsensusMessage::Leave { agent, reason } => {
                    info!("Agent {} left the session: {}", agent, reason);
                    waiting.remove(&agent);
                    departed.push(agent);
                }
            }
        }

        let mut snapshots: Vec<PlanSnapshot> = received.into_values().collect();
        snapshots.sort_by_key(|s| s.sender);
        let mut missing: Vec<AgentId> = waiting.into_iter().collect();
        missing.sort();

        Ok(RoundDelivery {
            snapshots,
            departed,
            missing,
        })
    }
}
