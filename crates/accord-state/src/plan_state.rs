//! An agent's working memory across bundle building and consensus.

use std::collections::HashSet;

use accord_core::{AgentId, SubtaskId, TaskSet, Winner};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::record::{LocalEntry, Permissions, SubtaskRecord};
use crate::snapshot::PlanSnapshot;

/// A subtask carried over from an executed planning cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedStep {
    pub subtask: SubtaskId,
    pub arrival: f64,
    /// Coalition partners the step was performed with.
    pub coalition: Vec<AgentId>,
}

/// Values recorded when the agent awards itself a subtask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Award {
    pub bid: f64,
    pub arrival: f64,
    pub cost: f64,
    pub score: f64,
}

/// Per-agent plan state, exclusively owned by its agent.
///
/// Entries are indexed by [`SubtaskId`], so every agent sharing the same
/// [`TaskSet`] holds vectors of identical length and order.
#[derive(Debug, Clone)]
pub struct LocalPlanState {
    owner: AgentId,
    horizon: usize,
    entries: Vec<LocalEntry>,
    bundle: Vec<SubtaskId>,
    path: Vec<SubtaskId>,
    omega: Vec<Vec<AgentId>>,
    overall_bundle: Vec<SubtaskId>,
    overall_path: Vec<CommittedStep>,
}

impl LocalPlanState {
    /// Create an empty plan state for `subtasks` subtasks.
    pub fn new(owner: AgentId, subtasks: usize, horizon: usize, permissions: Permissions) -> Self {
        Self {
            owner,
            horizon,
            entries: fresh_entries(subtasks, permissions),
            bundle: Vec::new(),
            path: Vec::new(),
            omega: Vec::new(),
            overall_bundle: Vec::new(),
            overall_path: Vec::new(),
        }
    }

    pub fn owner(&self) -> AgentId {
        self.owner
    }

    /// Maximum bundle size `M`.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Number of subtasks tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LocalEntry] {
        &self.entries
    }

    pub fn entry(&self, j: SubtaskId) -> &LocalEntry {
        &self.entries[j.0]
    }

    pub fn entry_mut(&mut self, j: SubtaskId) -> &mut LocalEntry {
        &mut self.entries[j.0]
    }

    pub fn record(&self, j: SubtaskId) -> &SubtaskRecord {
        &self.entries[j.0].record
    }

    pub fn winner(&self, j: SubtaskId) -> Winner {
        self.entries[j.0].record.winner
    }

    /// Winners of every subtask, in arena order.
    pub fn winners(&self) -> Vec<Winner> {
        self.entries.iter().map(|e| e.record.winner).collect()
    }

    /// Subtasks in insertion order.
    pub fn bundle(&self) -> &[SubtaskId] {
        &self.bundle
    }

    /// Subtasks in execution order.
    pub fn path(&self) -> &[SubtaskId] {
        &self.path
    }

    /// Coalition partners per path position.
    pub fn coalitions(&self) -> &[Vec<AgentId>] {
        &self.omega
    }

    pub fn overall_bundle(&self) -> &[SubtaskId] {
        &self.overall_bundle
    }

    pub fn overall_path(&self) -> &[CommittedStep] {
        &self.overall_path
    }

    pub fn is_full(&self) -> bool {
        self.bundle.len() >= self.horizon
    }

    pub fn in_bundle(&self, j: SubtaskId) -> bool {
        self.bundle.contains(&j)
    }

    pub fn bundle_position(&self, j: SubtaskId) -> Option<usize> {
        self.bundle.iter().position(|&b| b == j)
    }

    /// Arrival times along the path.
    pub fn arrival_times(&self) -> Vec<f64> {
        self.path.iter().map(|&j| self.record(j).arrival).collect()
    }

    /// Record this agent as the winner of `j` and insert it into the bundle
    /// and at `insertion` in the path.
    ///
    /// Returns false without changes if the bundle is full or already holds `j`.
    pub fn award(&mut self, j: SubtaskId, award: Award, insertion: usize, round: u64) -> bool {
        if self.is_full() || self.in_bundle(j) {
            return false;
        }
        let owner = self.owner;
        let entry = self.entry_mut(j);
        entry.self_bid = award.bid;
        entry.cost = award.cost;
        entry.score = award.score;
        entry.record.bid = award.bid;
        entry.record.winner = Winner::Agent(owner);
        entry.record.arrival = award.arrival;
        entry.record.stamp = round;

        let at = insertion.min(self.path.len());
        self.bundle.push(j);
        self.path.insert(at, j);
        self.omega.insert(at, Vec::new());
        true
    }

    pub fn set_arrival(&mut self, j: SubtaskId, arrival: f64) {
        self.entries[j.0].record.arrival = arrival;
    }

    /// Copy a peer's view of `j`. Returns true if the shared fields changed.
    pub fn adopt(&mut self, j: SubtaskId, peer: &SubtaskRecord) -> bool {
        let record = &mut self.entries[j.0].record;
        let changed = record.winner != peer.winner
            || record.bid != peer.bid
            || record.arrival != peer.arrival
            || record.stamp != peer.stamp;
        record.bid = peer.bid;
        record.winner = peer.winner;
        record.arrival = peer.arrival;
        record.stamp = peer.stamp;
        changed
    }

    /// Clear the winner of `j`. Returns true if there was one.
    pub fn reset(&mut self, j: SubtaskId, round: u64) -> bool {
        let record = &mut self.entries[j.0].record;
        let changed = record.winner.is_some() || record.bid != 0.0;
        record.bid = 0.0;
        record.winner = Winner::None;
        record.arrival = 0.0;
        record.stamp = round;
        changed
    }

    /// Remove `j` and every entry inserted after it from the bundle and path.
    ///
    /// Downstream bids were computed on top of `j`, so released subtasks
    /// still recorded as won by this agent are reset.
    pub fn release_from(&mut self, j: SubtaskId, round: u64) -> Vec<SubtaskId> {
        let Some(position) = self.bundle_position(j) else {
            return Vec::new();
        };
        let released = self.bundle.split_off(position);
        for &r in &released {
            if let Some(p) = self.path.iter().position(|&x| x == r) {
                self.path.remove(p);
                self.omega.remove(p);
            }
            if self.winner(r).is(self.owner) {
                self.reset(r, round);
            }
        }
        debug!(
            "Agent {} released {} bundle entries from {}",
            self.owner,
            released.len(),
            j
        );
        released
    }

    /// Recompute coalition membership for every path position from the
    /// current winners of each subtask's coalition partners.
    pub fn refresh_coalitions(&mut self, tasks: &TaskSet) {
        let omega = self
            .path
            .iter()
            .map(|&j| self.coalition_of(tasks, j))
            .collect();
        self.omega = omega;
    }

    /// Agents other than the owner currently winning partners of `j`.
    pub fn coalition_of(&self, tasks: &TaskSet, j: SubtaskId) -> Vec<AgentId> {
        let mut members: Vec<AgentId> = tasks
            .coalition_partners(j)
            .into_iter()
            .filter_map(|u| self.winner(u).agent())
            .filter(|&a| a != self.owner)
            .collect();
        members.sort();
        members.dedup();
        members
    }

    /// Mark every subtask available again before a bundle-building pass.
    pub fn reset_availability(&mut self) {
        for entry in &mut self.entries {
            entry.available = true;
        }
    }

    pub fn any_available(&self) -> bool {
        self.entries.iter().any(|e| e.available)
    }

    /// Export the shared vectors for broadcast.
    pub fn snapshot(&self, round: u64, converged: bool) -> PlanSnapshot {
        PlanSnapshot {
            id: Uuid::new_v4(),
            sender: self.owner,
            round,
            sent_at: Utc::now(),
            converged,
            entries: self.entries.iter().map(|e| e.record.clone()).collect(),
        }
    }

    /// Move the executed bundle and path into the overall history and start
    /// a fresh planning cycle.
    ///
    /// Bidding permissions carry over, so a subtask whose budget was spent
    /// stays closed to this agent for the rest of the scenario.
    pub fn commit_cycle(&mut self) {
        let steps: Vec<CommittedStep> = self
            .path
            .iter()
            .zip(&self.omega)
            .map(|(&j, coalition)| CommittedStep {
                subtask: j,
                arrival: self.record(j).arrival,
                coalition: coalition.clone(),
            })
            .collect();
        self.overall_path.extend(steps);
        self.overall_bundle.append(&mut self.bundle);
        self.path.clear();
        self.omega.clear();
        for entry in &mut self.entries {
            *entry = LocalEntry::new(entry.record.subtask, entry.permissions);
        }
    }

    /// Check the structural invariants of the bundle and path.
    pub fn is_consistent(&self) -> bool {
        let bundle: HashSet<SubtaskId> = self.bundle.iter().copied().collect();
        let path: HashSet<SubtaskId> = self.path.iter().copied().collect();

        self.bundle.len() <= self.horizon
            && bundle.len() == self.bundle.len()
            && path.len() == self.path.len()
            && bundle == path
            && self.omega.len() == self.path.len()
            && self.bundle.iter().all(|&j| {
                let entry = self.entry(j);
                entry.record.winner.is(self.owner) && entry.record.bid >= entry.self_bid
            })
    }
}

fn fresh_entries(subtasks: usize, permissions: Permissions) -> Vec<LocalEntry> {
    (0..subtasks)
        .map(|j| LocalEntry::new(SubtaskId(j), permissions))
        .collect()
}
