//! Phase 2: reconcile local plan state against peers' snapshots.

use accord_core::{AccordError, Result, SubtaskId, TaskSet};
use accord_planner::{grouping_claim, strongest_alternative, BiddingStrategy, PlannerConfig};
use accord_state::{LocalPlanState, PlanSnapshot};
use tracing::debug;

use crate::rules::{decide, Action};

/// Slack for comparing arrival times.
const TIME_EPSILON: f64 = 1e-9;

/// What one reconciliation pass did to the local state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Subtasks whose record was replaced by a peer's.
    pub updates: usize,
    /// Subtasks whose record was cleared.
    pub resets: usize,
    /// Bundle entries released, in release order.
    pub released: Vec<SubtaskId>,
    /// Bundle entries found violating a dependency or timing constraint.
    pub violations: usize,
    /// `(subtask, peer)` pairs whose winner or bid still disagree afterwards.
    pub discrepancies: usize,
    /// True if any local record, bundle or path entry changed.
    pub changed: bool,
}

impl ReconcileOutcome {
    /// Nothing changed and every peer agrees.
    pub fn is_clean(&self) -> bool {
        !self.changed && self.violations == 0 && self.discrepancies == 0
    }
}

/// Applies the rule table, then re-checks the constraints on held entries.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: PlannerConfig,
}

impl Reconciler {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Reconcile `state` against every snapshot received in `round`.
    ///
    /// Snapshots are applied in sender order so the result does not depend on
    /// arrival order. The agent's own snapshot, if present, is skipped.
    pub fn reconcile(
        &self,
        tasks: &TaskSet,
        state: &mut LocalPlanState,
        snapshots: &[PlanSnapshot],
        round: u64,
    ) -> Result<ReconcileOutcome> {
        if state.len() != tasks.len() {
            return Err(AccordError::Internal(format!(
                "plan state tracks {} subtasks but the task set has {}",
                state.len(),
                tasks.len()
            )));
        }
        for snapshot in snapshots {
            snapshot.validate(state.len())?;
        }

        let me = state.owner();
        let mut peers: Vec<&PlanSnapshot> = snapshots.iter().filter(|s| s.sender != me).collect();
        peers.sort_by_key(|s| s.sender);

        let mut outcome = ReconcileOutcome::default();
        for peer in &peers {
            for sub in tasks.incomplete() {
                let j = sub.id();
                let Some(theirs) = peer.record(j) else {
                    continue;
                };
                let before = state.record(j).clone();

                match decide(me, peer.sender, &before, theirs) {
                    Action::Leave => continue,
                    Action::Update => {
                        outcome.released.extend(state.release_from(j, round));
                        state.adopt(j, theirs);
                        if before.winner.is(me) && !state.winner(j).is(me) {
                            let permissions = &mut state.entry_mut(j).permissions;
                            permissions.total = permissions.total.saturating_sub(1);
                            debug!(
                                "Agent {} outbid on {} by {} ({:.3} -> {:.3})",
                                me, j, peer.sender, before.bid, theirs.bid
                            );
                        }
                        outcome.updates += 1;
                    }
                    Action::Reset => {
                        outcome.released.extend(state.release_from(j, round));
                        state.reset(j, round);
                        outcome.resets += 1;
                    }
                }
                if *state.record(j) != before {
                    outcome.changed = true;
                }
            }
        }

        self.enforce_constraints(tasks, state, round, &mut outcome);
        state.refresh_coalitions(tasks);

        outcome.discrepancies = peers
            .iter()
            .map(|peer| {
                tasks
                    .incomplete()
                    .filter(|sub| {
                        peer.record(sub.id())
                            .is_some_and(|theirs| !state.record(sub.id()).agrees_with(theirs))
                    })
                    .count()
            })
            .sum();
        if !outcome.released.is_empty() {
            outcome.changed = true;
        }

        Ok(outcome)
    }

    /// Re-check dependency, timing and mutual-exclusion constraints on every
    /// entry still in the bundle, releasing the ones that no longer hold.
    pub fn enforce_constraints(
        &self,
        tasks: &TaskSet,
        state: &mut LocalPlanState,
        round: u64,
        outcome: &mut ReconcileOutcome,
    ) {
        let held = state.bundle().to_vec();
        for j in held {
            if !state.in_bundle(j) {
                continue;
            }

            let partners = tasks.coalition_partners(j);
            let satisfied = partners
                .iter()
                .filter(|&&u| state.winner(u).is_some())
                .count();
            let arrival = state.record(j).arrival;
            let timely = partners.iter().all(|&u| {
                match (state.winner(u).is_some(), tasks.time_limit(j, u)) {
                    (true, Some(limit)) => arrival + TIME_EPSILON >= state.record(u).arrival - limit,
                    _ => true,
                }
            });

            if satisfied == partners.len() && timely {
                state.entry_mut(j).violations = 0;
            } else {
                let optimistic = self.config.strategy == BiddingStrategy::Optimistic
                    && state.entry(j).permissions.allows_optimistic();
                if optimistic {
                    outcome.violations += 1;
                    let entry = state.entry_mut(j);
                    entry.violations += 1;
                    if entry.violations <= self.config.max_violations {
                        continue;
                    }
                    entry.violations = 0;
                    entry.permissions.consume(satisfied);
                }
                debug!(
                    "Agent {} dropping {} ({}/{} partners, timely: {})",
                    state.owner(),
                    j,
                    satisfied,
                    partners.len(),
                    timely
                );
                outcome.released.extend(state.release_from(j, round));
                continue;
            }

            if let Some((claim, alternative_lowest)) = strongest_alternative(tasks, state, j) {
                let own = grouping_claim(tasks, state, j);
                let own_lowest = partners.iter().copied().chain([j]).min().unwrap_or(j);
                if claim > own || (claim == own && alternative_lowest < own_lowest) {
                    debug!(
                        "Agent {} yielding {} to an exclusive grouping ({:.3} vs {:.3})",
                        state.owner(),
                        j,
                        claim,
                        own
                    );
                    outcome.released.extend(state.release_from(j, round));
                }
            }
        }
    }
}

/// Counts consecutive clean rounds towards convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceTracker {
    required: u32,
    clean: u32,
}

impl ConvergenceTracker {
    /// Converge after `required` consecutive clean rounds.
    pub fn new(required: u32) -> Self {
        Self { required, clean: 0 }
    }

    /// Record one round. A round is clean when bundle building inserted
    /// nothing and reconciliation left everything as it was.
    /// Returns whether the agent is now converged.
    pub fn observe(&mut self, inserted: bool, outcome: &ReconcileOutcome) -> bool {
        if !inserted && outcome.is_clean() {
            self.clean = self.clean.saturating_add(1);
        } else {
            self.clean = 0;
        }
        self.is_converged()
    }

    pub fn is_converged(&self) -> bool {
        self.clean >= self.required
    }

    pub fn clean_rounds(&self) -> u32 {
        self.clean
    }

    pub fn reset(&mut self) {
        self.clean = 0;
    }
}
