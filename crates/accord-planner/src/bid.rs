//! Bid evaluation: best insertion of a candidate subtask into the current path.

use accord_core::SubtaskId;
use accord_state::Award;

use crate::utility::PathContext;

/// Result of evaluating one candidate subtask. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    pub subtask: SubtaskId,
    /// Marginal path utility, the self-bid `c_j`.
    pub value: f64,
    /// Path index the subtask is inserted at.
    pub insertion: usize,
    pub arrival: f64,
    pub cost: f64,
    pub score: f64,
    /// Arrival of every subtask on the resulting path.
    pub arrivals: Vec<(SubtaskId, f64)>,
}

impl Bid {
    pub fn award(&self) -> Award {
        Award {
            bid: self.value,
            arrival: self.arrival,
            cost: self.cost,
            score: self.score,
        }
    }
}

/// Computes marginal bids against an agent's current path.
pub struct BidEvaluator<'a> {
    ctx: PathContext<'a>,
}

impl<'a> BidEvaluator<'a> {
    pub fn new(ctx: PathContext<'a>) -> Self {
        Self { ctx }
    }

    /// Utility of the agent's current path, or `None` if it is infeasible.
    pub fn baseline(&self) -> Option<f64> {
        self.ctx.evaluate(self.ctx.state.path()).map(|v| v.total())
    }

    /// Best insertion of `j` into the current path.
    ///
    /// Every one of the `path.len() + 1` positions is tried. Insertions before
    /// the end pay the reorder penalty. Only strictly positive marginal bids
    /// are returned, and the first position wins ties.
    pub fn evaluate(&self, j: SubtaskId) -> Option<Bid> {
        let baseline = self.baseline()?;
        self.evaluate_against(j, baseline)
    }

    pub(crate) fn evaluate_against(&self, j: SubtaskId, baseline: f64) -> Option<Bid> {
        let path = self.ctx.state.path();
        let mut best: Option<Bid> = None;
        let mut best_value = 0.0;

        for insertion in 0..=path.len() {
            let mut candidate = Vec::with_capacity(path.len() + 1);
            candidate.extend_from_slice(&path[..insertion]);
            candidate.push(j);
            candidate.extend_from_slice(&path[insertion..]);

            let Some(value) = self.ctx.evaluate(&candidate) else {
                continue;
            };
            let mut marginal = value.total() - baseline;
            if insertion < path.len() {
                marginal -= self.ctx.config.reorder_penalty;
            }
            if marginal <= best_value {
                continue;
            }
            if let Some(step) = value.step(j) {
                best_value = marginal;
                best = Some(Bid {
                    subtask: j,
                    value: marginal,
                    insertion,
                    arrival: step.arrival,
                    cost: step.cost(),
                    score: step.score,
                    arrivals: value.arrivals(),
                });
            }
        }

        best
    }
}
