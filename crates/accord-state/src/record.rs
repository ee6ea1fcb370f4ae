//! Per-subtask records held in an agent's plan state.

use accord_core::{SubtaskId, Winner};
use serde::{Deserialize, Serialize};

/// The part of a subtask's record that is exchanged with peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskRecord {
    /// Subtask this record describes.
    pub subtask: SubtaskId,

    /// Winning bid `y_j`.
    pub bid: f64,

    /// Winning agent `z_j`.
    pub winner: Winner,

    /// Winner's arrival time `tz_j`.
    pub arrival: f64,

    /// Round in which the current winner was established (`s_j`).
    pub stamp: u64,
}

impl SubtaskRecord {
    /// An unclaimed record.
    pub fn empty(subtask: SubtaskId) -> Self {
        Self {
            subtask,
            bid: 0.0,
            winner: Winner::None,
            arrival: 0.0,
            stamp: 0,
        }
    }

    /// Returns true if winner and bid agree with `other`.
    pub fn agrees_with(&self, other: &SubtaskRecord) -> bool {
        self.winner == other.winner && self.bid == other.bid
    }
}

/// Bidding permissions an agent holds on one subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Bids allowed while no coalition partner is assigned (`w_solo`).
    pub solo: u32,
    /// Bids allowed while at least one partner is assigned (`w_any`).
    pub any: u32,
    /// Total bids allowed on the subtask (`w_all`).
    pub total: u32,
}

impl Permissions {
    pub fn new(solo: u32, any: u32, total: u32) -> Self {
        Self { solo, any, total }
    }

    /// Returns true while optimistic bidding is still allowed.
    pub fn allows_optimistic(&self) -> bool {
        self.solo > 0 || self.any > 0
    }

    /// Spend the permission matching the number of satisfied partners.
    pub fn consume(&mut self, satisfied_partners: usize) {
        if satisfied_partners == 0 {
            self.solo = self.solo.saturating_sub(1);
        } else {
            self.any = self.any.saturating_sub(1);
        }
        self.total = self.total.saturating_sub(1);
    }
}

/// Everything an agent knows about one subtask.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntry {
    /// Shared winner record.
    pub record: SubtaskRecord,

    /// This agent's own latest bid `c_j`.
    pub self_bid: f64,

    /// Availability flag `h_j`.
    pub available: bool,

    /// Consecutive constraint violations `v_j`.
    pub violations: u32,

    /// Remaining bidding permissions.
    pub permissions: Permissions,

    /// Cost component of the winning self-bid.
    pub cost: f64,

    /// Score component of the winning self-bid.
    pub score: f64,
}

impl LocalEntry {
    pub fn new(subtask: SubtaskId, permissions: Permissions) -> Self {
        Self {
            record: SubtaskRecord::empty(subtask),
            self_bid: 0.0,
            available: true,
            violations: 0,
            permissions,
            cost: 0.0,
            score: 0.0,
        }
    }
}
