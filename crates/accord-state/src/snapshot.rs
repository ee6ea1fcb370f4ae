//! Plan-state snapshots exchanged between agents each round.

use accord_core::{AccordError, AgentId, Result, SubtaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::record::SubtaskRecord;

/// The scalar vectors of an agent's plan state at one round.
///
/// Tasks and subtasks are never serialized; entries refer to them by arena index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Unique ID for this snapshot.
    pub id: Uuid,

    /// Agent that produced the snapshot.
    pub sender: AgentId,

    /// Consensus round the snapshot was broadcast in.
    pub round: u64,

    /// Wall-clock send time.
    pub sent_at: DateTime<Utc>,

    /// Whether the sender had converged when broadcasting.
    pub converged: bool,

    /// One record per subtask, in arena order.
    pub entries: Vec<SubtaskRecord>,
}

impl PlanSnapshot {
    pub fn record(&self, j: SubtaskId) -> Option<&SubtaskRecord> {
        self.entries.get(j.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that the snapshot lines up with a local arena of `expected` subtasks.
    pub fn validate(&self, expected: usize) -> Result<()> {
        if self.entries.len() != expected {
            return Err(AccordError::SnapshotMismatch {
                sender: self.sender,
                expected: format!("{} entries", expected),
                found: format!("{} entries", self.entries.len()),
            });
        }
        if let Some((i, record)) = self
            .entries
            .iter()
            .enumerate()
            .find(|(i, record)| record.subtask.0 != *i)
        {
            return Err(AccordError::SnapshotMismatch {
                sender: self.sender,
                expected: format!("subtask {} at position {}", SubtaskId(i), i),
                found: format!("subtask {}", record.subtask),
            });
        }
        Ok(())
    }

    /// SHA-256 over the shared winner vectors and convergence flag.
    ///
    /// Identity, round and send time are excluded, so two snapshots of an
    /// unchanged plan state share a fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.entries)?);
        hasher.update([u8::from(self.converged)]);
        Ok(hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect())
    }
}
