//! Error types for the Accord allocator.

use thiserror::Error;

use crate::types::{AgentId, SubtaskId, TaskId};

/// Main error type for Accord operations.
///
/// Eligibility and feasibility failures during bidding are not errors: they
/// are protocol outcomes handled through availability flags, violation
/// counters and permission budgets.
#[derive(Error, Debug, Clone)]
pub enum AccordError {
    /// A task requires more concurrent capabilities than the decomposition supports.
    #[error("Unsupported decomposition for task {task}: {capabilities} required capabilities")]
    UnsupportedDecomposition { task: String, capabilities: usize },

    /// A task specification is malformed.
    #[error("Invalid task: {message}")]
    InvalidTask { message: String },

    /// A received plan snapshot does not line up with the local subtask arena.
    #[error("Snapshot from {sender} does not match local plan state: expected {expected}, found {found}")]
    SnapshotMismatch {
        sender: AgentId,
        expected: String,
        found: String,
    },

    /// A subtask index outside the shared arena.
    #[error("Unknown subtask {subtask}")]
    UnknownSubtask { subtask: SubtaskId },

    /// A task index outside the shared arena.
    #[error("Unknown task {task}")]
    UnknownTask { task: TaskId },

    /// Message delivery failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Peers did not deliver their round snapshot in time.
    #[error("Round {round} timed out waiting for {missing} peer(s)")]
    RoundTimeout { round: u64, missing: usize },

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccordError {
    /// Returns true if the caller may retry the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AccordError::RoundTimeout { .. } | AccordError::Transport(_)
        )
    }

    /// Returns true for errors that indicate inconsistent shared state
    /// between agents rather than a local failure.
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            AccordError::SnapshotMismatch { .. } | AccordError::UnknownSubtask { .. }
        )
    }
}

/// Convenience Result type for Accord operations.
pub type Result<T> = std::result::Result<T, AccordError>;

impl From<serde_json::Error> for AccordError {
    fn from(err: serde_json::Error) -> Self {
        AccordError::SerializationError(err.to_string())
    }
}
