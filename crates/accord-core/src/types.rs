//! Common types used across the Accord allocator.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of an agent in the fleet.
///
/// Ordering is used only as a deterministic tie-break between equal bids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a fresh random agent id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.0.simple().to_string();
        write!(f, "{}", &id[..8])
    }
}

/// A sensing or actuation capability, e.g. `IR` or `MW`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Create a capability from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The capability name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Capability {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in the shared Cartesian frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Index of a task in the shared [`TaskSet`](crate::task::TaskSet) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Index of a subtask in the shared [`TaskSet`](crate::task::TaskSet) arena.
///
/// Plan-state vectors are indexed by this value on every agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(pub usize);

impl SubtaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

/// Recorded winner of a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "agent", rename_all = "snake_case")]
pub enum Winner {
    /// Nobody holds the subtask.
    #[default]
    None,
    /// The subtask is held by this agent.
    Agent(AgentId),
}

impl Winner {
    /// Returns the winning agent, if any.
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Winner::None => None,
            Winner::Agent(id) => Some(*id),
        }
    }

    /// Returns true if the subtask is held by `id`.
    pub fn is(&self, id: AgentId) -> bool {
        matches!(self, Winner::Agent(held) if *held == id)
    }

    /// Returns true if nobody holds the subtask.
    pub fn is_none(&self) -> bool {
        matches!(self, Winner::None)
    }

    /// Returns true if some agent holds the subtask.
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }
}

impl From<AgentId> for Winner {
    fn from(id: AgentId) -> Self {
        Winner::Agent(id)
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::None => f.write_str("none"),
            Winner::Agent(id) => write!(f, "{}", id),
        }
    }
}
