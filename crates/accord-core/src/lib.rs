//! # Accord Core
//!
//! Shared model for decentralized, consensus-based task allocation.
//!
//! This crate provides the fundamental building blocks:
//! - [`TaskSet`] - Append-only arena of tasks and their subtask decomposition
//! - [`DependencyMatrix`] - Coalition / exclusion relations and timing limits
//! - [`AgentProfile`] - Capabilities and cost coefficients of an agent
//! - [`Winner`] - Explicit winner record, compared by agent id
//! - [`AccordError`] - Error taxonomy

pub mod agent;
pub mod dependency;
pub mod error;
pub mod task;
pub mod types;

// Re-exports for convenience
pub use agent::AgentProfile;
pub use dependency::{Dependency, DependencyMatrix};
pub use error::{AccordError, Result};
pub use task::{ExecutionCost, Subtask, Task, TaskSet, TaskSpec, TaskSpecBuilder, TimeWindow};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::agent::AgentProfile;
    pub use crate::dependency::{Dependency, DependencyMatrix};
    pub use crate::error::{AccordError, Result};
    pub use crate::task::{ExecutionCost, TaskSet, TaskSpec, TimeWindow};
    pub use crate::types::{AgentId, Capability, Position, SubtaskId, TaskId, Winner};
}
