//! # Accord State
//!
//! Local plan state for each agent: winner, bid and timestamp vectors indexed
//! by subtask, availability and violation counters, bidding permissions, the
//! current bundle and path, and the history of executed cycles.

pub mod plan_state;
pub mod record;
pub mod snapshot;

pub use plan_state::{Award, CommittedStep, LocalPlanState};
pub use record::{LocalEntry, Permissions, SubtaskRecord};
pub use snapshot::PlanSnapshot;
