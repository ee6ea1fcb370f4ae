//! # Accord Negotiate
//!
//! Phase 2 of the allocator and the round loop around it.
//!
//! - [`ConsensusMessage`] - Snapshots and departures exchanged between agents
//! - [`rules`] - Pairwise conflict-resolution table
//! - [`Reconciler`] - Applies the table and re-checks held constraints
//! - [`Transport`] - Broadcast and per-round barrier receive
//! - [`ConsensusSession`] - Bundle building, exchange and reconciliation per round

pub mod protocol;
pub mod reconciler;
pub mod rules;
pub mod session;
pub mod transport;

pub use protocol::{ConsensusMessage, ExecutionHandoff};
pub use reconciler::{ConvergenceTracker, ReconcileOutcome, Reconciler};
pub use rules::{decide, Action, Owner, Rule};
pub use session::{ConsensusSession, RoundReport, SessionConfig, SessionState, TimeoutPolicy};
pub use transport::{BusEndpoint, InMemoryBus, RoundDelivery, Transport};
