//! # Accord Planner
//!
//! Phase 1 of the allocator: each agent values candidate subtasks against its
//! current path and greedily grows a bundle of at most `M` subtasks.
//!
//! - [`GeometryProvider`] - Distance and reachability supplied from outside
//! - [`BidEvaluator`] - Best insertion and marginal bid for one subtask
//! - [`BundleBuilder`] - Eligibility, coalition and mutual-exclusion tests
//! - [`CcbbaPlanner`] - [`Planner`] implementation tying them together

pub mod bid;
pub mod bundle;
pub mod geometry;
pub mod planner;
pub mod utility;

pub use bid::{Bid, BidEvaluator};
pub use bundle::{grouping_claim, strongest_alternative, BuildState, BundleBuilder, CcbbaPlanner};
pub use geometry::{ConstantSpeed, GeometryProvider};
pub use planner::{BiddingStrategy, Planner, PlannerConfig};
pub use utility::{coalition_penalty, PathContext, PathValue, StepValue};
