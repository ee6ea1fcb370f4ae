//! Geometry and timing provider consumed by the bid evaluator.

use accord_core::Position;

/// Distance and reachability queries, treated as pure functions.
///
/// Orbital or terrain-aware propagation plugs in here; the planner never
/// computes motion itself.
pub trait GeometryProvider: Send + Sync {
    /// Distance between two positions.
    fn distance(&self, from: &Position, to: &Position) -> f64;

    /// Earliest time an agent leaving `from` at `departure` can reach `to`.
    fn earliest_arrival(&self, from: &Position, departure: f64, to: &Position) -> f64;
}

/// Straight-line motion at a constant speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantSpeed {
    speed: f64,
}

impl ConstantSpeed {
    /// A provider moving at `speed`; non-positive speeds are treated as unit speed.
    pub fn new(speed: f64) -> Self {
        let speed = if speed > 0.0 { speed } else { 1.0 };
        Self { speed }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl Default for ConstantSpeed {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GeometryProvider for ConstantSpeed {
    fn distance(&self, from: &Position, to: &Position) -> f64 {
        from.distance_to(to)
    }

    fn earliest_arrival(&self, from: &Position, departure: f64, to: &Position) -> f64 {
        departure + from.distance_to(to) / self.speed
    }
}
