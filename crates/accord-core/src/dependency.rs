//! Dependency and time-correlation matrices between the subtasks of a task.

use serde::{Deserialize, Serialize};

/// Relationship between two subtasks of the same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// Only one of the two may be awarded (`-1`).
    Exclusive,
    /// Co-awardable but unrelated (`0`).
    #[default]
    Independent,
    /// Must be co-awarded to a coalition (`1`).
    Coalition,
}

impl Dependency {
    /// The conventional integer encoding.
    pub fn as_i8(self) -> i8 {
        match self {
            Dependency::Exclusive => -1,
            Dependency::Independent => 0,
            Dependency::Coalition => 1,
        }
    }
}

/// Square dependency matrix `D` paired with the time matrix `T`.
///
/// Both are indexed by a subtask's position within its parent task. A time
/// limit of `None` stands for an unbounded offset and is the value everywhere
/// `D` is not [`Dependency::Coalition`].
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyMatrix {
    size: usize,
    relations: Vec<Dependency>,
    time_limits: Vec<Option<f64>>,
}

impl DependencyMatrix {
    /// Create a matrix with every pair independent.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            relations: vec![Dependency::Independent; size * size],
            time_limits: vec![None; size * size],
        }
    }

    /// Number of subtasks covered.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Set the relation between `i` and `k` on both sides of the diagonal.
    ///
    /// The diagonal is always independent, so setting `i == k` is ignored.
    pub fn set(&mut self, i: usize, k: usize, relation: Dependency, time_limit: Option<f64>) {
        if i == k {
            return;
        }
        let limit = match relation {
            Dependency::Coalition => time_limit,
            _ => None,
        };
        for (a, b) in [(i, k), (k, i)] {
            let idx = a * self.size + b;
            self.relations[idx] = relation;
            self.time_limits[idx] = limit;
        }
    }

    /// `D[i][k]`.
    pub fn get(&self, i: usize, k: usize) -> Dependency {
        self.relations[i * self.size + k]
    }

    /// `T[i][k]`, or `None` when unbounded.
    pub fn time_limit(&self, i: usize, k: usize) -> Option<f64> {
        self.time_limits[i * self.size + k]
    }

    /// Local indices that must be co-awarded with `i`.
    pub fn coalition_partners(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&k| self.get(i, k) == Dependency::Coalition)
    }

    /// Local indices mutually exclusive with `i`.
    pub fn exclusive_with(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&k| self.get(i, k) == Dependency::Exclusive)
    }

    /// Returns true if `D` and `T` are symmetric with an independent diagonal.
    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| {
            self.get(i, i) == Dependency::Independent
                && (0..self.size).all(|k| {
                    self.get(i, k) == self.get(k, i) && self.time_limit(i, k) == self.time_limit(k, i)
                })
        })
    }

    /// `D` in its integer encoding, row by row.
    pub fn to_rows(&self) -> Vec<Vec<i8>> {
        (0..self.size)
            .map(|i| (0..self.size).map(|k| self.get(i, k).as_i8()).collect())
            .collect()
    }
}
