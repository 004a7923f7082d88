//Aobb
//Copyright (C) 2023-2025 the aobb developers
//
//This program is free software: you can redistribute it and/or modify
//it under the terms of the GNU Affero General Public License as published by
//the Free Software Foundation, either version 3 of the License, or
//(at your option) any later version.
//
//This program is distributed in the hope that it will be useful,
//but WITHOUT ANY WARRANTY; without even the implied warranty of
//MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//GNU Affero General Public License for more details.
//
//You should have received a copy of the GNU Affero General Public License
//along with this program.  If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use thiserror::Error;

/// Neutral element of max-product combination in log10 space
pub const ELEM_ONE: f64 = 0.0;
/// Absorbing element (probability zero) in log10 space
pub const ELEM_ZERO: f64 = f64::NEG_INFINITY;

/// The value assigned to a variable. Negative means unassigned.
pub type Value = i32;
pub const UNASSIGNED: Value = -1;

/// A full or partial assignment, indexed by variable id
pub type Assignment = Vec<Value>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Algorithm {
    /// Depth-first AND/OR branch-and-bound
    Bnb,
    /// Best-first AND/OR search (AO*)
    AoStar,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum HeuristicChoice {
    /// Mini-bucket elimination bound
    MiniBucket,
    /// FGLP reparameterization bound
    Fglp,
    /// Elementwise minimum of the FGLP and mini-bucket bounds
    FglpMbe,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::Bnb => write!(f, "bnb"),
            Algorithm::AoStar => write!(f, "ao-star"),
        }
    }
}

impl std::fmt::Display for HeuristicChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeuristicChoice::MiniBucket => write!(f, "mini-bucket"),
            HeuristicChoice::Fglp => write!(f, "fglp"),
            HeuristicChoice::FglpMbe => write!(f, "fglp-mbe"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProblemClass {
    Markov,
    Bayes,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("domain violation: {0}")]
    DomainViolation(String),
    #[error("induced width {width} exceeds the configured limit {limit}")]
    WidthExceeded { width: usize, limit: usize },
    #[error("resource exceeded: {0}")]
    ResourceExceeded(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The best assignment found by a run of the engine, in original variable
/// space (evidence re-inserted), together with its cost.
#[derive(Debug, Clone)]
pub struct Solution {
    /// log10 of the MPE value. NaN if no complete assignment was found
    cost: f64,
    /// Assignment over the original variables
    assignment: Vec<Value>,
    /// Seconds since the start of the search at which it was found
    time_found: u64,
}

impl Solution {

    pub fn new(cost: f64, assignment: Vec<Value>, time_found: u64) -> Self {
        Self { cost, assignment, time_found }
    }

    pub fn empty() -> Self {
        Self { cost: f64::NAN, assignment: vec![], time_found: 0 }
    }

    /// log10 of the optimum
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// The optimum in probability space
    pub fn probability(&self) -> f64 {
        10f64.powf(self.cost)
    }

    pub fn assignment(&self) -> &[Value] {
        &self.assignment
    }

    pub fn time_found(&self) -> u64 {
        self.time_found
    }

    pub fn is_complete(&self) -> bool {
        !self.cost.is_nan()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_complete() {
            write!(f, "Solution {:.8} (log10 {:.8}) found in {} seconds", self.probability(), self.cost, self.time_found)
        } else {
            write!(f, "No solution found")
        }
    }
}
