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

pub mod fglp;
pub mod fglp_heuristic;
pub mod mini_bucket;

use crate::common::*;
use crate::core::problem::Problem;
use crate::pseudo_tree::PseudoTree;

pub use fglp_heuristic::{FglpHeuristic, FglpMbeHeuristic};
pub use mini_bucket::MiniBucketHeuristic;

/// An admissible upper bound provider for the search. For every variable
/// and context assignment it bounds the optimum of the subproblem below
/// that variable, one value per candidate assignment, and supplies the
/// AND node labels the bounds are measured against.
pub trait Heuristic {

    /// Precomputes the bound structures. Returns an upper bound on the
    /// optimum of the whole problem.
    fn build(&mut self, problem: &Problem, pt: &PseudoTree) -> Result<f64, Error>;

    /// Shrinks the heuristic until its memory estimate fits the given
    /// budget (in megabytes). Returns the i-bound actually in use, or 0
    /// when not applicable.
    fn size_limit(&mut self, _problem: &Problem, _pt: &PseudoTree, _memory: u64) -> usize {
        0
    }

    fn global_upper_bound(&self) -> f64;

    /// One upper bound per value of the variable, under the current
    /// partial assignment of its context
    fn heur_all(&mut self, problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value], out: &mut [f64]);

    /// Upper bound for the value currently assigned to the variable
    fn heur(&mut self, problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value]) -> f64 {
        let mut out = vec![ELEM_ONE; problem.domain_size(var)];
        self.heur_all(problem, pt, var, assignment, &mut out);
        out[assignment[var] as usize]
    }

    /// One label per value of the variable: the product of the factors
    /// that become fully assigned at that AND position
    fn label_all(&mut self, problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value], out: &mut [f64]) {
        default_label_all(problem, pt, var, assignment, out);
    }

    fn label(&mut self, problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value]) -> f64 {
        let mut out = vec![ELEM_ONE; problem.domain_size(var)];
        self.label_all(problem, pt, var, assignment, &mut out);
        out[assignment[var] as usize]
    }
}

/// Labels from the original problem factors placed at the variable's
/// pseudo-tree node
pub fn default_label_all(problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value], out: &mut [f64]) {
    for slot in out.iter_mut() {
        *slot = ELEM_ONE;
    }
    let domain = problem.domain_size(var);
    let mut buffer = vec![ELEM_ONE; domain];
    for id in pt.node(var).functions() {
        let factor = &problem.factors()[*id];
        if factor.is_constant() {
            for slot in out.iter_mut() {
                *slot += factor.table()[0];
            }
        } else {
            factor.values_for(var, assignment, &mut buffer);
            for (slot, v) in out.iter_mut().zip(buffer.iter()) {
                *slot += v;
            }
        }
    }
}
