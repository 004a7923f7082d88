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

//! Holds a problem instance: variable domains, the factor set, and the
//! bookkeeping needed to map a solution of the reduced problem back to
//! the original variables after preprocessing.

use rustc_hash::FxHashMap;

use crate::common::*;
use crate::core::factor::Factor;

#[derive(Debug)]
pub struct Problem {
    /// Problem class from the input header; both are solved as max-product
    class: ProblemClass,
    /// Number of variables in the reduced problem (including the dummy
    /// once it has been added)
    n: usize,
    /// Number of variables before evidence removal
    n_org: usize,
    /// Domain sizes of the reduced variables
    domains: Vec<usize>,
    /// The factor set; replaced atomically by the preprocessor
    factors: Vec<Factor>,
    /// Value forced on each original variable, if it was removed
    eliminated: Vec<Option<Value>>,
    /// Translation of variable ids after evidence removal
    old_to_new: FxHashMap<usize, usize>,
    /// Product of the factors that became constant during preprocessing
    global_constant: f64,
    /// True once the dummy variable has been appended
    has_dummy: bool,
}

impl Problem {

    pub fn new(class: ProblemClass, domains: Vec<usize>, factors: Vec<Factor>) -> Self {
        let n = domains.len();
        let old_to_new = (0..n).map(|i| (i, i)).collect();
        Self {
            class,
            n,
            n_org: n,
            domains,
            factors,
            eliminated: vec![None; n],
            old_to_new,
            global_constant: ELEM_ONE,
            has_dummy: false,
        }
    }

    pub fn class(&self) -> ProblemClass {
        self.class
    }

    /// Number of variables of the reduced problem
    pub fn number_variables(&self) -> usize {
        self.n
    }

    /// Number of variables of the original problem
    pub fn number_variables_original(&self) -> usize {
        self.n_org
    }

    pub fn domain_size(&self, variable: usize) -> usize {
        self.domains[variable]
    }

    pub fn domains(&self) -> &[usize] {
        &self.domains
    }

    pub fn max_domain_size(&self) -> usize {
        self.domains.iter().copied().max().unwrap_or(1)
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn factors_mut(&mut self) -> &mut [Factor] {
        &mut self.factors
    }

    /// Replaces the current factor set with an equivalent one
    pub fn replace_factors(&mut self, factors: Vec<Factor>) {
        self.factors = factors;
    }

    pub fn global_constant(&self) -> f64 {
        self.global_constant
    }

    pub fn add_to_global_constant(&mut self, value: f64) {
        self.global_constant += value;
    }

    pub fn has_dummy(&self) -> bool {
        self.has_dummy
    }

    /// The id of the dummy variable (the last one)
    pub fn dummy_variable(&self) -> usize {
        debug_assert!(self.has_dummy);
        self.n - 1
    }

    /// Returns true iff the original variable was removed as evidence or
    /// because of a unary domain
    pub fn is_eliminated(&self, original: usize) -> bool {
        self.eliminated[original].is_some()
    }

    /// Records the removal of an original variable with its forced value
    pub fn set_eliminated(&mut self, original: usize, value: Value) {
        self.eliminated[original] = Some(value);
    }

    /// Installs the dense re-indexing of the surviving variables along
    /// with their new domain sizes
    pub fn set_reduction(&mut self, old_to_new: FxHashMap<usize, usize>, domains: Vec<usize>) {
        self.n = domains.len();
        self.domains = domains;
        self.old_to_new = old_to_new;
    }

    pub fn old_to_new(&self) -> &FxHashMap<usize, usize> {
        &self.old_to_new
    }

    /// Appends the dummy variable (unit domain) used to root the pseudo
    /// tree, carrying the global constant as its only factor
    pub fn add_dummy(&mut self) {
        debug_assert!(!self.has_dummy);
        self.domains.push(1);
        self.n += 1;
        self.has_dummy = true;
        for (position, factor) in self.factors.iter_mut().enumerate() {
            factor.set_id(position);
        }
        let id = self.factors.len();
        self.factors.push(Factor::constant(id, self.global_constant));
    }

    /// Maps a solution of the reduced problem back to the original
    /// variable order, re-inserting evidence and unary-domain values.
    /// Variables without a determined value default to 0.
    pub fn assignment_for_output(&self, assignment: &[Value]) -> Vec<Value> {
        let mut out = vec![0 as Value; self.n_org];
        for (i, slot) in out.iter_mut().enumerate() {
            if let Some(value) = self.eliminated[i] {
                *slot = value;
            } else if let Some(new) = self.old_to_new.get(&i) {
                if *new < assignment.len() && assignment[*new] != UNASSIGNED {
                    *slot = assignment[*new];
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod test_problem {

    use super::*;

    #[test]
    fn dummy_is_last_variable_with_unit_domain() {
        let factors = vec![Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.1, 0.9, 0.4, 0.2])];
        let mut problem = Problem::new(ProblemClass::Markov, vec![2, 2], factors);
        problem.add_dummy();
        assert_eq!(problem.number_variables(), 3);
        assert_eq!(problem.dummy_variable(), 2);
        assert_eq!(problem.domain_size(2), 1);
        assert!(problem.factors().last().unwrap().is_constant());
    }

    #[test]
    fn output_assignment_reinserts_evidence() {
        let factors = vec![Factor::from_probabilities(0, vec![0], vec![2], vec![0.3, 0.7])];
        let mut problem = Problem::new(ProblemClass::Markov, vec![2, 2], factors);
        problem.set_eliminated(1, 1);
        let mut old_to_new = FxHashMap::default();
        old_to_new.insert(0usize, 0usize);
        problem.set_reduction(old_to_new, vec![2]);
        let out = problem.assignment_for_output(&[1]);
        assert_eq!(out, vec![1, 1]);
    }
}
