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

use rustc_hash::FxHashMap;

use crate::common::*;
use crate::core::factor::Factor;
use crate::core::problem::Problem;

/// Reduces the parsed problem before the search structures are built:
/// evidence and unary-domain variables are substituted into the factors,
/// same-scope factors are optionally collapsed, determinism optionally
/// perturbed, the surviving variables re-indexed densely, and the dummy
/// variable appended.
pub struct Preprocessor<'p> {
    problem: &'p mut Problem,
}

impl<'p> Preprocessor<'p> {

    pub fn new(problem: &'p mut Problem) -> Self {
        Self { problem }
    }

    pub fn preprocess(&mut self, evidence: &FxHashMap<usize, Value>, collapse: bool, perturb: f64) -> Result<(), Error> {
        let n = self.problem.number_variables();

        for (var, value) in evidence.iter() {
            if *var >= n {
                return Err(Error::DomainViolation(format!("evidence variable {} out of range", var)));
            }
            if *value < 0 || *value as usize >= self.problem.domain_size(*var) {
                return Err(Error::DomainViolation(format!("evidence value {} out of the domain of variable {}", value, var)));
            }
        }

        // evidence plus unary-domain variables, removed the same way
        let mut assigned: FxHashMap<usize, Value> = evidence.clone();
        for var in 0..n {
            if self.problem.domain_size(var) == 1 {
                assigned.entry(var).or_insert(0);
            }
        }

        let mut factors: Vec<Factor> = vec![];
        for factor in self.problem.factors().to_vec() {
            let reduced = if factor.scope().iter().any(|v| assigned.contains_key(v)) {
                factor.substitute(&assigned)
            } else {
                factor.clone()
            };
            if reduced.is_constant() {
                self.problem.add_to_global_constant(reduced.table()[0]);
            } else {
                factors.push(reduced);
            }
        }

        if collapse {
            let mut by_scope: FxHashMap<Vec<usize>, Factor> = FxHashMap::default();
            let mut order: Vec<Vec<usize>> = vec![];
            for factor in factors.drain(..) {
                let key = factor.scope().to_vec();
                match by_scope.get_mut(&key) {
                    Some(merged) => merged.combine(&factor),
                    None => {
                        order.push(key.clone());
                        by_scope.insert(key, factor);
                    },
                };
            }
            factors = order.into_iter().map(|key| by_scope.remove(&key).unwrap()).collect();
        }

        if perturb > 0.0 {
            let value = perturb.log10();
            for factor in factors.iter_mut() {
                factor.perturb_zeros(value);
            }
        }

        // dense re-indexing of the surviving variables
        let mut old_to_new: FxHashMap<usize, usize> = FxHashMap::default();
        let mut domains = vec![];
        for var in 0..n {
            if assigned.contains_key(&var) {
                continue;
            }
            old_to_new.insert(var, domains.len());
            domains.push(self.problem.domain_size(var));
        }
        for factor in factors.iter_mut() {
            factor.translate_scope(&old_to_new);
        }
        for (var, value) in assigned.iter() {
            self.problem.set_eliminated(*var, *value);
        }
        self.problem.set_reduction(old_to_new, domains);
        self.problem.replace_factors(factors);
        self.problem.add_dummy();

        Ok(())
    }
}

#[cfg(test)]
mod test_preprocess {

    use super::*;
    use crate::core::problem::Problem;

    fn chain_problem() -> Problem {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ];
        Problem::new(ProblemClass::Markov, vec![2, 2, 2], factors)
    }

    #[test]
    fn evidence_shrinks_scopes_and_reindexes() {
        let mut problem = chain_problem();
        let mut evidence = FxHashMap::default();
        evidence.insert(2usize, 0 as Value);
        Preprocessor::new(&mut problem).preprocess(&evidence, false, 0.0).unwrap();
        // two surviving variables plus the dummy
        assert_eq!(problem.number_variables(), 3);
        assert!(problem.is_eliminated(2));
        // the pairwise factor on (x1, x2) became unary on the new x1
        let unary = problem.factors().iter().find(|f| f.arity() == 1).unwrap();
        assert_eq!(unary.scope(), &[1]);
        assert_eq!(unary.value(&vec![0, 1, 0]), 0.1f64.log10());
    }

    #[test]
    fn out_of_domain_evidence_is_rejected() {
        let mut problem = chain_problem();
        let mut evidence = FxHashMap::default();
        evidence.insert(2usize, 5 as Value);
        let result = Preprocessor::new(&mut problem).preprocess(&evidence, false, 0.0);
        assert!(matches!(result, Err(Error::DomainViolation(_))));
    }

    #[test]
    fn collapse_merges_same_scope_factors() {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![0, 1], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ];
        let mut problem = Problem::new(ProblemClass::Markov, vec![2, 2], factors);
        Preprocessor::new(&mut problem).preprocess(&FxHashMap::default(), true, 0.0).unwrap();
        // one merged factor plus the dummy constant
        assert_eq!(problem.factors().len(), 2);
        let merged = &problem.factors()[0];
        assert_eq!(merged.value(&vec![0, 1, 0]), 0.8f64.log10() + 0.5f64.log10());
    }

    #[test]
    fn perturbation_removes_zeros() {
        let factors = vec![Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![1.0, 0.0, 0.0, 1.0])];
        let mut problem = Problem::new(ProblemClass::Markov, vec![2, 2], factors);
        Preprocessor::new(&mut problem).preprocess(&FxHashMap::default(), false, 1e-6).unwrap();
        assert_eq!(problem.factors()[0].tightness(), 4);
    }
}
