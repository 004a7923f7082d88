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

//! Factor graph linear programming: iteratively shifts mass between the
//! factors sharing a variable until their max-marginals agree, producing
//! an upper bound as the product of the factor maxima. The factor sum at
//! every full assignment is invariant under the updates (plus the nullary
//! constant when the shift variant is active).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::common::*;
use crate::core::factor::Factor;

struct Prioritized(f64, usize);

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}

impl Eq for Prioritized {}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

pub struct Fglp {
    factors: Vec<Factor>,
    domains: Vec<usize>,
    /// Positions (into `factors`) of the factors containing each variable
    factors_by_var: Vec<Vec<usize>>,
    /// Variables eligible for updates
    vars: Vec<usize>,
    /// Constant mass collected by conditioning and by the nullary shift
    nullary: f64,
    use_nullary_shift: bool,
}

impl Fglp {

    pub fn new(factors: Vec<Factor>, domains: Vec<usize>, use_nullary_shift: bool) -> Self {
        let mut fglp = Self {
            factors,
            domains,
            factors_by_var: vec![],
            vars: vec![],
            nullary: ELEM_ONE,
            use_nullary_shift,
        };
        fglp.rebuild_index();
        fglp
    }

    fn rebuild_index(&mut self) {
        self.factors_by_var = vec![vec![]; self.domains.len()];
        for (position, factor) in self.factors.iter().enumerate() {
            for v in factor.scope() {
                self.factors_by_var[*v].push(position);
            }
        }
        self.vars = (0..self.domains.len()).filter(|v| !self.factors_by_var[*v].is_empty()).collect();
    }

    /// Instantiates the assigned variables in all factors; factors that
    /// become constant move into the nullary term
    pub fn condition(&mut self, assignment: &FxHashMap<usize, Value>) {
        let mut reduced = vec![];
        for factor in self.factors.iter() {
            let next = if factor.scope().iter().any(|v| assignment.contains_key(v)) {
                factor.substitute(assignment)
            } else {
                factor.clone()
            };
            if next.is_constant() {
                self.nullary += next.table()[0];
            } else {
                reduced.push(next);
            }
        }
        self.factors = reduced;
        self.rebuild_index();
    }

    /// Round-robin passes over the variables. Stops on the iteration
    /// budget, the time budget, or when a full pass moves less than the
    /// tolerance. Returns the number of passes done.
    pub fn run(&mut self, max_iters: usize, max_time: Duration, tolerance: f64) -> usize {
        let start = Instant::now();
        let vars = self.vars.clone();
        for iter in 0..max_iters {
            let mut residual = 0.0f64;
            for v in vars.iter().copied() {
                residual = residual.max(self.update_var(v));
            }
            if residual < tolerance || start.elapsed() > max_time {
                return iter + 1;
            }
        }
        max_iters
    }

    /// Priority-driven schedule: repeatedly updates the variable whose
    /// last observed shift was largest. Counts single-variable updates
    /// rather than passes.
    pub fn run_priority(&mut self, max_updates: usize, max_time: Duration, tolerance: f64) -> usize {
        let start = Instant::now();
        let mut priority = vec![f64::INFINITY; self.domains.len()];
        let mut heap: BinaryHeap<Prioritized> = self.vars.iter().map(|v| Prioritized(f64::INFINITY, *v)).collect();
        let mut updates = 0;
        while updates < max_updates {
            let Prioritized(p, v) = match heap.pop() {
                Some(top) => top,
                None => break,
            };
            if p != priority[v] {
                continue; // stale entry
            }
            if p < tolerance || start.elapsed() > max_time {
                break;
            }
            let change = self.update_var(v);
            priority[v] = 0.0;
            updates += 1;
            for position in self.factors_by_var[v].clone() {
                for u in self.factors[position].scope().to_vec() {
                    if u == v {
                        continue;
                    }
                    if priority[u].is_infinite() || change > priority[u] {
                        priority[u] = change;
                        heap.push(Prioritized(change, u));
                    }
                }
            }
        }
        updates
    }

    /// One reparameterization step on a single variable. Returns the
    /// largest absolute mass movement.
    fn update_var(&mut self, v: usize) -> f64 {
        let positions = self.factors_by_var[v].clone();
        let count = positions.len();
        if count == 0 {
            return 0.0;
        }
        let domain = self.domains[v];
        let marginals: Vec<Vec<f64>> = positions.iter().map(|p| self.factors[*p].max_marginal(v)).collect();
        let mut average = vec![ELEM_ONE; domain];
        for a in 0..domain {
            average[a] = marginals.iter().map(|m| m[a]).sum::<f64>() / count as f64;
        }
        if self.use_nullary_shift {
            let top = average.iter().copied().fold(ELEM_ZERO, f64::max);
            if top != ELEM_ZERO {
                for slot in average.iter_mut() {
                    *slot -= top;
                }
                self.nullary += top * count as f64;
            }
        }
        let mut moved = 0.0f64;
        for (position, marginal) in positions.iter().zip(marginals.iter()) {
            for a in 0..domain {
                let shift = average[a] - marginal[a];
                if shift.is_finite() {
                    moved = moved.max(shift.abs());
                } else if average[a] != marginal[a] {
                    moved = f64::INFINITY;
                }
            }
            let factor = &mut self.factors[*position];
            factor.sub_unary(v, marginal);
            factor.add_unary(v, &average);
        }
        moved
    }

    /// The bound: the nullary constant times the maximum of every factor
    pub fn ub(&self) -> f64 {
        self.nullary + self.factors.iter().map(|f| f.max_value()).sum::<f64>()
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn into_factors(self) -> (Vec<Factor>, f64) {
        (self.factors, self.nullary)
    }

    pub fn nullary(&self) -> f64 {
        self.nullary
    }
}

#[cfg(test)]
mod test_fglp {

    use super::*;

    fn chain_factors() -> Vec<Factor> {
        vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ]
    }

    fn total(factors: &[Factor], assignment: &[Value]) -> f64 {
        factors.iter().map(|f| f.value(assignment)).sum()
    }

    #[test]
    fn updates_preserve_the_factor_sum() {
        let factors = chain_factors();
        let mut fglp = Fglp::new(factors.clone(), vec![2, 2, 2], false);
        fglp.run(10, Duration::from_secs(10), 1e-9);
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    let assignment = vec![i, j, k];
                    let before = total(&factors, &assignment);
                    let after = fglp.nullary() + total(fglp.factors(), &assignment);
                    assert!((before - after).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn nullary_shift_preserves_the_factor_sum() {
        let factors = chain_factors();
        let mut fglp = Fglp::new(factors.clone(), vec![2, 2, 2], true);
        fglp.run(10, Duration::from_secs(10), 1e-9);
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    let assignment = vec![i, j, k];
                    let before = total(&factors, &assignment);
                    let after = fglp.nullary() + total(fglp.factors(), &assignment);
                    assert!((before - after).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn bound_is_admissible_and_tightens() {
        let optimum = 0.72f64.log10();
        let mut fglp = Fglp::new(chain_factors(), vec![2, 2, 2], false);
        let initial = fglp.ub();
        fglp.run(50, Duration::from_secs(10), 1e-9);
        let tightened = fglp.ub();
        assert!(initial >= optimum - 1e-9);
        assert!(tightened >= optimum - 1e-9);
        assert!(tightened <= initial + 1e-9);
    }

    #[test]
    fn priority_schedule_matches_the_invariant() {
        let factors = chain_factors();
        let mut fglp = Fglp::new(factors.clone(), vec![2, 2, 2], true);
        fglp.run_priority(100, Duration::from_secs(10), 1e-9);
        assert!(fglp.ub() >= 0.72f64.log10() - 1e-9);
        let assignment = vec![0, 1, 1];
        let before = total(&factors, &assignment);
        let after = fglp.nullary() + total(fglp.factors(), &assignment);
        assert!((before - after).abs() < 1e-9);
    }

    #[test]
    fn conditioning_collects_constants() {
        let mut fglp = Fglp::new(chain_factors(), vec![2, 2, 2], false);
        let mut assignment = FxHashMap::default();
        assignment.insert(0usize, 0 as Value);
        assignment.insert(1usize, 1 as Value);
        fglp.condition(&assignment);
        // the pairwise factor on (0, 1) became the constant 0.8
        assert_eq!(fglp.factors().len(), 1);
        assert!((fglp.nullary() - 0.8f64.log10()).abs() < 1e-9);
    }
}
