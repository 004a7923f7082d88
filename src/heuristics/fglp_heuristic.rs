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

//! Search heuristics driven by FGLP. The root reparameterization fixes
//! the factor set the bounds are measured over; at search nodes the
//! subproblem factors are conditioned on the current assignment and, with
//! a per-node budget, re-tightened by a few more FGLP iterations.

use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::common::*;
use crate::core::factor::Factor;
use crate::core::problem::Problem;
use crate::heuristics::fglp::Fglp;
use crate::heuristics::mini_bucket::MiniBucketHeuristic;
use crate::heuristics::{default_label_all, Heuristic};
use crate::pseudo_tree::PseudoTree;

/// Iteration/time/tolerance budgets for the FGLP runs at the root and at
/// every search node
#[derive(Debug, Clone, Copy)]
pub struct FglpBudget {
    pub root_iters: usize,
    pub root_time: f64,
    pub root_tolerance: f64,
    pub node_iters: usize,
    pub node_time: f64,
    pub node_tolerance: f64,
}

impl Default for FglpBudget {
    fn default() -> Self {
        Self {
            root_iters: 100,
            root_time: 5.0,
            root_tolerance: 1e-7,
            node_iters: 0,
            node_time: 0.1,
            node_tolerance: 1e-7,
        }
    }
}

pub struct FglpHeuristic {
    budget: FglpBudget,
    use_priority: bool,
    use_nullary_shift: bool,
    /// When set, labels and bounds are both taken from the reparameterized
    /// factor set; otherwise FGLP only supplies the root bound and the
    /// original tables drive the search
    use_shifted_labels: bool,
    /// The factor set bounds and (shifted) labels are computed from
    factors: Vec<Factor>,
    /// Constant mass displaced by the root reparameterization; folded into
    /// the dummy root label in shifted mode
    nullary: f64,
    /// Pseudo-tree node each factor is placed at
    placed_at: Vec<usize>,
    /// Per variable, the factors placed at its strict descendants
    sub_functions: Vec<Vec<usize>>,
    /// Per variable, the factors placed at the variable itself
    assigned_at: Vec<Vec<usize>>,
    global_ub: f64,
}

impl FglpHeuristic {

    pub fn new(budget: FglpBudget, use_priority: bool, use_nullary_shift: bool, use_shifted_labels: bool) -> Self {
        Self {
            budget,
            use_priority,
            use_nullary_shift,
            use_shifted_labels,
            factors: vec![],
            nullary: ELEM_ONE,
            placed_at: vec![],
            sub_functions: vec![],
            assigned_at: vec![],
            global_ub: ELEM_ZERO,
        }
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn uses_shifted_labels(&self) -> bool {
        self.use_shifted_labels
    }

    fn index_functions(&mut self, pt: &PseudoTree) {
        let n = pt.number_nodes();
        self.placed_at = self.factors.iter().map(|f| {
            match f.scope().iter().min_by_key(|v| pt.elim_position(**v)) {
                Some(v) => *v,
                None => pt.root(),
            }
        }).collect();
        self.sub_functions = vec![vec![]; n];
        self.assigned_at = vec![vec![]; n];
        for (position, at) in self.placed_at.iter().copied().enumerate() {
            self.assigned_at[at].push(position);
            let mut walk = pt.node(at).parent();
            while let Some(p) = walk {
                self.sub_functions[p].push(position);
                walk = pt.node(p).parent();
            }
        }
    }
}

impl Heuristic for FglpHeuristic {

    fn build(&mut self, problem: &Problem, pt: &PseudoTree) -> Result<f64, Error> {
        let mut root = Fglp::new(problem.factors().to_vec(), problem.domains().to_vec(), self.use_nullary_shift);
        let time = Duration::from_secs_f64(self.budget.root_time);
        if self.use_priority {
            root.run_priority(self.budget.root_iters * problem.number_variables().max(1), time, self.budget.root_tolerance);
        } else {
            root.run(self.budget.root_iters, time, self.budget.root_tolerance);
        }
        self.global_ub = root.ub();
        if self.use_shifted_labels {
            let (factors, nullary) = root.into_factors();
            self.factors = factors;
            self.nullary = nullary;
        } else {
            self.factors = problem.factors().to_vec();
            self.nullary = ELEM_ONE;
        }
        self.index_functions(pt);
        Ok(self.global_ub)
    }

    fn global_upper_bound(&self) -> f64 {
        self.global_ub
    }

    fn heur_all(&mut self, problem: &Problem, _pt: &PseudoTree, var: usize, assignment: &[Value], out: &mut [f64]) {
        let positions = &self.sub_functions[var];
        if self.budget.node_iters == 0 {
            // static bound: conditioned maxima of the subproblem factors
            let mut local = assignment.to_vec();
            for (a, slot) in out.iter_mut().enumerate() {
                local[var] = a as Value;
                *slot = positions.iter().map(|p| self.factors[*p].conditioned_max(&local)).sum();
            }
            return;
        }
        // conditioned FGLP: re-tighten the subproblem for every value
        let mut conditioning: FxHashMap<usize, Value> = FxHashMap::default();
        for (v, val) in assignment.iter().enumerate() {
            if *val != UNASSIGNED && v != var {
                conditioning.insert(v, *val);
            }
        }
        let time = Duration::from_secs_f64(self.budget.node_time);
        for (a, slot) in out.iter_mut().enumerate() {
            let subproblem: Vec<Factor> = positions.iter().map(|p| self.factors[*p].clone()).collect();
            let mut fglp = Fglp::new(subproblem, problem.domains().to_vec(), self.use_nullary_shift);
            conditioning.insert(var, a as Value);
            fglp.condition(&conditioning);
            if self.use_priority {
                fglp.run_priority(self.budget.node_iters, time, self.budget.node_tolerance);
            } else {
                fglp.run(self.budget.node_iters, time, self.budget.node_tolerance);
            }
            *slot = fglp.ub();
        }
        conditioning.remove(&var);
    }

    fn label_all(&mut self, problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value], out: &mut [f64]) {
        if !self.use_shifted_labels {
            default_label_all(problem, pt, var, assignment, out);
            return;
        }
        for slot in out.iter_mut() {
            *slot = ELEM_ONE;
        }
        let domain = problem.domain_size(var);
        let mut buffer = vec![ELEM_ONE; domain];
        for position in self.assigned_at[var].iter() {
            let factor = &self.factors[*position];
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
        if var == pt.root() {
            for slot in out.iter_mut() {
                *slot += self.nullary;
            }
        }
    }
}

/// Hybrid bound: the elementwise minimum of the FGLP bound and a
/// mini-bucket bound built over the same factor set
pub struct FglpMbeHeuristic {
    fglp: FglpHeuristic,
    mbe: MiniBucketHeuristic,
    global_ub: f64,
}

impl FglpMbeHeuristic {

    pub fn new(budget: FglpBudget, i_bound: usize, moment_matching: bool,
               use_priority: bool, use_nullary_shift: bool, use_shifted_labels: bool) -> Self {
        Self {
            fglp: FglpHeuristic::new(budget, use_priority, use_nullary_shift, use_shifted_labels),
            mbe: MiniBucketHeuristic::new(i_bound, moment_matching),
            global_ub: ELEM_ZERO,
        }
    }
}

impl Heuristic for FglpMbeHeuristic {

    fn build(&mut self, problem: &Problem, pt: &PseudoTree) -> Result<f64, Error> {
        let fglp_bound = self.fglp.build(problem, pt)?;
        if self.fglp.uses_shifted_labels() {
            let base = self.fglp.factors().to_vec();
            self.mbe = std::mem::replace(&mut self.mbe, MiniBucketHeuristic::new(1, false)).with_base(base);
        }
        let mbe_bound = self.mbe.build(problem, pt)?;
        self.global_ub = fglp_bound.min(mbe_bound);
        Ok(self.global_ub)
    }

    fn size_limit(&mut self, problem: &Problem, pt: &PseudoTree, memory: u64) -> usize {
        self.mbe.size_limit(problem, pt, memory)
    }

    fn global_upper_bound(&self) -> f64 {
        self.global_ub
    }

    fn heur_all(&mut self, problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value], out: &mut [f64]) {
        self.fglp.heur_all(problem, pt, var, assignment, out);
        let mut other = vec![ELEM_ONE; out.len()];
        self.mbe.heur_all(problem, pt, var, assignment, &mut other);
        for (slot, v) in out.iter_mut().zip(other.iter()) {
            if *v < *slot {
                *slot = *v;
            }
        }
    }

    fn label_all(&mut self, problem: &Problem, pt: &PseudoTree, var: usize, assignment: &[Value], out: &mut [f64]) {
        self.fglp.label_all(problem, pt, var, assignment, out);
    }
}

#[cfg(test)]
mod test_fglp_heuristic {

    use super::*;
    use crate::core::graph::Graph;
    use crate::order::find_ordering;
    use crate::preprocess::Preprocessor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chain_setup() -> (Problem, PseudoTree) {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ];
        let mut problem = Problem::new(ProblemClass::Markov, vec![2, 2, 2], factors);
        Preprocessor::new(&mut problem).preprocess(&FxHashMap::default(), false, 0.0).unwrap();
        let graph = Graph::from_factors(problem.number_variables() - 1, problem.factors());
        let mut rng = StdRng::seed_from_u64(29);
        let order = find_ordering(&graph, usize::MAX, 0, &mut rng).unwrap();
        let mut pt = PseudoTree::build(&graph, &order, None, false);
        pt.assign_functions(problem.factors());
        (problem, pt)
    }

    #[test]
    fn root_bound_is_admissible() {
        let (problem, pt) = chain_setup();
        let mut heuristic = FglpHeuristic::new(FglpBudget::default(), false, false, false);
        let bound = heuristic.build(&problem, &pt).unwrap();
        assert!(bound >= 0.72f64.log10() - 1e-9);
    }

    #[test]
    fn shifted_labels_keep_path_costs_exact() {
        let (problem, pt) = chain_setup();
        let mut budget = FglpBudget::default();
        budget.root_iters = 20;
        let mut heuristic = FglpHeuristic::new(budget, false, true, true);
        heuristic.build(&problem, &pt).unwrap();
        // summing the labels along any full assignment must reproduce the
        // original cost
        let mut best: f64 = ELEM_ZERO;
        for i in 0..2 as Value {
            for j in 0..2 as Value {
                for k in 0..2 as Value {
                    let mut assignment = vec![i, j, k, 0];
                    assignment[3] = 0;
                    let mut cost = ELEM_ONE;
                    for var in 0..problem.number_variables() {
                        let mut label = vec![ELEM_ONE; problem.domain_size(var)];
                        heuristic.label_all(&problem, &pt, var, &assignment, &mut label);
                        cost += label[assignment[var] as usize];
                    }
                    best = best.max(cost);
                }
            }
        }
        assert!((best - 0.72f64.log10()).abs() < 1e-9);
    }

    #[test]
    fn hybrid_is_at_most_each_bound() {
        let (problem, pt) = chain_setup();
        let mut fglp = FglpHeuristic::new(FglpBudget::default(), false, false, false);
        let fglp_bound = fglp.build(&problem, &pt).unwrap();
        let mut mbe = MiniBucketHeuristic::new(2, false);
        let mbe_bound = mbe.build(&problem, &pt).unwrap();
        let mut hybrid = FglpMbeHeuristic::new(FglpBudget::default(), 2, false, false, false, false);
        let bound = hybrid.build(&problem, &pt).unwrap();
        assert!(bound <= fglp_bound + 1e-9);
        assert!(bound <= mbe_bound + 1e-9);
        assert!(bound >= 0.72f64.log10() - 1e-9);
    }
}
