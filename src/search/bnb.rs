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

//! Depth-first AND/OR branch-and-bound. One LIFO stack of search nodes;
//! with rotation enabled, one stack per top-level subproblem and a
//! round-robin switch every `rotate_limit` expansions, which gives a
//! breadth-like anytime profile at DFS memory cost.

use std::time::Instant;

use crate::propagator::BoundPropagator;
use crate::search::node::{NodeFlag, NodeIndex};
use crate::search::Search;
use crate::PEAK_ALLOC;

pub struct BranchAndBound<'a, const S: bool> {
    pub search: Search<'a, S>,
    pub propagator: BoundPropagator,
    stacks: Vec<Vec<NodeIndex>>,
    current: usize,
    rotate: bool,
    rotate_limit: usize,
    expansions_on_stack: usize,
}

impl<'a, const S: bool> BranchAndBound<'a, S> {

    pub fn new(search: Search<'a, S>, rotate: bool, rotate_limit: usize) -> Self {
        Self {
            search,
            propagator: BoundPropagator::new(),
            stacks: vec![vec![]],
            current: 0,
            rotate,
            rotate_limit: rotate_limit.max(1),
            expansions_on_stack: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.stacks.iter().all(|s| s.is_empty())
    }

    /// Empties the frontier and seeds it with the given node (the root
    /// by default)
    pub fn reset(&mut self, node: Option<NodeIndex>) {
        let start = match node {
            Some(n) => n,
            None => self.search.init(),
        };
        self.stacks = vec![vec![start]];
        self.current = 0;
        self.expansions_on_stack = 0;
    }

    fn rotate_stacks(&mut self) {
        let total = self.stacks.len();
        for offset in 1..=total {
            let candidate = (self.current + offset) % total;
            if !self.stacks[candidate].is_empty() {
                self.current = candidate;
                let top = *self.stacks[candidate].last().unwrap();
                self.search.sync_assignment(top);
                break;
            }
        }
        self.expansions_on_stack = 0;
    }

    fn next_node(&mut self) -> Option<NodeIndex> {
        if self.rotate && self.expansions_on_stack >= self.rotate_limit {
            self.rotate_stacks();
        }
        if self.stacks[self.current].is_empty() {
            self.rotate_stacks();
        }
        self.stacks[self.current].pop()
    }

    fn do_expand(&mut self, n: NodeIndex) -> bool {
        let is_and = self.search.space.nodes[n].is_and();
        let (children, leaf) = if is_and {
            self.search.generate_children_and(n)
        } else {
            self.search.generate_children_or(n)
        };
        if leaf {
            return true;
        }
        self.expansions_on_stack += 1;
        // top-level subproblems each get their own stack when rotating
        if self.rotate && is_and && self.search.space.nodes[n].var() == self.search.pt().root() && children.len() > 1 {
            for child in children {
                self.stacks.push(vec![child]);
            }
        } else {
            self.stacks[self.current].extend(children);
        }
        false
    }

    /// Runs the node pipeline until a leaf surfaces; None when the
    /// frontier is exhausted
    pub fn next_leaf(&mut self) -> Option<NodeIndex> {
        while let Some(n) = self.next_node() {
            if self.search.do_process(n) {
                return Some(n);
            }
            if self.search.do_caching(n) {
                return Some(n);
            }
            if self.search.do_pruning(n) {
                return Some(n);
            }
            if self.do_expand(n) {
                return Some(n);
            }
        }
        None
    }

    /// Searches until the space is exhausted or the deadline passes.
    /// Returns true iff the search completed (the incumbent is optimal).
    pub fn solve(&mut self, deadline: Option<Instant>, memory_limit: u64) -> bool {
        if self.is_done() && self.space_untouched() {
            self.reset(None);
        }
        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    println!("Timed out.");
                    println!("Stats at timeout:");
                    println!("{}", self.search.stats);
                    return false;
                }
            }
            if PEAK_ALLOC.current_usage_as_mb() as u64 >= memory_limit {
                self.search.space.cache.clear_all();
            }
            match self.next_leaf() {
                Some(leaf) => {
                    self.propagator.propagate(&mut self.search, leaf);
                },
                None => return true,
            }
        }
    }

    fn space_untouched(&self) -> bool {
        match self.search.space.true_root() {
            Some(root) => !self.search.space.nodes[root].flags().is_set(NodeFlag::Solved)
                && self.search.space.nodes[root].children().is_empty(),
            None => true,
        }
    }
}

#[cfg(test)]
mod test_bnb {

    use super::*;
    use crate::common::*;
    use crate::core::factor::Factor;
    use crate::core::graph::Graph;
    use crate::core::problem::Problem;
    use crate::heuristics::{Heuristic, MiniBucketHeuristic};
    use crate::order::find_ordering;
    use crate::preprocess::Preprocessor;
    use crate::pseudo_tree::PseudoTree;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rustc_hash::FxHashMap;

    fn chain_setup() -> (Problem, PseudoTree) {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ];
        let mut problem = Problem::new(ProblemClass::Markov, vec![2, 2, 2], factors);
        Preprocessor::new(&mut problem).preprocess(&FxHashMap::default(), false, 0.0).unwrap();
        let graph = Graph::from_factors(problem.number_variables() - 1, problem.factors());
        let mut rng = StdRng::seed_from_u64(31);
        let order = find_ordering(&graph, usize::MAX, 0, &mut rng).unwrap();
        let mut pt = PseudoTree::build(&graph, &order, None, false);
        pt.assign_functions(problem.factors());
        (problem, pt)
    }

    #[test]
    fn resolving_after_completion_changes_nothing() {
        let (problem, pt) = chain_setup();
        let mut heuristic = MiniBucketHeuristic::new(10, false);
        heuristic.build(&problem, &pt).unwrap();
        let mut search = Search::<true>::new(&problem, &pt, true, Box::new(heuristic));
        search.init();
        search.finalize_heuristic();
        let mut bnb = BranchAndBound::new(search, false, 1000);
        bnb.reset(None);

        assert!(bnb.solve(None, u64::MAX));
        let value = bnb.search.space.incumbent.value;
        let assignment = bnb.search.space.incumbent.assignment.clone();
        let expanded = bnb.search.stats.number_expanded();
        let entries = bnb.search.space.cache.number_entries();
        assert!((value - 0.72f64.log10()).abs() < 1e-9);

        assert!(bnb.solve(None, u64::MAX));
        assert_eq!(bnb.search.space.incumbent.value, value);
        assert_eq!(bnb.search.space.incumbent.assignment, assignment);
        assert_eq!(bnb.search.stats.number_expanded(), expanded);
        assert_eq!(bnb.search.space.cache.number_entries(), entries);
    }
}
