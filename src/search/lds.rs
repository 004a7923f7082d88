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

//! Limited discrepancy search: a depth-first pass that may deviate from
//! the heuristically best child at most `max_discrepancy` times along
//! any path. The resulting root value is a lower bound used to seed the
//! main search. OR nodes whose children were truncated are marked not
//! optimally solved, so nothing bounded leaks into the cache.

use std::time::Instant;

use crate::common::*;
use crate::propagator::BoundPropagator;
use crate::search::node::{NodeFlag, NodeIndex, SearchNode};
use crate::search::Search;

pub struct LimitedDiscrepancy<'a, const S: bool> {
    pub search: Search<'a, S>,
    propagator: BoundPropagator,
    stack: Vec<(NodeIndex, usize)>,
}

impl<'a, const S: bool> LimitedDiscrepancy<'a, S> {

    pub fn new(search: Search<'a, S>) -> Self {
        Self {
            search,
            propagator: BoundPropagator::new(),
            stack: vec![],
        }
    }

    /// OR expansion bounded by the remaining discrepancy: the best child
    /// is free, the k-th deviation costs k. Skipped values taint the node.
    fn expand_or(&mut self, n: NodeIndex, discrepancy: usize) -> bool {
        let (var, depth, heur_cache) = {
            let or = self.search.space.nodes[n].as_or();
            (or.var, or.depth, or.heur_cache.clone())
        };
        let sub_vars = self.search.pt().node(var).sub_vars().len();
        let own_position = self.search.pt().node(var).sub_var_position(var).unwrap();

        // candidate values by descending bound
        let mut ranked: Vec<usize> = (0..heur_cache.len()).filter(|i| heur_cache[*i].1 != ELEM_ZERO).collect();
        ranked.sort_by(|a, b| heur_cache[*b].0.total_cmp(&heur_cache[*a].0));

        if ranked.is_empty() {
            let or = self.search.space.nodes[n].as_or_mut();
            or.flags.set(NodeFlag::Leaf);
            or.value = ELEM_ZERO;
            return true;
        }
        if ranked.len() > discrepancy + 1 {
            self.search.space.nodes[n].flags_mut().set(NodeFlag::NotOpt);
            ranked.truncate(discrepancy + 1);
        }

        let mut slots = vec![];
        // push worst-ranked first so the best is popped first
        for (rank, value) in ranked.iter().copied().enumerate().rev() {
            let (h, label) = heur_cache[value];
            let mut child = SearchNode::new_and(n, var, value as Value, depth, label, sub_vars);
            {
                let and = child.as_and_mut();
                and.heur = h;
                and.opt_assignment[own_position] = value as Value;
            }
            let index = self.search.space.nodes.alloc(child);
            slots.push(Some(index));
            self.stack.push((index, discrepancy - rank));
        }
        *self.search.space.nodes[n].children_mut() = slots;
        false
    }

    /// Runs the pass and returns the lower bound with its assignment, if
    /// a complete one was found
    pub fn solve(&mut self, max_discrepancy: usize, deadline: Option<Instant>) -> Option<(f64, Vec<Value>)> {
        let root = self.search.init();
        self.search.finalize_heuristic();
        self.stack.push((root, max_discrepancy));

        while let Some((n, discrepancy)) = self.stack.pop() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
            if self.search.do_process(n) || self.search.do_caching(n) || self.search.do_pruning(n) {
                self.propagator.propagate(&mut self.search, n);
                continue;
            }
            let leaf = if self.search.space.nodes[n].is_and() {
                let (children, leaf) = self.search.generate_children_and(n);
                for child in children.into_iter().rev() {
                    self.stack.push((child, discrepancy));
                }
                leaf
            } else {
                self.expand_or(n, discrepancy)
            };
            if leaf {
                self.propagator.propagate(&mut self.search, n);
            }
        }

        let incumbent = &self.search.space.incumbent;
        if incumbent.value.is_nan() {
            None
        } else {
            Some((incumbent.value, incumbent.assignment.clone()))
        }
    }
}
