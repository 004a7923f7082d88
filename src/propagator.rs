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

//! Propagates finished leaves towards the root: solved child OR values
//! multiply into their AND parent, solved AND values maximize into their
//! OR parent, finished subtrees are deleted, solved OR values are
//! committed to the cache, and root improvements become new incumbents.

use std::time::Instant;

use log::info;

use crate::common::*;
use crate::search::node::{NodeFlag, NodeIndex};
use crate::search::space::{CacheEntry, Incumbent};
use crate::search::Search;

type SolutionCallback = Box<dyn FnMut(f64, &[Value])>;

pub struct BoundPropagator {
    start: Instant,
    /// Invoked on every root improvement, for anytime consumers
    on_solution: Option<SolutionCallback>,
}

impl BoundPropagator {

    pub fn new() -> Self {
        Self { start: Instant::now(), on_solution: None }
    }

    pub fn set_solution_callback(&mut self, callback: SolutionCallback) {
        self.on_solution = Some(callback);
    }

    pub fn restart_clock(&mut self) {
        self.start = Instant::now();
    }

    /// Walks from a finished leaf to the root, finalizing every ancestor
    /// whose subtree completed. Returns true if the root value improved.
    pub fn propagate<const S: bool>(&mut self, search: &mut Search<S>, leaf: NodeIndex) -> bool {
        // values accumulate up to the true root only; the dummy partial
        // solution tree of a restricted run stays untouched above it
        let root = match search.space.true_root() {
            Some(r) => r,
            None => return false,
        };
        let root_before = search.space.nodes[root].value();

        let mut child = leaf;
        loop {
            if child == root {
                break;
            }
            let parent = match search.space.nodes[child].parent() {
                Some(p) => p,
                None => break,
            };
            let finished = if search.space.nodes[parent].is_and() {
                self.merge_or_into_and(search, parent, child)
            } else {
                self.merge_and_into_or(search, parent, child)
            };
            if !finished {
                break;
            }
            child = parent;
        }

        let root_after = search.space.nodes[root].value();
        let improved = !root_after.is_nan() && (root_before.is_nan() || root_after > root_before);
        if improved {
            let assignment = search.space.nodes[root].as_or().opt_assignment.clone();
            let time_found = self.start.elapsed().as_secs();
            info!("new incumbent {:.8} after {} seconds", root_after, time_found);
            if let Some(callback) = &mut self.on_solution {
                callback(root_after, &assignment);
            }
            search.space.incumbent = Incumbent { value: root_after, assignment, time_found };
        }
        improved
    }

    /// A solved child OR multiplies into the AND parent. Returns true
    /// once all child subproblems of the AND are solved.
    fn merge_or_into_and<const S: bool>(&mut self, search: &mut Search<S>, parent: NodeIndex, child: NodeIndex) -> bool {
        let (child_var, value, tuple, tainted) = {
            let or = search.space.nodes[child].as_or();
            debug_assert!(
                or.heur_cache.is_empty()
                    || or.flags.is_set(NodeFlag::Pruned)
                    || or.value <= or.heur + 1e-9,
                "inadmissible heuristic at a solved OR node"
            );
            (or.var, or.value, or.opt_assignment.clone(), or.flags.is_set(NodeFlag::NotOpt))
        };

        let parent_var = search.space.nodes[parent].var();
        let child_vars: Vec<usize> = search.pt().node(child_var).sub_vars().to_vec();
        {
            let and = search.space.nodes[parent].as_and_mut();
            and.sub_solved += value;
            if tainted {
                and.flags.set(NodeFlag::NotOpt);
            }
        }
        for (i, var) in child_vars.iter().enumerate() {
            if let Some(position) = search.pt().node(parent_var).sub_var_position(*var) {
                search.space.nodes[parent].as_and_mut().opt_assignment[position] = tuple[i];
            }
        }

        self.delete_child(search, parent, child);

        if search.space.nodes.child_count_act(parent) == 0 {
            let and = search.space.nodes[parent].as_and_mut();
            and.value = and.label + and.sub_solved;
            and.flags.set(NodeFlag::Solved);
            and.flags.set(NodeFlag::Leaf);
            true
        } else {
            false
        }
    }

    /// A solved child AND maximizes into the OR parent. Returns true once
    /// every AND child is solved or pruned; at that point the value is
    /// committed to the cache (unless the subtree is tainted).
    fn merge_and_into_or<const S: bool>(&mut self, search: &mut Search<S>, parent: NodeIndex, child: NodeIndex) -> bool {
        let (value, tuple, tainted) = {
            let and = search.space.nodes[child].as_and();
            (and.value, and.opt_assignment.clone(), and.flags.is_set(NodeFlag::NotOpt))
        };
        {
            let or = search.space.nodes[parent].as_or_mut();
            if or.value.is_nan() || value > or.value {
                or.value = value;
                or.opt_assignment = tuple;
            }
            if tainted {
                or.flags.set(NodeFlag::NotOpt);
            }
        }

        self.delete_child(search, parent, child);

        if search.space.nodes.child_count_act(parent) == 0 {
            let var = search.space.nodes[parent].var();
            let (cachable, signature, value, assignment) = {
                let or = search.space.nodes[parent].as_or_mut();
                or.flags.set(NodeFlag::Solved);
                or.flags.set(NodeFlag::Leaf);
                (
                    or.flags.is_set(NodeFlag::Cachable) && !or.flags.is_set(NodeFlag::NotOpt),
                    or.cache_sig.clone(),
                    or.value,
                    or.opt_assignment.clone(),
                )
            };
            if cachable {
                search.space.cache.write(var, signature, CacheEntry { value, assignment });
            }
            true
        } else {
            false
        }
    }

    /// Unlinks the child from the parent and frees its whole subtree
    fn delete_child<const S: bool>(&mut self, search: &mut Search<S>, parent: NodeIndex, child: NodeIndex) {
        let slot = search.space.nodes[parent].children().iter().position(|s| *s == Some(child));
        if let Some(slot) = slot {
            search.space.nodes[parent].children_mut()[slot] = None;
        }
        search.space.nodes.free_subtree(child);
    }
}

impl Default for BoundPropagator {
    fn default() -> Self {
        Self::new()
    }
}
