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

//! The per-node pipeline shared by all search strategies. Every node
//! taken off a strategy's frontier goes through, in order: processing
//! (assignment recording), caching (adaptive resets and lookups), the
//! partial-solution-tree pruning test, and expansion. Each step may stop
//! the pipeline and surface the node as a leaf for the propagator.

pub mod aostar;
pub mod bnb;
pub mod lds;
pub mod node;
pub mod space;

use crate::common::*;
use crate::core::problem::Problem;
use crate::heuristics::Heuristic;
use crate::pseudo_tree::PseudoTree;
use crate::search::node::{NodeFlag, NodeIndex, SearchNode};
use crate::search::space::SearchSpace;
use crate::statistics::Statistics;

pub struct Search<'a, const S: bool> {
    problem: &'a Problem,
    pt: &'a PseudoTree,
    pub space: SearchSpace,
    pub heuristic: Box<dyn Heuristic>,
    /// The current partial assignment, synced with the active path
    pub assignment: Assignment,
    /// AND nodes expanded per depth
    pub node_profile: Vec<u64>,
    /// Leaf AND nodes per depth
    pub leaf_profile: Vec<u64>,
    pub stats: Statistics<S>,
}

impl<'a, const S: bool> Search<'a, S> {

    pub fn new(problem: &'a Problem, pt: &'a PseudoTree, caching: bool, heuristic: Box<dyn Heuristic>) -> Self {
        let depths = (pt.height().max(0) as usize) + 1;
        Self {
            problem,
            pt,
            space: SearchSpace::new(problem.number_variables(), caching),
            heuristic,
            assignment: vec![UNASSIGNED; problem.number_variables()],
            node_profile: vec![0; depths],
            leaf_profile: vec![0; depths],
            stats: Statistics::default(),
        }
    }

    pub fn problem(&self) -> &'a Problem {
        self.problem
    }

    /// Releases the heuristic, so it can drive another search over the
    /// same problem
    pub fn into_heuristic(self) -> Box<dyn Heuristic> {
        self.heuristic
    }

    pub fn pt(&self) -> &'a PseudoTree {
        self.pt
    }

    /// Creates the root OR node (on the dummy variable) if not present
    pub fn init(&mut self) -> NodeIndex {
        match self.space.root {
            Some(root) => root,
            None => {
                let var = self.pt.root();
                let sub_vars = self.pt.node(var).sub_vars().len();
                let root = self.space.nodes.alloc(SearchNode::new_or(None, var, -1, sub_vars));
                self.space.root = Some(root);
                root
            },
        }
    }

    /// Computes the heuristic of the (true) root before the search starts
    pub fn finalize_heuristic(&mut self) {
        if let Some(root) = self.space.true_root() {
            self.assign_costs_or(root);
        }
    }

    /// Step 1: record the assignment of an AND node
    pub fn do_process(&mut self, n: NodeIndex) -> bool {
        match &self.space.nodes[n] {
            SearchNode::And(and) => {
                debug_assert!(and.label != ELEM_ZERO);
                let (var, val) = (and.var, and.val);
                self.stats.process_and();
                self.assignment[var] = val;
            },
            SearchNode::Or(_) => {
                self.stats.process_or();
            },
        }
        false
    }

    /// Step 2: adaptive-cache resets on AND nodes, cache lookup on OR
    /// nodes. Returns true when the node value came from the cache.
    pub fn do_caching(&mut self, n: NodeIndex) -> bool {
        let var = self.space.nodes[n].var();
        let ptnode = self.pt.node(var);

        if self.space.nodes[n].is_and() {
            if self.space.cache.enabled() {
                for reset in ptnode.cache_resets() {
                    self.space.cache.reset(*reset);
                }
            }
            return false;
        }

        // pseudo-tree root and its direct children are never cached
        let parent_var = match ptnode.parent() {
            Some(p) => p,
            None => return false,
        };
        if self.pt.node(parent_var).parent().is_none() {
            return false;
        }

        if ptnode.full_context().len() <= self.pt.node(parent_var).full_context().len() {
            let signature: Vec<Value> = ptnode.cache_context().iter().map(|v| self.assignment[*v]).collect();
            self.stats.cache_access();
            match self.space.cache.read(var, &signature) {
                Some(entry) => {
                    let value = entry.value;
                    let assignment = entry.assignment.clone();
                    let or = self.space.nodes[n].as_or_mut();
                    or.cache_sig = signature;
                    or.value = value;
                    or.opt_assignment = assignment;
                    or.flags.set(NodeFlag::Leaf);
                    self.stats.cache_hit();
                    return true;
                },
                None => {
                    let or = self.space.nodes[n].as_or_mut();
                    or.cache_sig = signature;
                    or.flags.set(NodeFlag::Cachable);
                },
            }
        }
        false
    }

    /// Step 3: the partial-solution-tree pruning rule
    pub fn do_pruning(&mut self, n: NodeIndex) -> bool {
        if !self.can_be_pruned(n) {
            return false;
        }
        self.stats.pruned();
        let domain = self.problem.domain_size(self.space.nodes[n].var());
        let depth = self.space.nodes[n].depth();
        match &mut self.space.nodes[n] {
            SearchNode::And(and) => {
                and.flags.set(NodeFlag::Leaf);
                and.flags.set(NodeFlag::Pruned);
                and.value = ELEM_ZERO;
                if depth >= 0 {
                    self.leaf_profile[depth as usize] += 1;
                }
            },
            SearchNode::Or(or) => {
                or.flags.set(NodeFlag::Leaf);
                or.flags.set(NodeFlag::Pruned);
                if or.value.is_nan() {
                    or.value = ELEM_ZERO;
                }
                // all AND children would have been generated and pruned
                if depth >= 0 {
                    self.leaf_profile[depth as usize] += domain as u64;
                }
            },
        }
        true
    }

    /// Walks up the partial solution tree, accumulating the bound of the
    /// completion through `n`. Pruning is sound as soon as the bound
    /// drops to the value already secured at an ancestor OR node. Ties
    /// mark the OR nodes in between as possibly not optimally solved.
    fn can_be_pruned(&mut self, n: NodeIndex) -> bool {
        let cut = {
            let nodes = &self.space.nodes;
            let node = &nodes[n];
            // never prune the root, a better solution may still exist
            if node.depth() < 0 {
                return false;
            }
            if node.heur() == ELEM_ZERO {
                return true;
            }

            let mut pst_val = node.heur(); // includes the label for AND nodes
            let start_or = if node.is_or() { n } else { node.parent().unwrap() };
            let mut cur_or = start_or;

            if pst_val <= nodes[cur_or].value() {
                return true;
            }

            let mut cut = None;
            while let Some(cur_and) = nodes[cur_or].parent() {
                let and = nodes[cur_and].as_and();
                pst_val += and.label;
                pst_val += and.sub_solved;
                // unsolved sibling subproblems enter through their bound
                for slot in and.children.iter() {
                    match slot {
                        Some(c) if *c != cur_or && nodes.is_alive(*c) => {
                            pst_val += nodes[*c].heur();
                        },
                        _ => {},
                    }
                }
                let parent_or = nodes[cur_and].parent().expect("AND node without OR parent");
                if pst_val <= nodes[parent_or].value() {
                    cut = Some((start_or, parent_or));
                    break;
                }
                cur_or = parent_or;
            }
            match cut {
                Some(c) => c,
                None => return false,
            }
        };

        // subproblems on the way up may only be bounded, not optimal
        let (start_or, stop_or) = cut;
        let mut walk = start_or;
        while walk != stop_or {
            self.space.nodes[walk].flags_mut().set(NodeFlag::NotOpt);
            let and_up = self.space.nodes[walk].parent().unwrap();
            walk = self.space.nodes[and_up].parent().unwrap();
        }
        true
    }

    /// Step 4 for AND nodes: one OR child per pseudo-tree child, in
    /// reverse order for the LIFO frontier. Returns the children and
    /// whether the node ended up a leaf.
    pub fn generate_children_and(&mut self, n: NodeIndex) -> (Vec<NodeIndex>, bool) {
        debug_assert!(self.space.nodes[n].is_and());

        if !self.space.nodes[n].children().is_empty() {
            if self.space.nodes.child_count_act(n) == 0 {
                self.space.nodes[n].children_mut().clear();
            } else {
                let alive: Vec<NodeIndex> = self.space.nodes[n].children().iter()
                    .filter_map(|slot| *slot)
                    .filter(|c| self.space.nodes.is_alive(*c))
                    .collect();
                return (alive, false);
            }
        }

        self.stats.expand_and();
        let (var, depth, label) = {
            let and = self.space.nodes[n].as_and();
            (and.var, and.depth, and.label)
        };
        if depth >= 0 {
            self.node_profile[depth as usize] += 1;
        }

        let pt_children: Vec<usize> = self.pt.node(var).children().iter().rev().copied().collect();
        let mut children = vec![];
        for child_var in pt_children {
            let sub_vars = self.pt.node(child_var).sub_vars().len();
            let child = self.space.nodes.alloc(SearchNode::new_or(Some(n), child_var, depth + 1, sub_vars));
            let h = self.assign_costs_or(child);
            if h == ELEM_ZERO {
                // dead end, the subproblem below admits no completion
                for c in children {
                    self.space.nodes.free_node(c);
                }
                self.space.nodes.free_node(child);
                let and = self.space.nodes[n].as_and_mut();
                and.flags.set(NodeFlag::Leaf);
                and.value = ELEM_ZERO;
                self.stats.leaf();
                if depth >= 0 {
                    self.leaf_profile[depth as usize] += 1;
                }
                return (vec![], true);
            }
            children.push(child);
        }

        if children.is_empty() {
            // terminal AND node: nothing below, worth exactly its label
            let and = self.space.nodes[n].as_and_mut();
            and.flags.set(NodeFlag::Leaf);
            and.value = label;
            self.stats.leaf();
            if depth >= 0 {
                self.leaf_profile[depth as usize] += 1;
            }
            return (vec![], true);
        }

        let slots: Vec<Option<NodeIndex>> = children.iter().map(|c| Some(*c)).collect();
        *self.space.nodes[n].children_mut() = slots;
        (children, false)
    }

    /// Step 4 for OR nodes: one AND child per value with nonzero label,
    /// using the cached (heur, label) pairs, sorted by ascending bound so
    /// the most promising child is popped last off a stack.
    pub fn generate_children_or(&mut self, n: NodeIndex) -> (Vec<NodeIndex>, bool) {
        debug_assert!(self.space.nodes[n].is_or());

        if !self.space.nodes[n].children().is_empty() {
            if self.space.nodes.child_count_act(n) == 0 {
                self.space.nodes[n].children_mut().clear();
            } else {
                let alive: Vec<NodeIndex> = self.space.nodes[n].children().iter()
                    .filter_map(|slot| *slot)
                    .filter(|c| self.space.nodes.is_alive(*c))
                    .collect();
                return (alive, false);
            }
        }

        self.stats.expand_or();
        let (var, depth, heur_cache) = {
            let or = self.space.nodes[n].as_or();
            (or.var, or.depth, or.heur_cache.clone())
        };
        let sub_vars = self.pt.node(var).sub_vars().len();
        let own_position = self.pt.node(var).sub_var_position(var).unwrap();

        let mut children = vec![];
        for i in (0..heur_cache.len()).rev() {
            let (h, label) = heur_cache[i];
            if label == ELEM_ZERO {
                self.stats.dead_end();
                if depth >= 0 {
                    self.leaf_profile[depth as usize] += 1;
                }
                continue;
            }
            let mut child = SearchNode::new_and(n, var, i as Value, depth, label, sub_vars);
            {
                let and = child.as_and_mut();
                and.heur = h;
                and.opt_assignment[own_position] = i as Value;
            }
            children.push(self.space.nodes.alloc(child));
        }

        if children.is_empty() {
            // every value is ruled out by a zero label
            let or = self.space.nodes[n].as_or_mut();
            or.flags.set(NodeFlag::Leaf);
            or.value = ELEM_ZERO;
            self.stats.leaf();
            return (vec![], true);
        }

        children.sort_by(|a, b| self.space.nodes[*a].heur().total_cmp(&self.space.nodes[*b].heur()));
        let slots: Vec<Option<NodeIndex>> = children.iter().map(|c| Some(*c)).collect();
        *self.space.nodes[n].children_mut() = slots;
        (children, false)
    }

    /// Computes the heuristic of a new OR node: one (bound, label) pair
    /// per prospective AND child, cached on the node; the OR bound is
    /// their maximum.
    pub fn assign_costs_or(&mut self, n: NodeIndex) -> f64 {
        let var = self.space.nodes[n].var();
        let domain = self.problem.domain_size(var);
        let mut heur = vec![ELEM_ONE; domain];
        let mut label = vec![ELEM_ONE; domain];
        self.heuristic.heur_all(self.problem, self.pt, var, &self.assignment, &mut heur);
        self.heuristic.label_all(self.problem, self.pt, var, &self.assignment, &mut label);

        let mut h = ELEM_ZERO;
        let pairs: Vec<(f64, f64)> = heur.iter().zip(label.iter()).map(|(hv, lv)| {
            let combined = hv + lv;
            if combined > h {
                h = combined;
            }
            (combined, *lv)
        }).collect();

        let or = self.space.nodes[n].as_or_mut();
        or.heur = h;
        or.ordering_heur = h;
        or.heur_cache = pairs;
        h
    }

    /// Re-syncs the assignment with the path above a node; needed when a
    /// strategy jumps between branches (rotation, best-first tips)
    pub fn sync_assignment(&mut self, n: NodeIndex) {
        let mut walk = Some(n);
        while let Some(i) = walk {
            if let SearchNode::And(and) = &self.space.nodes[i] {
                self.assignment[and.var] = and.val;
            }
            walk = self.space.nodes[i].parent();
        }
    }

    /// Current best full-solution value through the node: the maximum
    /// over the OR ancestors of their secured value divided by the path
    /// cost down to the node
    pub fn lower_bound(&self, n: NodeIndex) -> f64 {
        let nodes = &self.space.nodes;
        debug_assert!(nodes[n].is_or());
        let mut max_bound = ELEM_ZERO;
        let or_value = nodes[n].value();
        if !or_value.is_nan() {
            max_bound = max_bound.max(or_value);
        }
        let mut pst_val = ELEM_ONE;
        let mut cur = n;
        while let Some(and) = nodes[cur].parent() {
            pst_val += nodes[and].as_and().label;
            let or = nodes[and].parent().expect("AND node without OR parent");
            let value = nodes[or].value();
            if !value.is_nan() {
                let bound = value - pst_val;
                max_bound = max_bound.max(bound);
            }
            cur = or;
        }
        max_bound
    }

    /// Installs a restricted subproblem: the context assignment, and the
    /// parent partial solution tree as a chain of dummy OR/AND nodes
    /// whose values and labels drive the pruning rule. Returns the OR
    /// node of the subproblem root.
    pub fn install_subproblem(&mut self, root_var: usize, context: &[(usize, Value)], pst: &[(f64, f64)]) -> NodeIndex {
        for (var, value) in context.iter() {
            self.assignment[*var] = *value;
        }
        let dummy = self.problem.dummy_variable();
        let mut parent: Option<NodeIndex> = None;
        for (or_value, and_label) in pst.iter() {
            let mut or = SearchNode::new_or(parent, dummy, -1, 0);
            or.as_or_mut().value = *or_value;
            let or_idx = self.space.nodes.alloc(or);
            if let Some(p) = parent {
                *self.space.nodes[p].children_mut() = vec![Some(or_idx)];
            } else {
                self.space.root = Some(or_idx);
            }
            let and_idx = self.space.nodes.alloc(SearchNode::new_and(or_idx, dummy, 0, -1, *and_label, 0));
            *self.space.nodes[or_idx].children_mut() = vec![Some(and_idx)];
            parent = Some(and_idx);
        }
        let sub_vars = self.pt.node(root_var).sub_vars().len();
        let local = self.space.nodes.alloc(SearchNode::new_or(parent, root_var, 0, sub_vars));
        match parent {
            Some(p) => {
                *self.space.nodes[p].children_mut() = vec![Some(local)];
            },
            None => {
                self.space.root = Some(local);
            },
        }
        self.space.subproblem_local = Some(local);
        local
    }

    /// Seeds the root with an externally obtained lower bound
    pub fn update_solution(&mut self, value: f64, assignment: Option<Vec<Value>>) -> bool {
        if value.is_nan() {
            return false;
        }
        let root = match self.space.true_root() {
            Some(r) => r,
            None => return false,
        };
        let current = self.space.nodes[root].value();
        if !current.is_nan() && value <= current {
            return false;
        }
        self.space.nodes[root].set_value(value);
        self.space.incumbent.value = value;
        if let Some(assignment) = assignment {
            self.space.nodes[root].as_or_mut().opt_assignment = assignment.clone();
            self.space.incumbent.assignment = assignment;
        }
        true
    }
}
