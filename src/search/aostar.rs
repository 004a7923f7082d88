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

//! Best-first AND/OR search (AO*). The explicated graph lives in the
//! shared arena; nodes are identified by their pseudo-tree context
//! signature, so identical subproblems reached through different sibling
//! contexts share one node. Each iteration marks the best partial
//! solution graph, expands the most promising tip and revises the bounds
//! bottom-up until the root is solved.

use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::common::*;
use crate::search::node::{NodeFlag, NodeIndex, SearchNode};
use crate::search::space::Incumbent;
use crate::search::Search;

/// Node identity: kind, variable, value (AND only) and the assignment of
/// the variable's full context
type ContextKey = (bool, usize, Value, Vec<Value>);

pub struct AoStar<'a, const S: bool> {
    pub search: Search<'a, S>,
    index: FxHashMap<ContextKey, NodeIndex>,
    tips: Vec<NodeIndex>,
}

impl<'a, const S: bool> AoStar<'a, S> {

    pub fn new(search: Search<'a, S>) -> Self {
        Self {
            search,
            index: FxHashMap::default(),
            tips: vec![],
        }
    }

    fn is_expanded(&self, n: NodeIndex) -> bool {
        let node = &self.search.space.nodes[n];
        node.flags().is_set(NodeFlag::Expanded) || node.flags().is_set(NodeFlag::Leaf)
    }

    fn is_solved(&self, n: NodeIndex) -> bool {
        self.search.space.nodes[n].flags().is_set(NodeFlag::Solved)
    }

    /// Marks the best partial solution graph: the bound-maximizing AND
    /// child below every OR node, every OR child below an AND node.
    /// Collects the unsolved, unexpanded tips it exposes.
    fn find_best_partial_tree(&mut self) -> bool {
        self.tips.clear();
        let root = match self.search.space.root {
            Some(r) => r,
            None => return false,
        };
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            if self.is_solved(n) {
                continue;
            }
            if !self.is_expanded(n) {
                self.tips.push(n);
                continue;
            }
            match &self.search.space.nodes[n] {
                SearchNode::Or(or) => {
                    let mut best: Option<NodeIndex> = None;
                    let mut best_heur = ELEM_ZERO;
                    for slot in or.children.iter().flatten() {
                        if !self.search.space.nodes.is_alive(*slot) {
                            continue;
                        }
                        let h = self.search.space.nodes[*slot].heur();
                        if best.is_none() || h > best_heur {
                            best = Some(*slot);
                            best_heur = h;
                        }
                    }
                    if let Some(child) = best {
                        stack.push(child);
                    }
                },
                SearchNode::And(and) => {
                    for slot in and.children.iter().flatten() {
                        if self.search.space.nodes.is_alive(*slot) {
                            stack.push(*slot);
                        }
                    }
                },
            }
        }
        !self.tips.is_empty()
    }

    /// Tips by descending ordering bound, ties by descending admissible
    /// bound
    fn arrange_tip_nodes(&mut self) {
        let nodes = &self.search.space.nodes;
        self.tips.sort_by(|a, b| {
            let key = |i: &NodeIndex| match &nodes[*i] {
                SearchNode::Or(or) => (or.ordering_heur, or.heur),
                SearchNode::And(and) => (and.heur, and.heur),
            };
            let (oa, ha) = key(a);
            let (ob, hb) = key(b);
            ob.total_cmp(&oa).then(hb.total_cmp(&ha))
        });
    }

    fn choose_tip_node(&mut self) -> Option<NodeIndex> {
        if self.tips.is_empty() {
            return None;
        }
        Some(self.tips.remove(0))
    }

    fn context_signature(&self, var: usize) -> Vec<Value> {
        self.search.pt().node(var).full_context().iter().map(|v| self.search.assignment[*v]).collect()
    }

    /// Expands a tip, sharing children with identical context identity,
    /// then revises bounds bottom-up
    fn expand_and_revise(&mut self, n: NodeIndex) {
        self.search.sync_assignment(n);
        if self.search.space.nodes[n].is_or() {
            self.expand_or(n);
        } else {
            self.expand_and(n);
        }
        if self.is_solved(n) {
            // terminal or dead end: the expansion itself settled the
            // node, so the revision starts at its parents
            let parents = self.search.space.nodes[n].parents().to_vec();
            for p in parents {
                self.revise_from(p);
            }
        } else {
            self.revise_from(n);
        }
    }

    fn expand_or(&mut self, n: NodeIndex) {
        let (var, depth, heur_cache) = {
            let or = self.search.space.nodes[n].as_or();
            (or.var, or.depth, or.heur_cache.clone())
        };
        self.search.stats.expand_or();
        let signature = self.context_signature(var);
        let sub_vars = self.search.pt().node(var).sub_vars().len();
        let own_position = self.search.pt().node(var).sub_var_position(var).unwrap();

        let mut slots = vec![];
        for (value, (h, label)) in heur_cache.iter().enumerate() {
            if *label == ELEM_ZERO {
                self.search.stats.dead_end();
                continue;
            }
            let key: ContextKey = (true, var, value as Value, signature.clone());
            let child = match self.index.get(&key).copied() {
                Some(existing) if self.search.space.nodes.is_alive(existing) => {
                    self.search.space.nodes[existing].add_parent(n);
                    existing
                },
                _ => {
                    let mut node = SearchNode::new_and(n, var, value as Value, depth, *label, sub_vars);
                    {
                        let and = node.as_and_mut();
                        and.heur = *h;
                        and.opt_assignment[own_position] = value as Value;
                    }
                    let index = self.search.space.nodes.alloc(node);
                    self.index.insert(key, index);
                    index
                },
            };
            slots.push(Some(child));
        }

        let or = self.search.space.nodes[n].as_or_mut();
        or.flags.set(NodeFlag::Expanded);
        if slots.is_empty() {
            or.value = ELEM_ZERO;
            or.heur = ELEM_ZERO;
            or.flags.set(NodeFlag::Leaf);
            or.flags.set(NodeFlag::Solved);
        } else {
            or.children = slots;
        }
    }

    fn expand_and(&mut self, n: NodeIndex) {
        let (var, val, depth, label) = {
            let and = self.search.space.nodes[n].as_and();
            (and.var, and.val, and.depth, and.label)
        };
        self.search.stats.expand_and();
        self.search.assignment[var] = val;

        let pt_children: Vec<usize> = self.search.pt().node(var).children().to_vec();
        let mut slots = vec![];
        for child_var in pt_children {
            let signature = self.context_signature(child_var);
            let key: ContextKey = (false, child_var, UNASSIGNED, signature);
            let child = match self.index.get(&key).copied() {
                Some(existing) if self.search.space.nodes.is_alive(existing) => {
                    self.search.space.nodes[existing].add_parent(n);
                    existing
                },
                _ => {
                    let sub_vars = self.search.pt().node(child_var).sub_vars().len();
                    let index = self.search.space.nodes.alloc(SearchNode::new_or(Some(n), child_var, depth + 1, sub_vars));
                    self.search.assign_costs_or(index);
                    self.index.insert(key, index);
                    index
                },
            };
            slots.push(Some(child));
        }

        let and = self.search.space.nodes[n].as_and_mut();
        and.flags.set(NodeFlag::Expanded);
        if slots.is_empty() {
            // terminal assignment, worth its label
            and.heur = label;
            and.value = label;
            and.flags.set(NodeFlag::Leaf);
            and.flags.set(NodeFlag::Solved);
            self.search.stats.leaf();
        } else {
            and.children = slots;
        }
    }

    /// Recomputes bounds and solved marks bottom-up from a node, pushing
    /// every parent whose bound changed or that became solved
    fn revise_from(&mut self, start: NodeIndex) {
        let mut worklist = vec![start];
        while let Some(n) = worklist.pop() {
            let changed = self.revise(n);
            if changed {
                let parents = self.search.space.nodes[n].parents().to_vec();
                for p in parents {
                    if self.search.space.nodes.is_alive(p) {
                        worklist.push(p);
                    }
                }
            }
        }
    }

    fn revise(&mut self, n: NodeIndex) -> bool {
        if !self.is_expanded(n) {
            return false;
        }
        let (old_heur, old_solved) = {
            let node = &self.search.space.nodes[n];
            (node.heur(), node.flags().is_set(NodeFlag::Solved))
        };
        if old_solved {
            return false;
        }
        let (new_heur, solved) = match &self.search.space.nodes[n] {
            SearchNode::And(and) => {
                let mut bound = and.label;
                let mut all_solved = true;
                for slot in and.children.iter().flatten() {
                    let child = &self.search.space.nodes[*slot];
                    bound += child.heur();
                    if !child.flags().is_set(NodeFlag::Solved) {
                        all_solved = false;
                    }
                }
                (bound, all_solved || bound == ELEM_ZERO)
            },
            SearchNode::Or(or) => {
                let mut bound = ELEM_ZERO;
                let mut best_solved = false;
                for slot in or.children.iter().flatten() {
                    let child = &self.search.space.nodes[*slot];
                    let h = child.heur();
                    if h > bound || (h == bound && !best_solved) {
                        bound = h;
                        best_solved = child.flags().is_set(NodeFlag::Solved);
                    }
                }
                (bound, best_solved || bound == ELEM_ZERO)
            },
        };

        let node = &mut self.search.space.nodes[n];
        match node {
            SearchNode::And(and) => and.heur = new_heur,
            SearchNode::Or(or) => or.heur = new_heur,
        }
        if solved {
            node.set_value(new_heur);
            node.flags_mut().set(NodeFlag::Solved);
        }
        new_heur != old_heur || solved
    }

    /// Reads the solved assignment off the best partial solution graph
    fn extract_solution(&mut self) {
        let root = match self.search.space.root {
            Some(r) => r,
            None => return,
        };
        let mut assignment = vec![UNASSIGNED; self.search.problem().number_variables()];
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            match &self.search.space.nodes[n] {
                SearchNode::Or(or) => {
                    let mut best: Option<NodeIndex> = None;
                    let mut best_heur = ELEM_ZERO;
                    for slot in or.children.iter().flatten() {
                        let child = &self.search.space.nodes[*slot];
                        if !child.flags().is_set(NodeFlag::Solved) {
                            continue;
                        }
                        if best.is_none() || child.heur() > best_heur {
                            best = Some(*slot);
                            best_heur = child.heur();
                        }
                    }
                    if let Some(child) = best {
                        stack.push(child);
                    }
                },
                SearchNode::And(and) => {
                    assignment[and.var] = and.val;
                    for slot in and.children.iter().flatten() {
                        stack.push(*slot);
                    }
                },
            }
        }
        let value = self.search.space.nodes[root].value();
        let mut tuple = vec![UNASSIGNED; self.search.pt().node(self.search.pt().root()).sub_vars().len()];
        for (i, var) in self.search.pt().node(self.search.pt().root()).sub_vars().iter().enumerate() {
            tuple[i] = assignment[*var];
        }
        self.search.space.nodes[root].as_or_mut().opt_assignment = tuple.clone();
        self.search.space.incumbent = Incumbent { value, assignment: tuple, time_found: 0 };
    }

    /// Iterates until the root is solved or the deadline passes. Returns
    /// true iff the optimum was proved.
    pub fn solve(&mut self, deadline: Option<Instant>) -> bool {
        let root = self.search.init();
        if self.search.space.nodes[root].as_or().heur_cache.is_empty() {
            self.search.finalize_heuristic();
        }
        loop {
            if self.is_solved(root) {
                self.extract_solution();
                return true;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    println!("Timed out.");
                    println!("Stats at timeout:");
                    println!("{}", self.search.stats);
                    return false;
                }
            }
            if !self.find_best_partial_tree() {
                // no tips left: the marked graph is fully revised
                self.extract_solution();
                return true;
            }
            self.arrange_tip_nodes();
            let tip = match self.choose_tip_node() {
                Some(t) => t,
                None => return false,
            };
            self.expand_and_revise(tip);
        }
    }
}
