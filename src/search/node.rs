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

//! Search nodes of the AND/OR space, stored in an arena and addressed by
//! stable indices. Parent and child links are indices, so bottom-up
//! propagation walks indices and deleting a solved subtree is plain slot
//! invalidation.

use crate::common::*;

/// Index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(pub usize);

pub enum NodeFlag {
    Clear = 0,
    /// OR node may commit its value to the cache once solved
    Cachable = 1,
    /// Value is only an upper bound (pruning tie below); never cached
    NotOpt = 2,
    Expanded = 4,
    Pruned = 8,
    Leaf = 16,
    Solved = 32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {

    #[inline]
    pub fn new() -> Self {
        NodeFlags(NodeFlag::Clear as u8)
    }

    #[inline]
    pub fn set(&mut self, flag: NodeFlag) {
        self.0 |= flag as u8;
    }

    #[inline]
    pub fn is_set(&self, flag: NodeFlag) -> bool {
        self.0 & (flag as u8) != 0
    }
}

/// Choice point over the values of one variable
#[derive(Debug)]
pub struct OrNode {
    pub var: usize,
    pub depth: isize,
    pub parents: Vec<NodeIndex>,
    pub children: Vec<Option<NodeIndex>>,
    /// NaN until solved, then the optimum over the AND children
    pub value: f64,
    /// Admissible upper bound on the subproblem below
    pub heur: f64,
    /// Secondary bound used to order AO* tips
    pub ordering_heur: f64,
    /// Precomputed (heur, label) per prospective AND child
    pub heur_cache: Vec<(f64, f64)>,
    /// Assignment of the cache context, the cache key of this node
    pub cache_sig: Vec<Value>,
    /// Best assignment of the subtree variables once solved
    pub opt_assignment: Vec<Value>,
    pub flags: NodeFlags,
}

/// Assignment of one value to a variable, branching into the independent
/// child subproblems of the pseudo tree
#[derive(Debug)]
pub struct AndNode {
    pub var: usize,
    pub val: Value,
    pub depth: isize,
    pub parents: Vec<NodeIndex>,
    pub children: Vec<Option<NodeIndex>>,
    /// Product of the factors fully assigned at this position
    pub label: f64,
    /// Upper bound including the label
    pub heur: f64,
    /// Product of the already solved child OR values
    pub sub_solved: f64,
    /// label * product of children, once all of them are solved
    pub value: f64,
    pub opt_assignment: Vec<Value>,
    pub flags: NodeFlags,
}

#[derive(Debug)]
pub enum SearchNode {
    Or(OrNode),
    And(AndNode),
}

impl SearchNode {

    pub fn new_or(parent: Option<NodeIndex>, var: usize, depth: isize, sub_vars: usize) -> Self {
        SearchNode::Or(OrNode {
            var,
            depth,
            parents: parent.into_iter().collect(),
            children: vec![],
            value: f64::NAN,
            heur: ELEM_ZERO,
            ordering_heur: ELEM_ZERO,
            heur_cache: vec![],
            cache_sig: vec![],
            opt_assignment: vec![UNASSIGNED; sub_vars],
            flags: NodeFlags::new(),
        })
    }

    pub fn new_and(parent: NodeIndex, var: usize, val: Value, depth: isize, label: f64, sub_vars: usize) -> Self {
        SearchNode::And(AndNode {
            var,
            val,
            depth,
            parents: vec![parent],
            children: vec![],
            label,
            heur: ELEM_ZERO,
            sub_solved: ELEM_ONE,
            value: f64::NAN,
            opt_assignment: vec![UNASSIGNED; sub_vars],
            flags: NodeFlags::new(),
        })
    }

    pub fn is_or(&self) -> bool {
        matches!(self, SearchNode::Or(_))
    }

    pub fn is_and(&self) -> bool {
        matches!(self, SearchNode::And(_))
    }

    pub fn as_or(&self) -> &OrNode {
        match self {
            SearchNode::Or(n) => n,
            SearchNode::And(_) => panic!("expected OR node"),
        }
    }

    pub fn as_or_mut(&mut self) -> &mut OrNode {
        match self {
            SearchNode::Or(n) => n,
            SearchNode::And(_) => panic!("expected OR node"),
        }
    }

    pub fn as_and(&self) -> &AndNode {
        match self {
            SearchNode::And(n) => n,
            SearchNode::Or(_) => panic!("expected AND node"),
        }
    }

    pub fn as_and_mut(&mut self) -> &mut AndNode {
        match self {
            SearchNode::And(n) => n,
            SearchNode::Or(_) => panic!("expected AND node"),
        }
    }

    pub fn var(&self) -> usize {
        match self {
            SearchNode::Or(n) => n.var,
            SearchNode::And(n) => n.var,
        }
    }

    pub fn depth(&self) -> isize {
        match self {
            SearchNode::Or(n) => n.depth,
            SearchNode::And(n) => n.depth,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            SearchNode::Or(n) => n.value,
            SearchNode::And(n) => n.value,
        }
    }

    pub fn set_value(&mut self, value: f64) {
        match self {
            SearchNode::Or(n) => n.value = value,
            SearchNode::And(n) => n.value = value,
        }
    }

    pub fn heur(&self) -> f64 {
        match self {
            SearchNode::Or(n) => n.heur,
            SearchNode::And(n) => n.heur,
        }
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        match self {
            SearchNode::Or(n) => n.parents.first().copied(),
            SearchNode::And(n) => n.parents.first().copied(),
        }
    }

    pub fn parents(&self) -> &[NodeIndex] {
        match self {
            SearchNode::Or(n) => &n.parents,
            SearchNode::And(n) => &n.parents,
        }
    }

    pub fn add_parent(&mut self, parent: NodeIndex) {
        match self {
            SearchNode::Or(n) => n.parents.push(parent),
            SearchNode::And(n) => n.parents.push(parent),
        }
    }

    pub fn children(&self) -> &[Option<NodeIndex>] {
        match self {
            SearchNode::Or(n) => &n.children,
            SearchNode::And(n) => &n.children,
        }
    }

    pub fn children_mut(&mut self) -> &mut Vec<Option<NodeIndex>> {
        match self {
            SearchNode::Or(n) => &mut n.children,
            SearchNode::And(n) => &mut n.children,
        }
    }

    pub fn flags(&self) -> &NodeFlags {
        match self {
            SearchNode::Or(n) => &n.flags,
            SearchNode::And(n) => &n.flags,
        }
    }

    pub fn flags_mut(&mut self) -> &mut NodeFlags {
        match self {
            SearchNode::Or(n) => &mut n.flags,
            SearchNode::And(n) => &mut n.flags,
        }
    }

    /// Allocated child slots, deleted ones included
    pub fn child_count_full(&self) -> usize {
        self.children().len()
    }
}

/// Slab of search nodes with slot reuse. Deleted subtrees leave None
/// slots behind; their indices are recycled.
#[derive(Default)]
pub struct NodeArena {
    nodes: Vec<Option<SearchNode>>,
    free: Vec<usize>,
}

impl NodeArena {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: SearchNode) -> NodeIndex {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeIndex(slot)
            },
            None => {
                self.nodes.push(Some(node));
                NodeIndex(self.nodes.len() - 1)
            },
        }
    }

    pub fn is_alive(&self, index: NodeIndex) -> bool {
        self.nodes.get(index.0).map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn get(&self, index: NodeIndex) -> Option<&SearchNode> {
        self.nodes.get(index.0).and_then(|slot| slot.as_ref())
    }

    pub fn free_node(&mut self, index: NodeIndex) {
        debug_assert!(self.is_alive(index));
        self.nodes[index.0] = None;
        self.free.push(index.0);
    }

    /// Live child slots of a node
    pub fn child_count_act(&self, index: NodeIndex) -> usize {
        self[index].children().iter()
            .filter(|slot| slot.map(|c| self.is_alive(c)).unwrap_or(false))
            .count()
    }

    /// Frees a node and its whole subtree
    pub fn free_subtree(&mut self, index: NodeIndex) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            if !self.is_alive(i) {
                continue;
            }
            for slot in self[i].children() {
                if let Some(c) = slot {
                    stack.push(*c);
                }
            }
            self.free_node(i);
        }
    }

    pub fn number_alive(&self) -> usize {
        self.nodes.len() - self.free.len()
    }
}

impl std::ops::Index<NodeIndex> for NodeArena {
    type Output = SearchNode;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        self.nodes[index.0].as_ref().expect("dead search node")
    }
}

impl std::ops::IndexMut<NodeIndex> for NodeArena {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Self::Output {
        self.nodes[index.0].as_mut().expect("dead search node")
    }
}
