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

//! Pseudo tree over the problem variables, induced by an elimination
//! ordering. Every factor scope lies on a root-to-leaf path, which is
//! what licenses the AND/OR decomposition of the search space. Each node
//! carries its full OR context (the separator towards the rest of the
//! problem), a possibly truncated adaptive-cache context, and the factors
//! placed at it.

use crate::core::factor::Factor;
use crate::core::graph::Graph;
use crate::order::EliminationOrder;

#[derive(Debug)]
pub struct PseudoTreeNode {
    var: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    /// Ancestor variables whose removal disconnects the subtree, ascending
    full_context: Vec<usize>,
    /// Prefix of the full context used as cache key, ascending
    cache_context: Vec<usize>,
    /// Variables whose cache tables must be cleared when entering this
    /// AND branch
    cache_resets: Vec<usize>,
    /// Factors placed at this node
    functions: Vec<usize>,
    depth: isize,
    sub_height: usize,
    sub_width: usize,
    /// All variables of the subtree rooted here (self included), ascending
    sub_vars: Vec<usize>,
}

impl PseudoTreeNode {

    fn new(var: usize, mut full_context: Vec<usize>) -> Self {
        full_context.sort_unstable();
        Self {
            var,
            parent: None,
            children: vec![],
            full_context,
            cache_context: vec![],
            cache_resets: vec![],
            functions: vec![],
            depth: 0,
            sub_height: 0,
            sub_width: 0,
            sub_vars: vec![],
        }
    }

    pub fn var(&self) -> usize {
        self.var
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn full_context(&self) -> &[usize] {
        &self.full_context
    }

    pub fn cache_context(&self) -> &[usize] {
        &self.cache_context
    }

    pub fn cache_resets(&self) -> &[usize] {
        &self.cache_resets
    }

    pub fn functions(&self) -> &[usize] {
        &self.functions
    }

    pub fn depth(&self) -> isize {
        self.depth
    }

    pub fn sub_height(&self) -> usize {
        self.sub_height
    }

    pub fn sub_width(&self) -> usize {
        self.sub_width
    }

    pub fn sub_vars(&self) -> &[usize] {
        &self.sub_vars
    }

    /// Position of a subtree variable in the (sorted) subtree variable
    /// list; used to address solution tuples
    pub fn sub_var_position(&self, var: usize) -> Option<usize> {
        self.sub_vars.binary_search(&var).ok()
    }
}

#[derive(Debug)]
pub struct PseudoTree {
    /// One node per variable; the dummy root is the last entry
    nodes: Vec<PseudoTreeNode>,
    root: usize,
    /// The elimination order, dummy variable appended at the end
    elim_order: Vec<usize>,
    /// Position of each variable in the elimination order
    elim_position: Vec<usize>,
    width: usize,
    path_width: usize,
    height: isize,
    components: usize,
    width_conditioned: Option<usize>,
}

impl PseudoTree {

    /// Builds the pseudo tree for the given elimination order. With
    /// `chain` every node has at most one child, trading treewidth-based
    /// decomposition for a plain OR ordering (pathwidth).
    pub fn build(graph: &Graph, order: &EliminationOrder, cache_bound: Option<usize>, chain: bool) -> Self {
        let mut graph = graph.clone();
        let n = order.order().len();
        let dummy = n;

        let mut nodes: Vec<Option<PseudoTreeNode>> = (0..=n).map(|_| None).collect();
        let mut roots: Vec<usize> = vec![];
        let mut width = 0;
        let mut path_width = 0;

        if chain {
            let mut context: Vec<usize> = vec![];
            let mut prev: Option<usize> = None;
            for i in order.order().iter().copied() {
                let neighbors: Vec<usize> = graph.neighbors(i).iter().copied().collect();
                context.retain(|v| *v != i);
                for v in neighbors.iter() {
                    if !context.contains(v) {
                        context.push(*v);
                    }
                }
                path_width = path_width.max(context.len());
                let mut node = PseudoTreeNode::new(i, context.clone());
                if let Some(p) = prev {
                    node.children.push(p);
                }
                nodes[i] = Some(node);
                if let Some(p) = prev {
                    nodes[p].as_mut().unwrap().parent = Some(i);
                }
                prev = Some(i);
                graph.add_clique(&neighbors);
                graph.remove_node(i);
            }
            if let Some(p) = prev {
                roots.push(p);
            }
            width = order.width();
        } else {
            for i in order.order().iter().copied() {
                let neighbors: Vec<usize> = graph.neighbors(i).iter().copied().collect();
                width = width.max(neighbors.len());
                let mut node = PseudoTreeNode::new(i, neighbors.clone());
                // adopt every root whose context mentions the new variable
                let mut remaining = vec![];
                for r in roots.drain(..) {
                    if nodes[r].as_ref().unwrap().full_context.binary_search(&i).is_ok() {
                        node.children.push(r);
                    } else {
                        remaining.push(r);
                    }
                }
                for c in node.children.iter() {
                    nodes[*c].as_mut().unwrap().parent = Some(i);
                }
                nodes[i] = Some(node);
                roots = remaining;
                roots.push(i);
                graph.add_clique(&neighbors);
                graph.remove_node(i);
            }
        }

        // artificial root connecting the remaining components
        let mut root_node = PseudoTreeNode::new(dummy, vec![]);
        let components = roots.len();
        for r in roots.iter().copied() {
            root_node.children.push(r);
            nodes[r].as_mut().unwrap().parent = Some(dummy);
        }
        nodes[dummy] = Some(root_node);

        let mut elim_order = order.order().to_vec();
        elim_order.push(dummy);
        let mut elim_position = vec![0; n + 1];
        for (pos, v) in elim_order.iter().enumerate() {
            elim_position[*v] = pos;
        }

        let mut tree = Self {
            nodes: nodes.into_iter().map(|n| n.unwrap()).collect(),
            root: dummy,
            elim_order,
            elim_position,
            width,
            path_width,
            height: 0,
            components,
            width_conditioned: None,
        };

        tree.compute_cache_contexts(cache_bound);
        tree.height = tree.update_depth_height(tree.root, -1) as isize - 1;
        tree.update_sub_width(tree.root);
        tree.update_sub_vars(tree.root);
        tree
    }

    /// Computes the adaptive-cache context of every node: the full
    /// context when it fits the bound, otherwise the `bound` nearest
    /// context ancestors, registering a cache reset at the closest
    /// context ancestor that fell outside
    fn compute_cache_contexts(&mut self, cache_bound: Option<usize>) {
        for i in 0..self.nodes.len() {
            let ctxt = self.nodes[i].full_context.clone();
            match cache_bound {
                None => {
                    self.nodes[i].cache_context = ctxt;
                },
                Some(bound) if bound >= ctxt.len() => {
                    self.nodes[i].cache_context = ctxt;
                },
                Some(bound) => {
                    let mut truncated = vec![];
                    let mut walk = self.nodes[i].parent;
                    for _ in 0..bound {
                        while let Some(p) = walk {
                            if ctxt.binary_search(&self.nodes[p].var).is_ok() {
                                break;
                            }
                            walk = self.nodes[p].parent;
                        }
                        let p = walk.expect("context variable missing above node");
                        truncated.push(self.nodes[p].var);
                        walk = self.nodes[p].parent;
                    }
                    // nearest context ancestor beyond the truncated prefix
                    // clears this node's cache when re-entered
                    while let Some(p) = walk {
                        if ctxt.binary_search(&self.nodes[p].var).is_ok() {
                            break;
                        }
                        walk = self.nodes[p].parent;
                    }
                    let reset_at = walk.expect("context variable missing above node");
                    let var = self.nodes[i].var;
                    self.nodes[reset_at].cache_resets.push(var);
                    truncated.sort_unstable();
                    self.nodes[i].cache_context = truncated;
                },
            }
        }
    }

    fn update_depth_height(&mut self, var: usize, depth: isize) -> usize {
        self.nodes[var].depth = depth;
        let children = self.nodes[var].children.clone();
        if children.is_empty() {
            self.nodes[var].sub_height = 0;
        } else {
            let mut m = 0;
            for c in children {
                m = m.max(self.update_depth_height(c, depth + 1));
            }
            self.nodes[var].sub_height = m + 1;
        }
        self.nodes[var].sub_height
    }

    fn update_sub_width(&mut self, var: usize) -> usize {
        let mut w = self.nodes[var].full_context.len();
        let children = self.nodes[var].children.clone();
        for c in children {
            w = w.max(self.update_sub_width(c));
        }
        self.nodes[var].sub_width = w;
        w
    }

    fn update_sub_vars(&mut self, var: usize) -> Vec<usize> {
        let mut vars = vec![var];
        let children = self.nodes[var].children.clone();
        for c in children {
            vars.extend(self.update_sub_vars(c));
        }
        vars.sort_unstable();
        self.nodes[var].sub_vars = vars.clone();
        vars
    }

    /// Places every factor on the node of its earliest-eliminated scope
    /// variable (the deepest pseudo-tree node containing the full scope).
    /// Constant factors go to the dummy root.
    pub fn assign_functions(&mut self, factors: &[Factor]) {
        for node in self.nodes.iter_mut() {
            node.functions.clear();
        }
        for factor in factors.iter() {
            let target = match factor.scope().iter().min_by_key(|v| self.elim_position[**v]) {
                Some(v) => *v,
                None => self.root,
            };
            self.nodes[target].functions.push(factor.id());
        }
    }

    pub fn node(&self, var: usize) -> &PseudoTreeNode {
        &self.nodes[var]
    }

    pub fn number_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn elim_order(&self) -> &[usize] {
        &self.elim_order
    }

    pub fn elim_position(&self, var: usize) -> usize {
        self.elim_position[var]
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn path_width(&self) -> usize {
        self.path_width
    }

    pub fn height(&self) -> isize {
        self.height
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn width_conditioned(&self) -> Option<usize> {
        self.width_conditioned
    }

    /// Restricts the tree to the subproblem rooted at the given variable:
    /// the dummy root keeps only that child, and depths, subtree variables
    /// and the conditioned width are recomputed. Returns the depth the
    /// subproblem root had in the unrestricted tree.
    pub fn restrict_subproblem(&mut self, root_var: usize) -> isize {
        debug_assert!(root_var != self.root);
        let old_depth = self.nodes[root_var].depth;

        let old_children = std::mem::take(&mut self.nodes[self.root].children);
        for c in old_children {
            self.nodes[c].parent = None;
        }
        self.nodes[self.root].children.push(root_var);
        self.nodes[root_var].parent = Some(self.root);

        self.height = self.update_depth_height(self.root, -1) as isize - 1;
        self.update_sub_vars(self.root);

        // width when conditioned on the subproblem context
        let condset = self.nodes[root_var].full_context.clone();
        let mut width = 0;
        let mut stack = vec![root_var];
        while let Some(i) = stack.pop() {
            let outside = self.nodes[i].full_context.iter().filter(|v| condset.binary_search(v).is_err()).count();
            width = width.max(outside);
            stack.extend(self.nodes[i].children.iter().copied());
        }
        self.width_conditioned = Some(width);
        old_depth
    }
}

#[cfg(test)]
mod test_pseudo_tree {

    use super::*;
    use crate::core::factor::Factor;
    use crate::order::find_ordering;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chain_problem() -> (Graph, Vec<Factor>) {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ];
        let graph = Graph::from_factors(3, &factors);
        (graph, factors)
    }

    fn build_chain_tree() -> (PseudoTree, Vec<Factor>) {
        let (graph, factors) = chain_problem();
        let mut rng = StdRng::seed_from_u64(3);
        let order = find_ordering(&graph, usize::MAX, 0, &mut rng).unwrap();
        let mut tree = PseudoTree::build(&graph, &order, None, false);
        tree.assign_functions(&factors);
        (tree, factors)
    }

    #[test]
    fn context_is_subset_of_parent_context_plus_parent() {
        let (tree, _) = build_chain_tree();
        for var in 0..tree.number_nodes() {
            let node = tree.node(var);
            if let Some(p) = node.parent() {
                let parent = tree.node(p);
                for v in node.full_context() {
                    assert!(*v == parent.var() || parent.full_context().contains(v));
                }
            }
        }
    }

    #[test]
    fn every_factor_on_exactly_one_node_covering_its_scope() {
        let (tree, factors) = build_chain_tree();
        let mut placed = vec![0; factors.len()];
        for var in 0..tree.number_nodes() {
            for f in tree.node(var).functions() {
                placed[*f] += 1;
                for v in factors[*f].scope() {
                    assert!(tree.node(var).sub_vars().contains(v));
                }
            }
        }
        assert!(placed.iter().all(|c| *c == 1));
    }

    #[test]
    fn dummy_root_connects_components() {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.1, 0.9, 0.4, 0.2]),
            Factor::from_probabilities(1, vec![2, 3], vec![2, 2], vec![0.1, 0.9, 0.4, 0.2]),
        ];
        let graph = Graph::from_factors(4, &factors);
        let mut rng = StdRng::seed_from_u64(11);
        let order = find_ordering(&graph, usize::MAX, 0, &mut rng).unwrap();
        let tree = PseudoTree::build(&graph, &order, None, false);
        assert_eq!(tree.components(), 2);
        assert_eq!(tree.root(), 4);
        assert_eq!(tree.node(tree.root()).children().len(), 2);
        assert_eq!(tree.node(tree.root()).depth(), -1);
    }

    #[test]
    fn chain_mode_yields_single_children() {
        let (graph, _) = chain_problem();
        let mut rng = StdRng::seed_from_u64(5);
        let order = find_ordering(&graph, usize::MAX, 0, &mut rng).unwrap();
        let tree = PseudoTree::build(&graph, &order, None, true);
        for var in 0..tree.number_nodes() {
            assert!(tree.node(var).children().len() <= 1);
        }
        assert!(tree.path_width() >= tree.width());
    }

    #[test]
    fn cache_bound_truncates_context_and_registers_reset() {
        // a 3-clique plus a pendant: some node has context of size 2
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1, 2], vec![2, 2, 2], vec![0.5; 8]),
            Factor::from_probabilities(1, vec![2, 3], vec![2, 2], vec![0.5; 4]),
        ];
        let graph = Graph::from_factors(4, &factors);
        let mut rng = StdRng::seed_from_u64(17);
        let order = find_ordering(&graph, usize::MAX, 0, &mut rng).unwrap();
        let tree = PseudoTree::build(&graph, &order, Some(1), false);
        let mut found_truncated = false;
        for var in 0..tree.number_nodes() {
            let node = tree.node(var);
            assert!(node.cache_context().len() <= node.full_context().len());
            if node.full_context().len() > 1 {
                assert_eq!(node.cache_context().len(), 1);
                found_truncated = true;
            }
        }
        assert!(found_truncated);
        let resets: usize = (0..tree.number_nodes()).map(|v| tree.node(v).cache_resets().len()).sum();
        assert!(resets > 0);
    }
}
