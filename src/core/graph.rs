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

//! Undirected interaction graph of the problem: one node per variable,
//! one edge per pair of variables co-occurring in a factor scope. The
//! graph is mutated only during elimination (fill-in edges, node removal).

use rustc_hash::FxHashSet;

use crate::core::factor::Factor;

#[derive(Debug, Clone)]
pub struct Graph {
    /// Adjacency sets, indexed by variable
    neighbors: Vec<FxHashSet<usize>>,
    /// False once a node has been removed
    present: Vec<bool>,
    number_nodes: usize,
    number_edges: usize,
}

impl Graph {

    pub fn new(n: usize) -> Self {
        Self {
            neighbors: vec![FxHashSet::default(); n],
            present: vec![true; n],
            number_nodes: n,
            number_edges: 0,
        }
    }

    /// Builds the interaction graph of a factor set over n variables
    pub fn from_factors(n: usize, factors: &[Factor]) -> Self {
        let mut graph = Self::new(n);
        for factor in factors.iter() {
            let scope = factor.scope();
            for i in 0..scope.len() {
                for j in i + 1..scope.len() {
                    graph.add_edge(scope[i], scope[j]);
                }
            }
        }
        graph
    }

    pub fn number_nodes(&self) -> usize {
        self.number_nodes
    }

    pub fn number_edges(&self) -> usize {
        self.number_edges
    }

    pub fn has_node(&self, i: usize) -> bool {
        self.present[i]
    }

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.neighbors[i].contains(&j)
    }

    pub fn neighbors(&self, i: usize) -> &FxHashSet<usize> {
        debug_assert!(self.present[i]);
        &self.neighbors[i]
    }

    pub fn degree(&self, i: usize) -> usize {
        self.neighbors[i].len()
    }

    pub fn nodes_iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.present.len()).filter(|i| self.present[*i])
    }

    pub fn add_edge(&mut self, i: usize, j: usize) {
        debug_assert!(i != j);
        if self.neighbors[i].insert(j) {
            self.neighbors[j].insert(i);
            self.number_edges += 1;
        }
    }

    /// Removes the node and all its incident edges
    pub fn remove_node(&mut self, i: usize) {
        debug_assert!(self.present[i]);
        let adjacent: Vec<usize> = self.neighbors[i].iter().copied().collect();
        for j in adjacent {
            self.neighbors[j].remove(&i);
            self.number_edges -= 1;
        }
        self.neighbors[i].clear();
        self.present[i] = false;
        self.number_nodes -= 1;
    }

    /// Pairwise connects the given nodes
    pub fn add_clique(&mut self, nodes: &[usize]) {
        for i in 0..nodes.len() {
            for j in i + 1..nodes.len() {
                self.add_edge(nodes[i], nodes[j]);
            }
        }
    }

    /// The min-fill score of a node: the number of edges missing between
    /// its neighbors
    pub fn score_min_fill(&self, i: usize) -> usize {
        let adjacent: Vec<usize> = self.neighbors[i].iter().copied().collect();
        let mut missing = 0;
        for a in 0..adjacent.len() {
            for b in a + 1..adjacent.len() {
                if !self.has_edge(adjacent[a], adjacent[b]) {
                    missing += 1;
                }
            }
        }
        missing
    }

    /// The connected components of the surviving nodes, each given as a
    /// list of variables
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.present.len()];
        let mut components = vec![];
        for start in self.nodes_iter() {
            if seen[start] {
                continue;
            }
            let mut component = vec![];
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(node) = stack.pop() {
                component.push(node);
                for next in self.neighbors[node].iter().copied() {
                    if !seen[next] {
                        seen[next] = true;
                        stack.push(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }
}

#[cfg(test)]
mod test_graph {

    use super::*;
    use crate::core::factor::Factor;

    fn chain_factors() -> Vec<Factor> {
        vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ]
    }

    #[test]
    fn edges_from_scope_cooccurrence() {
        let graph = Graph::from_factors(3, &chain_factors());
        assert!(graph.has_edge(0, 1));
        assert!(graph.has_edge(1, 2));
        assert!(!graph.has_edge(0, 2));
        assert_eq!(graph.number_edges(), 2);
    }

    #[test]
    fn min_fill_score_counts_missing_edges() {
        let graph = Graph::from_factors(3, &chain_factors());
        // eliminating the middle variable would add the edge 0-2
        assert_eq!(graph.score_min_fill(1), 1);
        assert_eq!(graph.score_min_fill(0), 0);
    }

    #[test]
    fn removing_a_node_disconnects() {
        let mut graph = Graph::from_factors(3, &chain_factors());
        graph.remove_node(1);
        assert_eq!(graph.number_nodes(), 2);
        assert_eq!(graph.number_edges(), 0);
        assert_eq!(graph.components().len(), 2);
    }

    #[test]
    fn components_of_disjoint_problems() {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.1, 0.9, 0.4, 0.2]),
            Factor::from_probabilities(1, vec![2, 3], vec![2, 2], vec![0.1, 0.9, 0.4, 0.2]),
        ];
        let graph = Graph::from_factors(4, &factors);
        let components = graph.components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0], vec![0, 1]);
        assert_eq!(components[1], vec![2, 3]);
    }
}
