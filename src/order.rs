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

//! Min-fill elimination ordering with randomized tie-breaking. Nodes with
//! fill score zero (simplicial) are eliminated eagerly; among the rest a
//! candidate is drawn uniformly from the `tolerance + 1` best score ranks.

use rand::rngs::StdRng;
use rand::Rng;

use crate::core::graph::Graph;

const TAGGED: usize = usize::MAX;

/// An elimination ordering over the real (non-dummy) variables together
/// with its induced width. The first variable is eliminated first and
/// becomes the deepest pseudo-tree leaf.
#[derive(Debug, Clone)]
pub struct EliminationOrder {
    order: Vec<usize>,
    width: usize,
}

impl EliminationOrder {

    pub fn new(order: Vec<usize>, width: usize) -> Self {
        Self { order, width }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// Runs one randomized min-fill pass over a copy of the graph. Returns
/// None as soon as the induced width exceeds `limit`.
pub fn find_ordering(graph: &Graph, limit: usize, tolerance: usize, rng: &mut StdRng) -> Option<EliminationOrder> {
    let mut graph = graph.clone();
    let n = graph.number_nodes();
    let mut order: Vec<usize> = Vec::with_capacity(n);
    let mut width = 0;

    let mut scores: Vec<usize> = (0..n).map(|i| graph.score_min_fill(i)).collect();

    let mut candidates: Vec<Vec<usize>> = vec![vec![]; tolerance + 1];
    let mut candidate_scores: Vec<usize> = vec![TAGGED; tolerance + 1];
    let mut simplicial: Vec<usize> = vec![];

    while graph.number_nodes() != 0 {
        for rank in candidates.iter_mut() {
            rank.clear();
        }
        for score in candidate_scores.iter_mut() {
            *score = TAGGED;
        }
        simplicial.clear();

        for i in 0..n {
            if scores[i] == TAGGED {
                continue;
            }
            if scores[i] == 0 {
                simplicial.push(i);
                continue;
            }
            for j in 0..=tolerance {
                if scores[i] == candidate_scores[j] {
                    candidates[j].push(i);
                    break;
                } else if scores[i] < candidate_scores[j] {
                    // move the worse ranks back and recycle the last one
                    candidates[tolerance].clear();
                    let recycled = std::mem::take(&mut candidates[tolerance]);
                    for k in (j + 1..=tolerance).rev() {
                        candidates[k] = std::mem::take(&mut candidates[k - 1]);
                        candidate_scores[k] = candidate_scores[k - 1];
                    }
                    candidates[j] = recycled;
                    candidates[j].push(i);
                    candidate_scores[j] = scores[i];
                    break;
                }
            }
        }

        // eliminating a simplicial node adds no fill edges
        for i in simplicial.iter().copied() {
            order.push(i);
            width = width.max(graph.degree(i));
            if width > limit {
                return None;
            }
            graph.remove_node(i);
            scores[i] = TAGGED;
        }

        if candidate_scores[0] == TAGGED {
            // everything left was simplicial
            return Some(EliminationOrder::new(order, width));
        }

        let total: usize = candidates.iter().zip(candidate_scores.iter())
            .filter(|(_, s)| **s != TAGGED)
            .map(|(c, _)| c.len())
            .sum();
        let mut choice = rng.gen_range(0..total);
        let mut next = 0;
        for (rank, score) in candidates.iter().zip(candidate_scores.iter()) {
            if *score == TAGGED {
                break;
            }
            if choice < rank.len() {
                next = rank[choice];
                break;
            }
            choice -= rank.len();
        }

        order.push(next);
        let neighbors: Vec<usize> = graph.neighbors(next).iter().copied().collect();
        width = width.max(neighbors.len());
        if width > limit {
            return None;
        }

        graph.add_clique(&neighbors);

        // fill scores change for the node's neighbors and their neighbors
        let mut update: Vec<usize> = neighbors.clone();
        for i in neighbors.iter() {
            update.extend(graph.neighbors(*i).iter().copied());
        }
        update.sort_unstable();
        update.dedup();
        update.retain(|i| *i != next);

        graph.remove_node(next);
        scores[next] = TAGGED;

        for i in update {
            scores[i] = graph.score_min_fill(i);
        }
    }

    Some(EliminationOrder::new(order, width))
}

/// Replays a given ordering on a copy of the graph and returns its
/// induced width
pub fn ordering_width(graph: &Graph, order: &[usize]) -> usize {
    let mut graph = graph.clone();
    let mut width = 0;
    for i in order.iter().copied() {
        let neighbors: Vec<usize> = graph.neighbors(i).iter().copied().collect();
        width = width.max(neighbors.len());
        graph.add_clique(&neighbors);
        graph.remove_node(i);
    }
    width
}

#[cfg(test)]
mod test_order {

    use super::*;
    use crate::core::factor::Factor;
    use rand::SeedableRng;

    fn chain_graph() -> Graph {
        let factors = vec![
            Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]),
            Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]),
        ];
        Graph::from_factors(3, &factors)
    }

    #[test]
    fn chain_has_width_one() {
        let graph = chain_graph();
        let mut rng = StdRng::seed_from_u64(42);
        let result = find_ordering(&graph, usize::MAX, 0, &mut rng).unwrap();
        assert_eq!(result.order().len(), 3);
        assert_eq!(result.width(), 1);
        assert_eq!(ordering_width(&graph, result.order()), 1);
    }

    #[test]
    fn width_limit_aborts_with_sentinel() {
        // a 4-clique has induced width 3 under any ordering
        let factors = vec![Factor::from_probabilities(
            0,
            vec![0, 1, 2, 3],
            vec![2, 2, 2, 2],
            vec![0.5; 16],
        )];
        let graph = Graph::from_factors(4, &factors);
        let mut rng = StdRng::seed_from_u64(42);
        assert!(find_ordering(&graph, 2, 0, &mut rng).is_none());
        assert!(find_ordering(&graph, 3, 0, &mut rng).is_some());
    }

    #[test]
    fn tolerance_still_produces_valid_permutation() {
        let graph = chain_graph();
        let mut rng = StdRng::seed_from_u64(7);
        let result = find_ordering(&graph, usize::MAX, 2, &mut rng).unwrap();
        let mut sorted = result.order().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }
}
