//! HNSW search algorithms: greedy descent, single-layer best-first search and multi-layer KNN.
//!
//! Supports an optional filter predicate applied during graph traversal. Filtered and
//! tombstoned nodes are still used for navigation but excluded from results.
//! Ties on distance are broken by node id ascending, so a fixed graph always
//! produces the same answer for the same query.

use crate::config;
use crate::error::Result;
use crate::hnsw::graph::{HnswIndex, Neighbor};
use crate::hnsw::node::{Node, NodeId};
use crate::hnsw::visited::VisitedSet;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::collections::BinaryHeap;

thread_local! {
    /// Thread-local VisitedSet pool for search operations.
    /// Reused across searches on the same thread instead of allocating per query.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// A candidate during search. Ordered so that the max-heap pops the closest node first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    distance: OrderedFloat<f32>,
    id: NodeId,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.distance, other.id).cmp(&(self.distance, self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A result entry. Max-heap by (distance, id) so the worst result is popped when pruning.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: NodeId,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.distance, self.id).cmp(&(other.distance, other.id))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn distance_to(index: &HnswIndex, query: &[f32], node: &Node) -> f32 {
    index.metric.distance(query, node.vector())
}

/// Greedy single-best walk on one layer: move to any strictly closer neighbor until
/// none is left. Returns the local minimum and its distance.
pub(crate) fn greedy_closest(
    index: &HnswIndex,
    query: &[f32],
    start: NodeId,
    layer: usize,
) -> (f32, NodeId) {
    let Some(node) = index.nodes.get(start) else {
        return (f32::MAX, start);
    };
    let mut best = (OrderedFloat(distance_to(index, query, &node)), start);

    loop {
        let Some(current) = index.nodes.get(best.1) else {
            break;
        };
        let mut moved = false;
        for neighbor_id in current.neighbors(layer) {
            let Some(neighbor) = index.nodes.get(neighbor_id) else {
                continue;
            };
            let candidate = (OrderedFloat(distance_to(index, query, &neighbor)), neighbor_id);
            if candidate < best {
                best = candidate;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    (best.0 .0, best.1)
}

/// Search a single layer of the HNSW graph.
/// Returns up to `ef` closest nodes accepted by `accept`, ascending by (distance, id).
/// `visited` is a reusable VisitedSet (cleared at the start of each call).
pub(crate) fn search_layer<F: Fn(&Node) -> bool>(
    index: &HnswIndex,
    query: &[f32],
    entry_points: &[NodeId],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
    accept: &F,
) -> Vec<(f32, NodeId)> {
    visited.clear();
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
    // Cached worst distance of the result heap
    let mut worst_dist = f32::MAX;

    for &ep in entry_points {
        if !visited.insert(ep) {
            continue;
        }
        let Some(node) = index.nodes.get(ep) else {
            continue;
        };
        let dist = distance_to(index, query, &node);
        candidates.push(Candidate {
            distance: OrderedFloat(dist),
            id: ep,
        });
        if accept(&node) {
            results.push(ResultEntry {
                distance: OrderedFloat(dist),
                id: ep,
            });
            if results.len() > ef {
                results.pop();
            }
            worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
        }
    }

    while let Some(candidate) = candidates.pop() {
        // If the closest candidate is farther than the worst result, stop
        if results.len() >= ef && candidate.distance.0 > worst_dist {
            break;
        }

        let Some(node) = index.nodes.get(candidate.id) else {
            continue;
        };

        for neighbor_id in node.neighbors(layer) {
            if !visited.insert(neighbor_id) {
                continue;
            }
            let Some(neighbor) = index.nodes.get(neighbor_id) else {
                continue;
            };
            let dist = distance_to(index, query, &neighbor);

            if results.len() < ef || dist < worst_dist {
                candidates.push(Candidate {
                    distance: OrderedFloat(dist),
                    id: neighbor_id,
                });
                if accept(&neighbor) {
                    results.push(ResultEntry {
                        distance: OrderedFloat(dist),
                        id: neighbor_id,
                    });
                    if results.len() > ef {
                        results.pop(); // remove worst
                    }
                    worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

impl HnswIndex {
    /// K nearest live nodes to `query`, using the configured `ef_search`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.search_with_ef(query, k, self.config.ef_search)
    }

    /// K nearest live nodes to `query` with an explicit candidate list size (raised to `k`).
    pub fn search_with_ef(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<Neighbor>> {
        self.search_filtered(query, k, ef, |_| true)
    }

    /// Multi-layer KNN search with a filter predicate applied during graph traversal.
    ///
    /// Nodes rejected by `filter` are still used for navigation but excluded from results.
    /// If the first pass yields fewer than `k` results, ef is doubled (up to
    /// `HNSW_MAX_EF_GROWTH` times, bounded by graph size) and layer 0 searched again.
    pub fn search_filtered<F: Fn(NodeId) -> bool>(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: F,
    ) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(entry) = self.entry_point() else {
            return Ok(Vec::new());
        };

        let mut current_ep = entry.id;
        for layer in (1..=entry.layer).rev() {
            current_ep = greedy_closest(self, query, current_ep, layer).1;
        }

        let accept = |node: &Node| !node.is_deleted() && filter(node.id());
        let allocated = self.nodes.allocated();
        let base_ef = ef.max(k);
        let max_ef = (base_ef * config::HNSW_MAX_EF_GROWTH)
            .min(allocated)
            .max(base_ef);

        let mut results = SEARCH_VISITED.with(|cell| {
            let mut visited = cell.borrow_mut();
            visited.ensure_capacity(allocated);

            let mut ef = base_ef;
            loop {
                let results = search_layer(
                    self,
                    query,
                    std::slice::from_ref(&current_ep),
                    ef,
                    0,
                    &mut *visited,
                    &accept,
                );
                if results.len() >= k || ef >= max_ef {
                    break results;
                }
                ef = (ef * 2).min(max_ef);
            }
        });

        results.truncate(k);
        Ok(results
            .into_iter()
            .map(|(distance, id)| Neighbor { id, distance })
            .collect())
    }
}
