//! HNSW insertion algorithm.
//!
//! Inserts a vector into the HNSW graph with bidirectional connections and
//! heuristic neighbor pruning (Algorithm 4 from the HNSW paper).
//!
//! The new node's own neighbor lists are computed before it is published, so the
//! node appears in the arena fully formed. Back-links are then added one neighbor
//! list at a time, each under that list's own write lock.

use crate::error::Result;
use crate::hnsw::graph::{EntryPoint, HnswIndex};
use crate::hnsw::node::{Node, NodeId};
use crate::hnsw::search::{greedy_closest, search_layer};
use crate::hnsw::visited::VisitedSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

thread_local! {
    /// Visited set reused by every insert on this thread, separate from the search pool.
    static INSERT_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

impl HnswIndex {
    /// Insert a vector, sampling its level from the index's generator.
    ///
    /// Fails with `DimensionMismatch` (and leaves the graph untouched) when the vector
    /// length differs from the index dimensionality.
    pub fn insert(&self, vector: &[f32]) -> Result<NodeId> {
        self.check_dimension(vector)?;
        let level = self.next_level();
        self.insert_at_level(vector, level)
    }

    /// Insert a vector, sampling its level from a generator seeded with `seed`.
    pub fn insert_with_seed(&self, vector: &[f32], seed: u64) -> Result<NodeId> {
        self.check_dimension(vector)?;
        let level = self.random_level(&mut StdRng::seed_from_u64(seed));
        self.insert_at_level(vector, level)
    }

    fn insert_at_level(&self, vector: &[f32], level: usize) -> Result<NodeId> {
        // First node: publish under the entry lock so two racing first inserts
        // cannot both become entry point.
        let entry = match self.entry_point() {
            Some(ep) => ep,
            None => {
                let mut guard = self.entry.write();
                let current = *guard;
                match current {
                    Some(ep) => ep,
                    None => {
                        let node = self.nodes.push(vector.into(), vec![Vec::new(); level + 1]);
                        *guard = Some(EntryPoint {
                            id: node.id(),
                            layer: level,
                        });
                        tracing::debug!(node = node.id(), layer = level, "Entry point created");
                        return Ok(node.id());
                    }
                }
            }
        };

        // Phase 1: greedy descent from the top layer down to level + 1
        let mut current_ep = entry.id;
        for layer in (level + 1..=entry.layer).rev() {
            current_ep = greedy_closest(self, vector, current_ep, layer).1;
        }

        // Phase 2: search each shared layer and select neighbors for the new node.
        let top = level.min(entry.layer);
        let mut node_neighbors: Vec<Vec<NodeId>> = vec![Vec::new(); level + 1];
        let accept_all = |_: &Node| true;

        INSERT_VISITED.with(|cell| {
            let mut visited = cell.borrow_mut();
            visited.ensure_capacity(self.nodes.allocated());

            let mut layer_eps: Vec<NodeId> = vec![current_ep];
            for layer in (0..=top).rev() {
                let candidates = search_layer(
                    self,
                    vector,
                    &layer_eps,
                    self.config.ef_construction,
                    layer,
                    &mut visited,
                    &accept_all,
                );
                let selected =
                    self.select_neighbors_heuristic(&candidates, self.config.max_neighbors(layer));
                node_neighbors[layer] = selected.iter().map(|&(_, id)| id).collect();

                // Candidates seed the search on the next (lower) layer
                layer_eps.clear();
                layer_eps.extend(candidates.iter().map(|&(_, id)| id));
                if layer_eps.is_empty() {
                    layer_eps.push(current_ep);
                }
            }
        });

        // Publish the node: id allocation and initial adjacency in one step
        let node = self.nodes.push(vector.into(), node_neighbors);
        let new_id = node.id();

        // Phase 3: add back-links and prune over-capacity neighbor lists
        for layer in 0..=top {
            let m_max = self.config.max_neighbors(layer);
            for neighbor_id in node.neighbors(layer) {
                self.connect(neighbor_id, new_id, layer, m_max);
            }
        }

        // Phase 4: a node on a new top layer becomes the entry point
        if level > entry.layer {
            let mut guard = self.entry.write();
            if guard.map_or(true, |ep| level > ep.layer) {
                *guard = Some(EntryPoint {
                    id: new_id,
                    layer: level,
                });
                tracing::debug!(node = new_id, layer = level, "Entry point raised");
            }
        }

        Ok(new_id)
    }

    /// Adds `new_id` to `target`'s list at `layer`, pruning back to `m_max` with the
    /// diversity heuristic. Only `target`'s list is locked.
    fn connect(&self, target: NodeId, new_id: NodeId, layer: usize, m_max: usize) {
        let Some(target_node) = self.nodes.get(target) else {
            return;
        };
        let Some(mut list) = target_node.neighbors_mut(layer) else {
            return;
        };
        if list.contains(&new_id) {
            return;
        }
        list.push(new_id);
        if list.len() <= m_max {
            return;
        }

        let base = target_node.vector();
        let candidates: Vec<(f32, NodeId)> = list
            .iter()
            .filter_map(|&cid| {
                let candidate = self.nodes.get(cid)?;
                Some((self.metric.distance(base, candidate.vector()), cid))
            })
            .collect();
        let pruned = self.select_neighbors_heuristic(&candidates, m_max);
        *list = pruned.into_iter().map(|(_, id)| id).collect();
    }

    /// Heuristic neighbor selection (Algorithm 4 from the HNSW paper).
    /// Prefers diverse neighbors: a candidate is selected only if it is closer to the base node
    /// than to any already-selected neighbor. This avoids redundant clusters of near-identical
    /// neighbors and keeps long-range links that make the graph navigable.
    /// Remaining slots are back-filled with the closest discarded candidates.
    fn select_neighbors_heuristic(
        &self,
        candidates: &[(f32, NodeId)],
        m: usize,
    ) -> Vec<(f32, NodeId)> {
        let mut sorted = candidates.to_vec();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut selected: Vec<(f32, NodeId)> = Vec::with_capacity(m);
        let mut selected_nodes: Vec<Arc<Node>> = Vec::with_capacity(m);

        for &(dist_to_base, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            let Some(candidate) = self.nodes.get(cid) else {
                continue;
            };
            let is_diverse = selected_nodes.iter().all(|chosen| {
                dist_to_base <= self.metric.distance(candidate.vector(), chosen.vector())
            });
            if is_diverse {
                selected.push((dist_to_base, cid));
                selected_nodes.push(candidate);
            }
        }

        if selected.len() < m {
            let selected_ids: HashSet<NodeId> = selected.iter().map(|&(_, id)| id).collect();
            for &(dist, cid) in &sorted {
                if selected.len() >= m {
                    break;
                }
                if !selected_ids.contains(&cid) {
                    selected.push((dist, cid));
                }
            }
        }

        selected
    }
}
