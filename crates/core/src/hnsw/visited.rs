//! Generation-based visited set for HNSW graph traversal.
//!
//! Replaces `HashSet<NodeId>` with O(1) array indexing. Each `clear()` increments
//! a generation counter instead of zeroing the array, making repeated searches fast.
//! The set grows on demand because concurrent inserts can publish ids past the
//! capacity reserved at the start of a search.

use crate::hnsw::node::NodeId;

/// Generation-based visited set.
/// Uses u16 generation to reduce full memset frequency to every 65534 clears.
#[derive(Debug)]
pub struct VisitedSet {
    data: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u16; capacity],
            generation: 1,
        }
    }

    /// Reset the set. O(1) amortized; a full memset happens once every 65534 calls.
    pub fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.data.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Ensure capacity covers at least `cap` elements, growing if needed.
    pub fn ensure_capacity(&mut self, cap: usize) {
        if cap > self.data.len() {
            self.data.resize(cap, 0);
        }
    }

    /// Mark `id` as visited. Returns `true` if it was NOT previously visited.
    #[inline]
    pub fn insert(&mut self, id: NodeId) -> bool {
        let idx = id as usize;
        if idx >= self.data.len() {
            self.ensure_capacity((idx + 1).next_power_of_two());
        }
        if self.data[idx] == self.generation {
            false
        } else {
            self.data[idx] = self.generation;
            true
        }
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}
