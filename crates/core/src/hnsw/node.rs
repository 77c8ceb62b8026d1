//! Graph node store: the arena that owns every HNSW node.
//!
//! Nodes live in an append-only `Vec<Arc<Node>>` indexed by [`NodeId`]. Allocating an
//! id and publishing the node happen under a single write lock, so a reader either
//! sees a fully initialized node or no node at all. Each node keeps one neighbor list
//! per layer behind its own lock; insertions rewire one list at a time while searches
//! elsewhere keep reading.

use crate::error::{MemoryError, Result};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Stable node identifier. Assigned monotonically, never reused.
pub type NodeId = u64;

/// A vector plus its per-layer adjacency.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    vector: Box<[f32]>,
    /// `neighbors[layer]` for layers `0..=level`.
    neighbors: Box<[RwLock<Vec<NodeId>>]>,
    deleted: AtomicBool,
}

impl Node {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    /// Highest layer this node participates in.
    #[inline]
    pub fn level(&self) -> usize {
        self.neighbors.len() - 1
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Copy of the neighbor list at `layer` (empty above the node's level).
    /// The list lock is released before returning.
    pub fn neighbors(&self, layer: usize) -> Vec<NodeId> {
        self.neighbors
            .get(layer)
            .map(|list| list.read().clone())
            .unwrap_or_default()
    }

    /// Exclusive access to the neighbor list at `layer`, or `None` above the node's level.
    pub fn neighbors_mut(&self, layer: usize) -> Option<RwLockWriteGuard<'_, Vec<NodeId>>> {
        self.neighbors.get(layer).map(|list| list.write())
    }
}

/// Arena of HNSW nodes with atomic id allocation.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: RwLock<Vec<Arc<Node>>>,
    live: AtomicUsize,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id and publishes a fully built node.
    /// `neighbors` must hold one list per layer `0..=level` (at least one).
    pub fn push(&self, vector: Box<[f32]>, neighbors: Vec<Vec<NodeId>>) -> Arc<Node> {
        debug_assert!(!neighbors.is_empty(), "a node has at least layer 0");
        let lists: Box<[RwLock<Vec<NodeId>>]> = neighbors.into_iter().map(RwLock::new).collect();
        let mut nodes = self.nodes.write();
        let node = Arc::new(Node {
            id: nodes.len() as NodeId,
            vector,
            neighbors: lists,
            deleted: AtomicBool::new(false),
        });
        nodes.push(Arc::clone(&node));
        self.live.fetch_add(1, Ordering::AcqRel);
        node
    }

    /// Returns the node with the given id, tombstoned or not.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<Arc<Node>> {
        let idx = usize::try_from(id).ok()?;
        self.nodes.read().get(idx).cloned()
    }

    /// Number of nodes ever allocated (live and tombstoned).
    pub fn allocated(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of non-tombstoned nodes.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Tombstones a node. Fails with `NodeNotFound` if the id is unknown or already tombstoned.
    pub fn tombstone(&self, id: NodeId) -> Result<()> {
        let node = self.get(id).ok_or(MemoryError::NodeNotFound(id))?;
        if node.deleted.swap(true, Ordering::AcqRel) {
            return Err(MemoryError::NodeNotFound(id));
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// Live node with the highest level, lowest id first on ties.
    pub fn highest_live(&self) -> Option<Arc<Node>> {
        let nodes = self.nodes.read();
        let mut best: Option<&Arc<Node>> = None;
        for node in nodes.iter().filter(|n| !n.is_deleted()) {
            if best.map_or(true, |b| node.level() > b.level()) {
                best = Some(node);
            }
        }
        best.cloned()
    }
}
