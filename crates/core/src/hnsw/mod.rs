//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! This module implements the HNSW algorithm for online insertion and fast
//! approximate k-NN search over f32 embeddings. The graph is an arena of nodes
//! indexed by integer id; edges are plain ids, never owning pointers.
//!
//! Concurrency: searches and inserts run in parallel through `&HnswIndex`.
//! A node is published fully formed, neighbor lists are rewired under per-list
//! locks, removal is an atomic tombstone flip, and the entry point sits in its
//! own lock.

/// Distance metrics: the `Metric` capability plus built-in cosine and euclidean.
pub mod distance;
/// HNSW graph structure, configuration, entry point and removal.
pub mod graph;
/// HNSW insertion algorithm with bidirectional connections and heuristic pruning.
pub mod insert;
/// Node arena: id allocation, storage and neighbor-list primitives.
pub mod node;
/// HNSW search: greedy descent, single-layer search, multi-layer KNN and filtered search.
pub mod search;
/// Generation-based visited set for efficient graph traversal.
pub mod visited;

pub use distance::{checked_distance, DistanceMetric, Metric};
pub use graph::{EntryPoint, HnswConfig, HnswIndex, Neighbor};
pub use node::{Node, NodeId, NodeStore};
