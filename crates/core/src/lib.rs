//! # memoria-core
//!
//! Session-scoped semantic memory for conversational agents: an in-process HNSW
//! approximate nearest neighbor index paired with a pluggable record store.
//!
//! Synchronous and embeddable; no async runtime. Share a [`MemoryService`] across
//! threads with `Arc`.

/// Global configuration constants: limits, defaults, and tuning parameters.
pub mod config;
/// Embedding boundary: the `Embedder` capability and its error type.
pub mod embed;
/// Error types: `MemoryError` for the index and service, `StoreError` for stores.
pub mod error;
/// HNSW approximate nearest neighbor index: graph structure, search, insertion, and distance metrics.
pub mod hnsw;
/// Core record types: `Session`, `MemoryRecord`, `Recollection`.
pub mod record;
/// Memory service: sessions, remember, recall and forget.
pub mod service;
/// Record store boundary and its in-memory, write-ahead-logged and retrying backends.
pub mod store;

pub use embed::{EmbedError, Embedder};
pub use error::{MemoryError, Result, StoreError};
pub use hnsw::{DistanceMetric, HnswConfig, HnswIndex, Metric, Neighbor, NodeId};
pub use record::{MemoryRecord, RecordId, Recollection, Session, SessionId};
pub use service::{MemoryConfig, MemoryService, RebuildStats};
pub use store::{
    InMemoryRecordStore, RecordStore, RetryConfig, RetryingStore, WalRecordStore,
};
