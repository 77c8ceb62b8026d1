//! Error types for memoria.
//!
//! [`MemoryError`] is returned by the index and the memory service.
//! [`StoreError`] is the opaque failure type of the [`RecordStore`](crate::store::RecordStore)
//! boundary; the service wraps it in [`MemoryError::Persistence`] without interpreting it.

use crate::hnsw::NodeId;
use crate::record::{RecordId, SessionId};
use std::io;
use thiserror::Error;

/// Result type alias for memoria operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors surfaced by the index and the memory service.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A vector's length differs from the index dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Unknown or already tombstoned node.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// Unknown record.
    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    /// Unknown session.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The record was persisted but could not be indexed. It is retrievable by id
    /// but invisible to recall.
    #[error("record {record_id} stored but not indexed: {source}")]
    PartialFailure {
        record_id: RecordId,
        #[source]
        source: Box<MemoryError>,
    },

    /// Failure reported by the record store boundary.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Failure reported by the embedding boundary.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Rejected construction parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MemoryError {
    /// Returns `true` for the `*NotFound` variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MemoryError::NodeNotFound(_)
                | MemoryError::RecordNotFound(_)
                | MemoryError::SessionNotFound(_)
        )
    }
}

/// Errors reported by a record store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A failure that may succeed when retried (lock timeout, dropped connection).
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Underlying I/O failure.
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("store codec error: {0}")]
    Codec(String),

    /// Persistent data failed an integrity check.
    #[error("store data corrupted: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns `true` if the operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            StoreError::Codec(_) | StoreError::Corrupt(_) => false,
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}
