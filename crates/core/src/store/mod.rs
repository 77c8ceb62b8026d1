//! Record store boundary: sessions and memory records.
//!
//! The memory service talks to persistence only through [`RecordStore`]. Backends:
//! [`InMemoryRecordStore`] (volatile), [`WalRecordStore`] (write-ahead logged, replayed
//! on open) and [`RetryingStore`], a decorator that retries transient failures.

/// Write-ahead-logged record store with replay and compaction.
pub mod durable;
/// Volatile in-memory record store.
pub mod memory;
/// Retry decorator with exponential backoff.
pub mod retry;
/// Write-Ahead Log with CRC32 checksums.
pub mod wal;

pub use crate::error::StoreError;
pub use durable::WalRecordStore;
pub use memory::InMemoryRecordStore;
pub use retry::{RetryConfig, RetryingStore};
pub use wal::{ReplayStats, SyncWriteAheadLog, WalEntry};

use crate::hnsw::NodeId;
use crate::record::{MemoryRecord, RecordId, Session, SessionId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence boundary for sessions and records.
///
/// Implementations must be safe to call from many threads at once. The core never
/// interprets a [`StoreError`]; it hands it back to the caller unchanged.
pub trait RecordStore: Send + Sync {
    /// Stores a new session.
    fn create_session(&self, session: Session) -> StoreResult<SessionId>;

    /// Looks up a session.
    fn get_session(&self, id: SessionId) -> StoreResult<Option<Session>>;

    /// Sets a session's last access time. Returns `false` for unknown sessions.
    fn touch_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Deletes a session together with any records still attached to it.
    fn delete_session(&self, id: SessionId) -> StoreResult<Option<Session>>;

    /// Stores a record and appends it to its session's history.
    fn put(&self, record: MemoryRecord) -> StoreResult<RecordId>;

    /// Looks up a record.
    fn get(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>>;

    /// Links a record to an index node. Returns `false` for unknown records.
    fn link_vector(&self, id: RecordId, node_id: NodeId) -> StoreResult<bool>;

    /// Records linked to `node_ids`, in input order. Ids without a live record are skipped.
    fn resolve_many(&self, node_ids: &[NodeId]) -> StoreResult<Vec<MemoryRecord>>;

    /// Deletes a record, returning it if it existed.
    fn delete(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>>;

    /// Every stored record, oldest first.
    fn records(&self) -> StoreResult<Vec<MemoryRecord>>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn create_session(&self, session: Session) -> StoreResult<SessionId> {
        (**self).create_session(session)
    }

    fn get_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        (**self).get_session(id)
    }

    fn touch_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<bool> {
        (**self).touch_session(id, at)
    }

    fn delete_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        (**self).delete_session(id)
    }

    fn put(&self, record: MemoryRecord) -> StoreResult<RecordId> {
        (**self).put(record)
    }

    fn get(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        (**self).get(id)
    }

    fn link_vector(&self, id: RecordId, node_id: NodeId) -> StoreResult<bool> {
        (**self).link_vector(id, node_id)
    }

    fn resolve_many(&self, node_ids: &[NodeId]) -> StoreResult<Vec<MemoryRecord>> {
        (**self).resolve_many(node_ids)
    }

    fn delete(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        (**self).delete(id)
    }

    fn records(&self) -> StoreResult<Vec<MemoryRecord>> {
        (**self).records()
    }
}
