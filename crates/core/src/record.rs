//! Core record types for memoria.
//!
//! A [`Session`] is one conversation owned by a user; a [`MemoryRecord`] is one piece
//! of remembered content inside a session. The link from a record to its index node
//! is a plain id: the index owns the vector, the record only points at it.

use crate::hnsw::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record identifier (UUID v4).
pub type RecordId = Uuid;

/// Session identifier (UUID v4).
pub type SessionId = Uuid;

/// A conversation owned by a user, with its records in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Record ids in insertion order.
    pub record_ids: Vec<RecordId>,
}

impl Session {
    /// Creates an empty session with a random UUID, stamped now.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            created_at: now,
            last_accessed_at: now,
            record_ids: Vec::new(),
        }
    }
}

/// One remembered piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub session_id: SessionId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Index node holding this record's vector. `None` while pending.
    pub node_id: Option<NodeId>,
    /// The vector as received, kept so the index can be rebuilt from the store.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl MemoryRecord {
    /// Creates a pending record with a random UUID, stamped now.
    pub fn new(session_id: SessionId, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            content: content.into(),
            created_at: Utc::now(),
            node_id: None,
            embedding,
        }
    }

    /// Returns `true` until the record is linked to an index node.
    pub fn is_pending(&self) -> bool {
        self.node_id.is_none()
    }
}

/// A recalled record with its distance to the query. Lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recollection {
    pub record: MemoryRecord,
    pub distance: f32,
}
