//! Volatile record store.
//!
//! All tables live behind one `parking_lot::RwLock`. Lookups take the read lock;
//! mutations take the write lock for the duration of a single table edit.

use crate::hnsw::NodeId;
use crate::record::{MemoryRecord, RecordId, Session, SessionId};
use crate::store::{RecordStore, StoreResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<SessionId, Session>,
    records: HashMap<RecordId, MemoryRecord>,
    /// Reverse link: index node → record.
    by_node: HashMap<NodeId, RecordId>,
}

impl Tables {
    fn remove_record(&mut self, id: RecordId) -> Option<MemoryRecord> {
        let record = self.records.remove(&id)?;
        if let Some(node_id) = record.node_id {
            if self.by_node.get(&node_id) == Some(&id) {
                self.by_node.remove(&node_id);
            }
        }
        if let Some(session) = self.sessions.get_mut(&record.session_id) {
            session.record_ids.retain(|rid| *rid != id);
        }
        Some(record)
    }
}

/// Thread-safe in-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.tables.read().records.len()
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.tables.read().sessions.len()
    }

    /// Every stored session, oldest first.
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.tables.read().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }
}

impl RecordStore for InMemoryRecordStore {
    fn create_session(&self, session: Session) -> StoreResult<SessionId> {
        let id = session.id;
        self.tables.write().sessions.insert(id, session);
        Ok(id)
    }

    fn get_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        Ok(self.tables.read().sessions.get(&id).cloned())
    }

    fn touch_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        match tables.sessions.get_mut(&id) {
            Some(session) => {
                if at > session.last_accessed_at {
                    session.last_accessed_at = at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        let mut tables = self.tables.write();
        let Some(session) = tables.sessions.remove(&id) else {
            return Ok(None);
        };
        let orphans: Vec<RecordId> = tables
            .records
            .values()
            .filter(|r| r.session_id == id)
            .map(|r| r.id)
            .collect();
        for record_id in orphans {
            tables.remove_record(record_id);
        }
        Ok(Some(session))
    }

    fn put(&self, record: MemoryRecord) -> StoreResult<RecordId> {
        let id = record.id;
        let mut tables = self.tables.write();
        if let Some(session) = tables.sessions.get_mut(&record.session_id) {
            if !session.record_ids.contains(&id) {
                session.record_ids.push(id);
            }
        }
        if let Some(node_id) = record.node_id {
            tables.by_node.insert(node_id, id);
        }
        // Overwrite: drop the previous version's reverse link if it moved.
        if let Some(old) = tables.records.insert(id, record) {
            if let Some(old_node) = old.node_id {
                let still_linked = tables.records.get(&id).and_then(|r| r.node_id) == Some(old_node);
                if !still_linked && tables.by_node.get(&old_node) == Some(&id) {
                    tables.by_node.remove(&old_node);
                }
            }
        }
        Ok(id)
    }

    fn get(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        Ok(self.tables.read().records.get(&id).cloned())
    }

    fn link_vector(&self, id: RecordId, node_id: NodeId) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let Some(record) = tables.records.get_mut(&id) else {
            return Ok(false);
        };
        let previous = record.node_id.replace(node_id);
        if let Some(old) = previous {
            if tables.by_node.get(&old) == Some(&id) {
                tables.by_node.remove(&old);
            }
        }
        tables.by_node.insert(node_id, id);
        Ok(true)
    }

    fn resolve_many(&self, node_ids: &[NodeId]) -> StoreResult<Vec<MemoryRecord>> {
        let tables = self.tables.read();
        Ok(node_ids
            .iter()
            .filter_map(|node_id| {
                let record_id = tables.by_node.get(node_id)?;
                tables.records.get(record_id).cloned()
            })
            .collect())
    }

    fn delete(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        Ok(self.tables.write().remove_record(id))
    }

    fn records(&self) -> StoreResult<Vec<MemoryRecord>> {
        let mut records: Vec<MemoryRecord> =
            self.tables.read().records.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}
