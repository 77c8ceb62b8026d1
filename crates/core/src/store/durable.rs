//! Durable record store: in-memory tables backed by the write-ahead log.
//!
//! Mutations are logged first, then applied. A single mutation gate keeps the log order
//! identical to the apply order, so replay reproduces the exact state. Reads never
//! touch the gate.

use crate::hnsw::NodeId;
use crate::record::{MemoryRecord, RecordId, Session, SessionId};
use crate::store::memory::InMemoryRecordStore;
use crate::store::wal::{ReplayStats, SyncWriteAheadLog, WalEntry};
use crate::store::{RecordStore, StoreResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;

/// [`RecordStore`] that survives restarts by replaying its log on open.
#[derive(Debug)]
pub struct WalRecordStore {
    state: InMemoryRecordStore,
    wal: SyncWriteAheadLog,
    gate: Mutex<()>,
    replay: ReplayStats,
}

impl WalRecordStore {
    /// Opens the store in `data_dir`, creating it if needed, and replays the log.
    pub fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let wal = SyncWriteAheadLog::open(data_dir)?;
        let (entries, replay) = wal.replay()?;
        if replay.has_torn_tail() {
            // New frames must not land behind bytes the next replay stops at.
            tracing::warn!(
                path = %wal.path().display(),
                valid_len = replay.valid_len,
                "Dropping torn WAL tail"
            );
            wal.truncate_to(replay.valid_len)?;
        }
        let state = InMemoryRecordStore::new();
        for entry in entries {
            apply(&state, entry)?;
        }
        tracing::info!(
            path = %wal.path().display(),
            entries = replay.success,
            skipped = replay.skipped,
            crc_errors = replay.crc_errors,
            truncated = replay.truncated,
            records = state.record_count(),
            sessions = state.session_count(),
            "Record store replayed"
        );
        Ok(Self {
            state,
            wal,
            gate: Mutex::new(()),
            replay,
        })
    }

    /// Statistics of the replay performed by [`open`](Self::open).
    pub fn replay_stats(&self) -> &ReplayStats {
        &self.replay
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.state.record_count()
    }

    /// Rewrites the log as the minimal entry sequence for the current state.
    ///
    /// Returns the number of entries written.
    pub fn compact(&self) -> StoreResult<usize> {
        let _gate = self.gate.lock();
        let mut entries: Vec<WalEntry> = self
            .state
            .sessions()
            .into_iter()
            .map(WalEntry::CreateSession)
            .collect();
        entries.extend(self.state.records()?.into_iter().map(WalEntry::PutRecord));
        self.wal.rewrite(&entries)?;
        tracing::info!(entries = entries.len(), "Record store compacted");
        Ok(entries.len())
    }

    fn log_and_apply(&self, entry: WalEntry) -> StoreResult<()> {
        self.wal.append(&entry)?;
        apply(&self.state, entry)
    }
}

fn apply(state: &InMemoryRecordStore, entry: WalEntry) -> StoreResult<()> {
    match entry {
        WalEntry::CreateSession(session) => {
            state.create_session(session)?;
        }
        WalEntry::TouchSession { id, at } => {
            state.touch_session(id, at)?;
        }
        WalEntry::DeleteSession { id } => {
            state.delete_session(id)?;
        }
        WalEntry::PutRecord(record) => {
            state.put(record)?;
        }
        WalEntry::LinkVector { record_id, node_id } => {
            state.link_vector(record_id, node_id)?;
        }
        WalEntry::DeleteRecord { id } => {
            state.delete(id)?;
        }
    }
    Ok(())
}

impl RecordStore for WalRecordStore {
    fn create_session(&self, session: Session) -> StoreResult<SessionId> {
        let id = session.id;
        let _gate = self.gate.lock();
        self.log_and_apply(WalEntry::CreateSession(session))?;
        Ok(id)
    }

    fn get_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        self.state.get_session(id)
    }

    fn touch_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<bool> {
        let _gate = self.gate.lock();
        if self.state.get_session(id)?.is_none() {
            return Ok(false);
        }
        self.log_and_apply(WalEntry::TouchSession { id, at })?;
        Ok(true)
    }

    fn delete_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        let _gate = self.gate.lock();
        let Some(session) = self.state.get_session(id)? else {
            return Ok(None);
        };
        self.log_and_apply(WalEntry::DeleteSession { id })?;
        Ok(Some(session))
    }

    fn put(&self, record: MemoryRecord) -> StoreResult<RecordId> {
        let id = record.id;
        let _gate = self.gate.lock();
        self.log_and_apply(WalEntry::PutRecord(record))?;
        Ok(id)
    }

    fn get(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        self.state.get(id)
    }

    fn link_vector(&self, id: RecordId, node_id: NodeId) -> StoreResult<bool> {
        let _gate = self.gate.lock();
        if self.state.get(id)?.is_none() {
            return Ok(false);
        }
        self.log_and_apply(WalEntry::LinkVector {
            record_id: id,
            node_id,
        })?;
        Ok(true)
    }

    fn resolve_many(&self, node_ids: &[NodeId]) -> StoreResult<Vec<MemoryRecord>> {
        self.state.resolve_many(node_ids)
    }

    fn delete(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        let _gate = self.gate.lock();
        let Some(record) = self.state.get(id)? else {
            return Ok(None);
        };
        self.log_and_apply(WalEntry::DeleteRecord { id })?;
        Ok(Some(record))
    }

    fn records(&self) -> StoreResult<Vec<MemoryRecord>> {
        self.state.records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (session, kept, dropped) = {
            let store = WalRecordStore::open(dir.path()).unwrap();
            let session = store.create_session(Session::new("alice")).unwrap();
            let kept = store
                .put(MemoryRecord::new(session, "kept", vec![0.5, 0.5]))
                .unwrap();
            let dropped = store.put(MemoryRecord::new(session, "dropped", vec![])).unwrap();
            assert!(store.link_vector(kept, 3).unwrap());
            store.delete(dropped).unwrap();
            (session, kept, dropped)
        };

        let store = WalRecordStore::open(dir.path()).unwrap();
        assert_eq!(store.replay_stats().success, 5);
        let record = store.get(kept).unwrap().unwrap();
        assert_eq!(record.content, "kept");
        assert_eq!(record.node_id, Some(3));
        assert_eq!(record.embedding, vec![0.5, 0.5]);
        assert!(store.get(dropped).unwrap().is_none());
        assert_eq!(
            store.get_session(session).unwrap().unwrap().record_ids,
            vec![kept]
        );
        assert_eq!(store.resolve_many(&[3]).unwrap()[0].id, kept);
    }

    #[test]
    fn test_noop_mutations_are_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalRecordStore::open(dir.path()).unwrap();
        let missing = uuid::Uuid::new_v4();
        assert!(!store.link_vector(missing, 1).unwrap());
        assert!(store.delete(missing).unwrap().is_none());
        assert!(!store.touch_session(missing, Utc::now()).unwrap());
        assert!(store.delete_session(missing).unwrap().is_none());
        drop(store);

        let store = WalRecordStore::open(dir.path()).unwrap();
        assert_eq!(store.replay_stats().success, 0);
    }

    #[test]
    fn test_writes_after_torn_tail_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("records.wal");
        let session = {
            let store = WalRecordStore::open(dir.path()).unwrap();
            let session = store.create_session(Session::new("alice")).unwrap();
            store
                .put(MemoryRecord::new(session, "torn", vec![1.0]))
                .unwrap();
            session
        };
        let data = std::fs::read(&wal_path).unwrap();
        std::fs::write(&wal_path, &data[..data.len() - 3]).unwrap();

        let after = {
            let store = WalRecordStore::open(dir.path()).unwrap();
            assert!(store.replay_stats().truncated);
            assert_eq!(store.record_count(), 0);
            store
                .put(MemoryRecord::new(session, "after restart", vec![2.0]))
                .unwrap()
        };

        let store = WalRecordStore::open(dir.path()).unwrap();
        let stats = store.replay_stats();
        assert!(!stats.has_torn_tail(), "{stats:?}");
        assert_eq!(stats.success, 2);
        assert_eq!(store.get(after).unwrap().unwrap().content, "after restart");
        assert_eq!(
            store.get_session(session).unwrap().unwrap().record_ids,
            vec![after]
        );
    }

    #[test]
    fn test_writes_after_crc_mismatch_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("records.wal");
        let session = {
            let store = WalRecordStore::open(dir.path()).unwrap();
            let session = store.create_session(Session::new("bob")).unwrap();
            store
                .put(MemoryRecord::new(session, "garbled", vec![1.0]))
                .unwrap();
            session
        };
        let mut data = std::fs::read(&wal_path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        std::fs::write(&wal_path, &data).unwrap();

        let after = {
            let store = WalRecordStore::open(dir.path()).unwrap();
            assert_eq!(store.replay_stats().crc_errors, 1);
            store
                .put(MemoryRecord::new(session, "after restart", vec![2.0]))
                .unwrap()
        };

        let store = WalRecordStore::open(dir.path()).unwrap();
        assert_eq!(store.replay_stats().crc_errors, 0);
        assert_eq!(store.record_count(), 1);
        assert!(store.get(after).unwrap().is_some());
    }

    #[test]
    fn test_compact_shrinks_log_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let session;
        let survivor;
        {
            let store = WalRecordStore::open(dir.path()).unwrap();
            session = store.create_session(Session::new("alice")).unwrap();
            for i in 0..10 {
                let id = store
                    .put(MemoryRecord::new(session, format!("note {i}"), vec![i as f32]))
                    .unwrap();
                store.link_vector(id, i).unwrap();
                store.touch_session(session, Utc::now()).unwrap();
                if i != 7 {
                    store.delete(id).unwrap();
                }
            }
            survivor = store.resolve_many(&[7]).unwrap()[0].id;
            let before = std::fs::metadata(dir.path().join("records.wal"))
                .unwrap()
                .len();
            assert_eq!(store.compact().unwrap(), 2);
            let after = std::fs::metadata(dir.path().join("records.wal"))
                .unwrap()
                .len();
            assert!(after < before, "compaction grew the log: {before} -> {after}");

            // Writes after compaction land in the new log.
            store.put(MemoryRecord::new(session, "late", vec![])).unwrap();
        }

        let store = WalRecordStore::open(dir.path()).unwrap();
        assert_eq!(store.replay_stats().success, 3);
        assert_eq!(store.record_count(), 2);
        let history = store.get_session(session).unwrap().unwrap().record_ids;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], survivor);
        assert_eq!(store.get(survivor).unwrap().unwrap().node_id, Some(7));
    }
}
