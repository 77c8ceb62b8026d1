//! Memory service: sessions, remember, recall and forget over an HNSW index and a
//! record store.
//!
//! The index owns vectors; the store owns records. A record points at its index node
//! by id. Every operation takes `&self`, so one service is shared across threads
//! behind an `Arc`.

use crate::config::{DEFAULT_DIMENSION, DEFAULT_OVER_FETCH_FACTOR, MAX_DIMENSION, MAX_K};
use crate::embed::Embedder;
use crate::error::{MemoryError, Result};
use crate::hnsw::{HnswConfig, HnswIndex, NodeId};
use crate::record::{MemoryRecord, RecordId, Recollection, Session, SessionId};
use crate::store::RecordStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runtime configuration of a [`MemoryService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Embedding dimensionality accepted by the index.
    pub dimension: usize,
    pub hnsw: HnswConfig,
    /// Recall searches `k * over_fetch_factor` candidates before filtering.
    pub over_fetch_factor: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            hnsw: HnswConfig::default(),
            over_fetch_factor: DEFAULT_OVER_FETCH_FACTOR,
        }
    }
}

impl MemoryConfig {
    /// Default configuration for `dimension`-length vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(MemoryError::InvalidConfig(format!(
                "dimension must be between 1 and {MAX_DIMENSION}, got {}",
                self.dimension
            )));
        }
        if self.over_fetch_factor == 0 {
            return Err(MemoryError::InvalidConfig(
                "over_fetch_factor must be >= 1".into(),
            ));
        }
        self.hnsw.validate()
    }
}

/// Outcome of rebuilding the index from stored records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    /// Records inserted into the index and linked.
    pub indexed: usize,
    /// Records left pending (no embedding, or wrong dimension).
    pub pending: usize,
    /// Indexed records whose stored node id changed and had to be relinked.
    pub relinked: usize,
}

/// Session-scoped semantic memory.
#[derive(Debug)]
pub struct MemoryService<S> {
    store: S,
    index: HnswIndex,
    over_fetch_factor: usize,
    last_rebuild: Option<RebuildStats>,
}

impl<S: RecordStore> MemoryService<S> {
    /// Service with an empty index. Records already in `store` are not indexed; use
    /// [`open`](Self::open) for that.
    pub fn new(store: S, config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        let index = HnswIndex::new(config.dimension, config.hnsw)?;
        Ok(Self::with_index(store, index, config.over_fetch_factor))
    }

    /// Service over a caller-built index (custom metric, fixed seed).
    pub fn with_index(store: S, index: HnswIndex, over_fetch_factor: usize) -> Self {
        Self {
            store,
            index,
            over_fetch_factor: over_fetch_factor.max(1),
            last_rebuild: None,
        }
    }

    /// Service whose index is rebuilt from the embeddings kept in `store`.
    ///
    /// Every record with a matching embedding is re-inserted and relinked to its new
    /// node. Records with no embedding or the wrong dimension stay pending.
    pub fn open(store: S, config: MemoryConfig) -> Result<Self> {
        let mut service = Self::new(store, config)?;
        let stats = service.rebuild()?;
        service.last_rebuild = Some(stats);
        Ok(service)
    }

    fn rebuild(&self) -> Result<RebuildStats> {
        let mut stats = RebuildStats::default();
        let dimension = self.index.dimension();
        for record in self.store.records()? {
            if record.embedding.len() != dimension {
                if record.node_id.is_some() {
                    // Node ids from a previous index mean nothing now.
                    self.store.put(MemoryRecord {
                        node_id: None,
                        ..record
                    })?;
                }
                stats.pending += 1;
                continue;
            }
            let node_id = self.index.insert(&record.embedding)?;
            // A fresh arena hands out ids in record order, so most links still hold.
            if !self.is_linked(&record, node_id)? {
                self.store.link_vector(record.id, node_id)?;
                stats.relinked += 1;
            }
            stats.indexed += 1;
            if stats.indexed % 10_000 == 0 {
                tracing::debug!(indexed = stats.indexed, "Rebuilding index");
            }
        }
        if stats.pending > 0 {
            tracing::warn!(
                pending = stats.pending,
                dimension,
                "Records left out of the index"
            );
        }
        tracing::info!(
            indexed = stats.indexed,
            pending = stats.pending,
            relinked = stats.relinked,
            "Index rebuilt from record store"
        );
        Ok(stats)
    }

    fn is_linked(&self, record: &MemoryRecord, node_id: NodeId) -> Result<bool> {
        if record.node_id != Some(node_id) {
            return Ok(false);
        }
        let resolved = self.store.resolve_many(&[node_id])?;
        Ok(resolved.first().map(|r| r.id) == Some(record.id))
    }

    /// Stats of the rebuild done by [`open`](Self::open); `None` for other constructors.
    pub fn last_rebuild(&self) -> Option<RebuildStats> {
        self.last_rebuild
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &HnswIndex {
        &self.index
    }

    /// Number of live nodes in the index.
    pub fn indexed_count(&self) -> usize {
        self.index.count()
    }

    pub fn start_session(&self, user_id: impl Into<String>) -> Result<SessionId> {
        let session = Session::new(user_id);
        let user_id = session.user_id.clone();
        let id = self.store.create_session(session)?;
        tracing::info!(session_id = %id, user_id = %user_id, "Session started");
        Ok(id)
    }

    pub fn session(&self, id: SessionId) -> Result<Session> {
        self.store
            .get_session(id)?
            .ok_or(MemoryError::SessionNotFound(id))
    }

    /// Records of a session in the order they were remembered.
    pub fn session_records(&self, id: SessionId) -> Result<Vec<MemoryRecord>> {
        let session = self.session(id)?;
        let mut records = Vec::with_capacity(session.record_ids.len());
        for record_id in session.record_ids {
            if let Some(record) = self.store.get(record_id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Forgets every record of a session, then deletes the session.
    ///
    /// Returns the number of records forgotten.
    pub fn forget_session(&self, id: SessionId) -> Result<usize> {
        let session = self.session(id)?;
        let mut forgotten = 0;
        for record_id in session.record_ids {
            match self.forget(record_id) {
                Ok(_) => forgotten += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        self.store.delete_session(id)?;
        tracing::info!(session_id = %id, forgotten, "Session forgotten");
        Ok(forgotten)
    }

    pub fn get(&self, id: RecordId) -> Result<MemoryRecord> {
        self.store.get(id)?.ok_or(MemoryError::RecordNotFound(id))
    }

    /// Stores `content` in a session and indexes `vector` for it.
    ///
    /// On a dimension mismatch the record stays stored but pending, and the call fails
    /// with [`MemoryError::PartialFailure`]. If the record cannot be linked, the new
    /// node is tombstoned and the store error is returned.
    pub fn remember(
        &self,
        session_id: SessionId,
        content: impl Into<String>,
        vector: &[f32],
    ) -> Result<RecordId> {
        if self.store.get_session(session_id)?.is_none() {
            return Err(MemoryError::SessionNotFound(session_id));
        }
        let record = MemoryRecord::new(session_id, content, vector.to_vec());
        let record_id = self.store.put(record)?;

        let node_id = match self.index.insert(vector) {
            Ok(node_id) => node_id,
            Err(source) => {
                tracing::warn!(
                    record_id = %record_id,
                    error = %source,
                    "Memory stored but not indexed"
                );
                return Err(MemoryError::PartialFailure {
                    record_id,
                    source: Box::new(source),
                });
            }
        };

        match self.store.link_vector(record_id, node_id) {
            Ok(true) => {}
            Ok(false) => {
                self.discard_node(node_id);
                return Err(MemoryError::RecordNotFound(record_id));
            }
            Err(e) => {
                self.discard_node(node_id);
                return Err(e.into());
            }
        }

        self.store.touch_session(session_id, Utc::now())?;
        tracing::info!(
            record_id = %record_id,
            session_id = %session_id,
            node_id,
            "Memory stored"
        );
        Ok(record_id)
    }

    fn discard_node(&self, node_id: NodeId) {
        if let Err(e) = self.index.remove(node_id) {
            tracing::warn!(node_id, error = %e, "Failed to tombstone unlinked node");
        }
    }

    /// The `k` records closest to `query`, nearest first.
    ///
    /// With `Some(session_id)` only that session's records are returned. `k` is
    /// capped at [`MAX_K`].
    pub fn recall(
        &self,
        session_id: Option<SessionId>,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Recollection>> {
        if let Some(id) = session_id {
            if self.store.get_session(id)?.is_none() {
                return Err(MemoryError::SessionNotFound(id));
            }
        }
        let k = k.min(MAX_K);
        let fetch = k.saturating_mul(self.over_fetch_factor).max(k);
        let hits = self.index.search(query, fetch)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let node_ids: Vec<NodeId> = hits.iter().map(|h| h.id).collect();
        let distances: HashMap<NodeId, f32> = hits.iter().map(|h| (h.id, h.distance)).collect();
        let mut recollections: Vec<Recollection> = self
            .store
            .resolve_many(&node_ids)?
            .into_iter()
            .filter(|r| session_id.map_or(true, |sid| r.session_id == sid))
            .filter_map(|record| {
                let distance = *distances.get(&record.node_id?)?;
                Some(Recollection { record, distance })
            })
            .collect();
        recollections.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.record.node_id.cmp(&b.record.node_id))
        });
        recollections.truncate(k);

        if let Some(id) = session_id {
            self.store.touch_session(id, Utc::now())?;
        }
        tracing::debug!(
            session_id = ?session_id,
            k,
            candidates = hits.len(),
            returned = recollections.len(),
            "Recall"
        );
        Ok(recollections)
    }

    /// Deletes a record and tombstones its index node.
    pub fn forget(&self, record_id: RecordId) -> Result<MemoryRecord> {
        let record = self
            .store
            .delete(record_id)?
            .ok_or(MemoryError::RecordNotFound(record_id))?;
        if let Some(node_id) = record.node_id {
            match self.index.remove(node_id) {
                Ok(()) => {}
                Err(MemoryError::NodeNotFound(_)) => {
                    tracing::warn!(record_id = %record_id, node_id, "Linked node already removed");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(record_id = %record_id, "Memory forgotten");
        Ok(record)
    }

    /// [`remember`](Self::remember) with the vector computed by `embedder`.
    pub fn remember_text(
        &self,
        session_id: SessionId,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<RecordId> {
        let vector = self.embed(embedder, text)?;
        self.remember(session_id, text, &vector)
    }

    /// [`recall`](Self::recall) with the query vector computed by `embedder`.
    pub fn recall_text(
        &self,
        session_id: Option<SessionId>,
        text: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<Recollection>> {
        let vector = self.embed(embedder, text)?;
        self.recall(session_id, &vector, k)
    }

    /// Embeds `text`, refusing embedders built for another dimension before calling
    /// them.
    fn embed(&self, embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
        let expected = self.index.dimension();
        if embedder.dimension() != expected {
            return Err(MemoryError::DimensionMismatch {
                expected,
                actual: embedder.dimension(),
            });
        }
        embedder
            .embed(text)
            .map_err(|e| MemoryError::Embedding(e.to_string()))
    }
}
