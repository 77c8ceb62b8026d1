//! Retry with exponential backoff for record store calls.
//!
//! [`RetryingStore`] wraps any [`RecordStore`] and retries operations that fail with a
//! transient [`StoreError`](crate::error::StoreError). Permanent errors are returned immediately.

use crate::config::{
    RETRY_DEFAULT_BACKOFF_FACTOR, RETRY_DEFAULT_INITIAL_DELAY_MS, RETRY_DEFAULT_MAX_DELAY_MS,
    RETRY_DEFAULT_MAX_RETRIES,
};
use crate::hnsw::NodeId;
use crate::record::{MemoryRecord, RecordId, Session, SessionId};
use crate::store::{RecordStore, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: RETRY_DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(RETRY_DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(RETRY_DEFAULT_MAX_DELAY_MS),
            backoff_factor: RETRY_DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Config with `max_retries` and no delay between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.backoff_factor.max(1.0)).min(self.max_delay)
    }
}

/// A [`RecordStore`] wrapper that retries transient failures.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: RecordStore> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(&self, op: &'static str, mut f: impl FnMut(&S) -> StoreResult<T>) -> StoreResult<T> {
        let mut attempt = 0;
        let mut delay = self.config.initial_delay;
        loop {
            match f(&self.inner) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        op,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    delay = self.config.next_delay(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: RecordStore> RecordStore for RetryingStore<S> {
    fn create_session(&self, session: Session) -> StoreResult<SessionId> {
        self.run("create_session", |s| s.create_session(session.clone()))
    }

    fn get_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        self.run("get_session", |s| s.get_session(id))
    }

    fn touch_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<bool> {
        self.run("touch_session", |s| s.touch_session(id, at))
    }

    fn delete_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        self.run("delete_session", |s| s.delete_session(id))
    }

    fn put(&self, record: MemoryRecord) -> StoreResult<RecordId> {
        self.run("put", |s| s.put(record.clone()))
    }

    fn get(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        self.run("get", |s| s.get(id))
    }

    fn link_vector(&self, id: RecordId, node_id: NodeId) -> StoreResult<bool> {
        self.run("link_vector", |s| s.link_vector(id, node_id))
    }

    fn resolve_many(&self, node_ids: &[NodeId]) -> StoreResult<Vec<MemoryRecord>> {
        self.run("resolve_many", |s| s.resolve_many(node_ids))
    }

    fn delete(&self, id: RecordId) -> StoreResult<Option<MemoryRecord>> {
        self.run("delete", |s| s.delete(id))
    }

    fn records(&self) -> StoreResult<Vec<MemoryRecord>> {
        self.run("records", |s| s.records())
    }
}
