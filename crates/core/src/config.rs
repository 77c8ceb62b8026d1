//! Global configuration constants for memoria.
//!
//! All tuning parameters, input validation limits, and driver defaults are defined here.
//! These are compile-time constants; runtime configuration is handled by
//! [`HnswConfig`](crate::hnsw::HnswConfig), [`MemoryConfig`](crate::service::MemoryConfig)
//! and the CLI arguments in `memoria-cli`.

/// Default number of bidirectional links per HNSW node on layers above 0.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64. Default: 16.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default ef parameter during HNSW index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Controls the size of the dynamic candidate list during query.
/// Higher values improve recall at the cost of latency. Always raised to at least `k`.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 50;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_DEFAULT_MAX_LAYERS: usize = 16;

/// Upper bound on the ef growth factor when a search comes back short of `k` live results.
pub const HNSW_MAX_EF_GROWTH: usize = 4;

/// Default candidate over-fetch factor for recall.
///
/// Recall searches `k * factor` index candidates so that tombstoned, pending or
/// cross-session hits can be dropped without returning fewer than `k` records.
pub const DEFAULT_OVER_FETCH_FACTOR: usize = 4;

/// Maximum allowed embedding dimension.
pub const MAX_DIMENSION: usize = 4096;

/// Maximum number of results (`k`) per recall.
pub const MAX_K: usize = 10_000;

/// Embedding dimension used by the CLI driver when none is given.
pub const DEFAULT_DIMENSION: usize = 256;

/// Default directory for the record store write-ahead log.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// File name of the record store write-ahead log inside the data directory.
pub const WAL_FILE_NAME: &str = "records.wal";

/// Default number of retries for transient record store failures.
pub const RETRY_DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay (milliseconds) before the first retry.
pub const RETRY_DEFAULT_INITIAL_DELAY_MS: u64 = 50;

/// Default upper bound (milliseconds) on the delay between retries.
pub const RETRY_DEFAULT_MAX_DELAY_MS: u64 = 2_000;

/// Default exponential backoff multiplier between retries.
pub const RETRY_DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
