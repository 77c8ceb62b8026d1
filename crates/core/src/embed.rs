//! Embedding boundary.
//!
//! The core never computes embeddings. Callers either pass vectors directly or hand
//! the service an [`Embedder`] for the `*_text` operations.

use thiserror::Error;

/// Failure reported by an embedding backend.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The input cannot be embedded (empty, too long, unsupported).
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),

    /// The backend failed.
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

/// Turns text into fixed-length vectors.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}
