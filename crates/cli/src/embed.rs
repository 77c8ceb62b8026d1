//! Feature-hashing text embedder.
//!
//! Tokenizes by lowercasing, splitting on non-alphanumeric characters and dropping
//! English stop words and single-character tokens. Each token and each adjacent token
//! pair is hashed with CRC32 into one of `dimension` signed buckets; the result is
//! L2-normalized. Deterministic and dependency-free, so the CLI works offline.

use memoria_core::{EmbedError, Embedder};
use std::collections::HashSet;
use std::sync::LazyLock;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Lowercased content tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(t))
        .map(str::to_owned)
        .collect()
}

/// Hashes tokens into a fixed number of buckets.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = crc32fast::hash(feature.as_bytes());
        let bucket = (hash as usize) % self.dimension;
        // Top bit picks the sign so colliding features tend to cancel.
        let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbedError::InvalidInput(format!(
                "no indexable tokens in {text:?}"
            )));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Every feature cancelled out; fall back to an unsigned count.
            for token in &tokens {
                let bucket = crc32fast::hash(token.as_bytes()) as usize % self.dimension;
                vector[bucket] += 1.0;
            }
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut vector {
            *x /= norm;
        }
        Ok(vector)
    }
}
