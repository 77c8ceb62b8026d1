//! Distance metric implementations for HNSW search.
//!
//! The index is metric-agnostic: it holds an `Arc<dyn Metric>`. [`DistanceMetric`]
//! provides the built-in cosine and squared euclidean metrics; any other
//! non-negative, symmetric dissimilarity can be plugged in by implementing [`Metric`].

use crate::error::{MemoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dissimilarity between two vectors of equal length.
///
/// Implementations must be pure and return a value that is non-negative, symmetric,
/// and zero for identical inputs. **Lower is more similar.** Callers guarantee equal
/// lengths; use [`checked_distance`] at API boundaries.
pub trait Metric: Send + Sync + fmt::Debug {
    /// Distance between `a` and `b`.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Built-in distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
    #[default]
    Cosine,
    /// Squared Euclidean distance (L2²). Range: \[0, ∞).
    Euclidean,
}

impl DistanceMetric {
    /// Exact f32-vs-f32 distance.
    #[inline]
    pub fn distance_exact(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::Euclidean => euclidean_sq(a, b),
        }
    }
}

impl Metric for DistanceMetric {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.distance_exact(a, b)
    }

    fn name(&self) -> &str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown distance metric '{other}' (expected cosine or euclidean)"
            ))),
        }
    }
}

/// Distance with a length check. Fails with `DimensionMismatch` when `a` and `b` differ in length.
pub fn checked_distance(metric: &dyn Metric, a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(MemoryError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(metric.distance(a, b))
}

/// `1 - cos(a, b)`, clamped to \[0, 2\] so rounding never yields a negative distance.
/// Two zero vectors are identical (0); a zero vector is orthogonal to everything else (1).
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let zero_a = norm_a < 1e-20;
    let zero_b = norm_b < 1e-20;
    if zero_a && zero_b {
        return 0.0;
    }
    if zero_a || zero_b {
        return 1.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    (1.0 - similarity).clamp(0.0, 2.0)
}

fn euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
