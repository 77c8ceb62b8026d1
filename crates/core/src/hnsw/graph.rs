//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] defines tuning parameters (M, ef_construction, ef_search, level multiplier, metric).
//! [`HnswIndex`] owns the node arena, the entry point cell, the metric and the level generator.
//! Every index instance is independent; nothing is process-global.

use crate::config;
use crate::error::{MemoryError, Result};
use crate::hnsw::distance::{DistanceMetric, Metric};
use crate::hnsw::node::{NodeId, NodeStore};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration parameters for an HNSW index.
///
/// Controls the trade-off between build speed, search speed, recall, and memory usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Maximum links per node on layers above 0.
    pub m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub m_max0: usize,
    /// Candidate list size during index construction.
    pub ef_construction: usize,
    /// Candidate list size during search (higher = better recall, slower).
    pub ef_search: usize,
    /// Maximum number of layers in the graph.
    pub max_layers: usize,
    /// Level multiplier `mL`. `None` means `1 / ln(m)`.
    pub level_multiplier: Option<f64>,
    /// Built-in distance function. Ignored when the index is built with a custom metric.
    pub metric: DistanceMetric,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            m_max0: config::HNSW_DEFAULT_M * 2,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            max_layers: config::HNSW_DEFAULT_MAX_LAYERS,
            level_multiplier: None,
            metric: DistanceMetric::Cosine,
        }
    }
}

impl HnswConfig {
    /// Effective level multiplier `mL`.
    pub fn ml(&self) -> f64 {
        self.level_multiplier
            .unwrap_or_else(|| 1.0 / (self.m as f64).ln())
    }

    /// Neighbor cap for `layer`.
    #[inline]
    pub fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m_max0
        } else {
            self.m
        }
    }

    /// Rejects parameter combinations the graph cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(MemoryError::InvalidConfig(format!(
                "m must be >= 2, got {}",
                self.m
            )));
        }
        if self.m_max0 < self.m {
            return Err(MemoryError::InvalidConfig(format!(
                "m_max0 ({}) must be >= m ({})",
                self.m_max0, self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(MemoryError::InvalidConfig(
                "ef_construction must be > 0".into(),
            ));
        }
        if self.max_layers == 0 {
            return Err(MemoryError::InvalidConfig("max_layers must be > 0".into()));
        }
        let ml = self.ml();
        if !ml.is_finite() || ml <= 0.0 {
            return Err(MemoryError::InvalidConfig(format!(
                "level multiplier must be positive and finite, got {ml}"
            )));
        }
        Ok(())
    }
}

/// Where every traversal starts: a node on the highest occupied layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    pub id: NodeId,
    pub layer: usize,
}

/// A search hit: node id and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: NodeId,
    pub distance: f32,
}

/// Concurrent HNSW index.
///
/// All operations take `&self`; share an index across threads with `Arc`.
pub struct HnswIndex {
    pub(crate) config: HnswConfig,
    pub(crate) dimension: usize,
    pub(crate) metric: Arc<dyn Metric>,
    pub(crate) nodes: NodeStore,
    pub(crate) entry: RwLock<Option<EntryPoint>>,
    rng: Mutex<StdRng>,
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("metric", &self.metric.name())
            .field("config", &self.config)
            .field("allocated", &self.nodes.allocated())
            .field("live", &self.nodes.live())
            .field("entry", &*self.entry.read())
            .finish()
    }
}

impl HnswIndex {
    /// Creates a new empty index using the built-in metric named in `config`.
    pub fn new(dimension: usize, config: HnswConfig) -> Result<Self> {
        let metric: Arc<dyn Metric> = Arc::new(config.metric);
        Self::with_metric(dimension, config, metric)
    }

    /// Creates a new empty index with a caller-supplied metric.
    pub fn with_metric(
        dimension: usize,
        config: HnswConfig,
        metric: Arc<dyn Metric>,
    ) -> Result<Self> {
        if dimension == 0 || dimension > config::MAX_DIMENSION {
            return Err(MemoryError::InvalidConfig(format!(
                "dimension must be in 1..={}, got {}",
                config::MAX_DIMENSION,
                dimension
            )));
        }
        config.validate()?;
        Ok(Self {
            config,
            dimension,
            metric,
            nodes: NodeStore::new(),
            entry: RwLock::new(None),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Replaces the level generator with one seeded from `seed`, for reproducible graphs.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> &dyn Metric {
        self.metric.as_ref()
    }

    /// Number of live (non-tombstoned) nodes.
    pub fn count(&self) -> usize {
        self.nodes.live()
    }

    /// Returns `true` if the index has no live nodes.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Number of nodes ever inserted, tombstoned ones included.
    pub fn allocated(&self) -> usize {
        self.nodes.allocated()
    }

    /// Current entry point, `None` on an empty graph.
    pub fn entry_point(&self) -> Option<EntryPoint> {
        *self.entry.read()
    }

    /// Returns `true` if `id` exists and is not tombstoned.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| !n.is_deleted())
    }

    /// Copy of the stored vector of a node (tombstoned nodes included).
    pub fn vector(&self, id: NodeId) -> Option<Vec<f32>> {
        self.nodes.get(id).map(|n| n.vector().to_vec())
    }

    /// Fails with `DimensionMismatch` unless `vector` has the index dimensionality.
    #[inline]
    pub(crate) fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Samples an insertion level `floor(-ln(U) * mL)`, capped at `max_layers - 1`.
    pub(crate) fn random_level<R: Rng>(&self, rng: &mut R) -> usize {
        // 1 - U lies in (0, 1], keeping ln finite.
        let r: f64 = 1.0 - rng.gen::<f64>();
        let level = (-r.ln() * self.config.ml()).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Samples a level from the index's own generator.
    pub(crate) fn next_level(&self) -> usize {
        let mut rng = self.rng.lock();
        self.random_level(&mut *rng)
    }

    /// Tombstones a node: it stays in the graph for navigation but never appears in results.
    ///
    /// Fails with `NodeNotFound` for unknown or already removed ids. Removing the entry
    /// point hands that role to the live node with the highest level.
    pub fn remove(&self, id: NodeId) -> Result<()> {
        self.nodes.tombstone(id)?;

        let mut entry = self.entry.write();
        if entry.is_some_and(|ep| ep.id == id) {
            if let Some(successor) = self.nodes.highest_live() {
                let next = EntryPoint {
                    id: successor.id(),
                    layer: successor.level(),
                };
                tracing::debug!(
                    removed = id,
                    entry = next.id,
                    layer = next.layer,
                    "Entry point replaced"
                );
                *entry = Some(next);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HnswConfig::default();
        config.validate().unwrap();
        assert_eq!(config.m_max0, 2 * config.m);
        assert!((config.ml() - 1.0 / 16f64.ln()).abs() < 1e-12);
        assert_eq!(config.max_neighbors(0), 32);
        assert_eq!(config.max_neighbors(3), 16);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let bad = [
            HnswConfig {
                m: 1,
                ..HnswConfig::default()
            },
            HnswConfig {
                m_max0: 4,
                ..HnswConfig::default()
            },
            HnswConfig {
                ef_construction: 0,
                ..HnswConfig::default()
            },
            HnswConfig {
                max_layers: 0,
                ..HnswConfig::default()
            },
            HnswConfig {
                level_multiplier: Some(-1.0),
                ..HnswConfig::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(MemoryError::InvalidConfig(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn test_invalid_dimension_rejected() {
        assert!(HnswIndex::new(0, HnswConfig::default()).is_err());
        assert!(HnswIndex::new(config::MAX_DIMENSION + 1, HnswConfig::default()).is_err());
    }

    #[test]
    fn test_random_level_distribution() {
        let index = HnswIndex::new(4, HnswConfig::default()).unwrap().with_seed(7);
        let mut zero = 0;
        for _ in 0..10_000 {
            let level = index.next_level();
            assert!(level < index.config.max_layers);
            if level == 0 {
                zero += 1;
            }
        }
        // P(level 0) = 1 - 1/M = 0.9375 for M = 16
        assert!(
            (9_000..=9_700).contains(&zero),
            "unexpected level-0 share: {zero}/10000"
        );
    }

    #[test]
    fn test_seeded_levels_are_reproducible() {
        let a = HnswIndex::new(4, HnswConfig::default()).unwrap().with_seed(42);
        let b = HnswIndex::new(4, HnswConfig::default()).unwrap().with_seed(42);
        let la: Vec<usize> = (0..200).map(|_| a.next_level()).collect();
        let lb: Vec<usize> = (0..200).map(|_| b.next_level()).collect();
        assert_eq!(la, lb);
    }
}
