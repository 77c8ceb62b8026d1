//! HNSW benchmark on synthetic data.
//! Measures build rate, Recall@10 against brute force, and QPS across ef_search values.
//!
//! Usage: cargo bench --bench hnsw_recall [-- <count> <dim>]

use memoria_core::hnsw::{DistanceMetric, HnswConfig, HnswIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Instant;

const DEFAULT_COUNT: usize = 20_000;
const DEFAULT_DIM: usize = 64;
const NUM_QUERIES: usize = 200;
const K: usize = 10;

/// Gaussian-ish clustered vectors so the graph has structure to exploit.
fn synthetic(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..32)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect();
    (0..count)
        .map(|_| {
            let center = &centers[rng.gen_range(0..centers.len())];
            center
                .iter()
                .map(|c| c + rng.gen_range(-0.25f32..0.25))
                .collect()
        })
        .collect()
}

fn brute_force(data: &[Vec<f32>], query: &[f32], metric: DistanceMetric, k: usize) -> Vec<u64> {
    let mut scored: Vec<(f32, u64)> = data
        .iter()
        .enumerate()
        .map(|(i, v)| (metric.distance_exact(query, v), i as u64))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, id)| id).collect()
}

/// Compute Recall@k: fraction of true nearest neighbors found
fn recall_at_k(predicted: &[u64], truth: &[u64]) -> f64 {
    let truth_set: HashSet<u64> = truth.iter().copied().collect();
    let found = predicted.iter().filter(|id| truth_set.contains(id)).count();
    found as f64 / truth.len() as f64
}

fn main() {
    let mut args = std::env::args().skip(1).filter(|a| !a.starts_with('-'));
    let count = args
        .next()
        .and_then(|a| a.parse().ok())
        .unwrap_or(DEFAULT_COUNT);
    let dim = args
        .next()
        .and_then(|a| a.parse().ok())
        .unwrap_or(DEFAULT_DIM);

    println!("=== HNSW Benchmark: {count} synthetic vectors x {dim}d ===");

    let data = synthetic(count, dim, 1);
    let queries = synthetic(NUM_QUERIES, dim, 2);

    for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
        println!();
        println!("--- Metric: {metric} (M=16, ef_c=200) ---");

        let config = HnswConfig {
            metric,
            ..HnswConfig::default()
        };
        let index = HnswIndex::new(dim, config)
            .unwrap_or_else(|e| panic!("invalid benchmark config: {e}"))
            .with_seed(7);

        let t0 = Instant::now();
        for (i, v) in data.iter().enumerate() {
            index.insert(v).unwrap_or_else(|e| panic!("insert {i} failed: {e}"));
        }
        let build = t0.elapsed().as_secs_f64();
        println!(
            "  Build time: {build:.2}s ({:.0} inserts/s)",
            count as f64 / build
        );

        print!("  Computing ground truth...");
        let truth: Vec<Vec<u64>> = queries
            .iter()
            .map(|q| brute_force(&data, q, metric, K))
            .collect();
        println!(" done");

        println!();
        println!("  ef_search | Recall@10 |    QPS    | Avg latency");
        println!("  ----------+-----------+-----------+------------");
        for ef in [10, 20, 40, 80, 160, 320] {
            let t0 = Instant::now();
            let mut total_recall = 0.0f64;
            for (q, gt) in queries.iter().zip(&truth) {
                let hits = index
                    .search_with_ef(q, K, ef)
                    .unwrap_or_else(|e| panic!("search failed: {e}"));
                let predicted: Vec<u64> = hits.iter().map(|h| h.id).collect();
                total_recall += recall_at_k(&predicted, gt);
            }
            let elapsed = t0.elapsed();
            let qps = NUM_QUERIES as f64 / elapsed.as_secs_f64();
            let latency_us = elapsed.as_micros() as f64 / NUM_QUERIES as f64;
            println!(
                "  {:>9} | {:.4}    | {:>9.1} | {:.0} us",
                ef,
                total_recall / NUM_QUERIES as f64,
                qps,
                latency_us
            );
        }
    }

    println!();
    println!("=== Benchmark complete ===");
}
