//! Composite objective for hyperparameter search.
//!
//! Each term is a plain function of a partition so search evaluators can
//! combine them per search kind. Penalties are reported as positive numbers
//! and subtracted by [`composite_score`].

use rand::seq::index::sample;
use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::config::ScoreWeights;
use crate::models::ComponentScores;
use crate::services::clustering::{cluster, ClusterOptions, Partition};
use crate::services::terms::term_overlap;
use crate::utils::math::{cosine_distance, cosine_similarity};

/// Mean cosine similarity of each point to its own centroid.
pub fn coherence<V: AsRef<[f32]>>(vectors: &[V], partition: &Partition) -> f64 {
    if vectors.is_empty() {
        return 0.0;
    }
    let total: f64 = vectors
        .iter()
        .zip(partition.labels())
        .map(|(v, l)| cosine_similarity(v.as_ref(), &partition.centroids()[*l]) as f64)
        .sum();
    total / vectors.len() as f64
}

/// Mean pairwise cosine distance between centroids; 0 for a single cluster.
pub fn separation(partition: &Partition) -> f64 {
    let c = partition.centroids();
    let mut total = 0.0f64;
    let mut pairs = 0usize;
    for i in 0..c.len() {
        for j in (i + 1)..c.len() {
            total += cosine_distance(&c[i], &c[j]) as f64;
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}

/// Zero up to `threshold`, then rising linearly to 1 at full dominance.
pub fn dominance_penalty(partition: &Partition, threshold: f64) -> f64 {
    let share = partition.dominance();
    if share <= threshold || threshold >= 1.0 {
        return 0.0;
    }
    (share - threshold) / (1.0 - threshold)
}

/// Fraction of clusters at or near the size floor (below 1.5x `min_size`).
pub fn micro_cluster_penalty(partition: &Partition, min_size: usize) -> f64 {
    if partition.k() == 0 {
        return 0.0;
    }
    let near_floor = (min_size as f64 * 1.5).ceil() as usize;
    let count = partition.sizes().iter().filter(|s| **s < near_floor.max(min_size + 1)).count();
    count as f64 / partition.k() as f64
}

/// Mean pairwise top-term overlap between clusters.
pub fn label_penalty(top_terms: &[Vec<String>]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..top_terms.len() {
        for j in (i + 1)..top_terms.len() {
            total += term_overlap(&top_terms[i], &top_terms[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}

/// Adjusted Rand index of two labelings of the same points.
pub fn adjusted_rand_index(a: &[usize], b: &[usize]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 1.0;
    }
    let ka = a.iter().take(n).max().map(|m| m + 1).unwrap_or(0);
    let kb = b.iter().take(n).max().map(|m| m + 1).unwrap_or(0);
    let mut table = vec![vec![0u64; kb]; ka];
    for i in 0..n {
        table[a[i]][b[i]] += 1;
    }
    let comb2 = |x: u64| (x * x.saturating_sub(1)) as f64 / 2.0;
    let index: f64 = table.iter().flatten().map(|c| comb2(*c)).sum();
    let rows: f64 = table.iter().map(|r| comb2(r.iter().sum())).sum();
    let cols: f64 = (0..kb)
        .map(|j| comb2(table.iter().map(|r| r[j]).sum()))
        .sum();
    let total = comb2(n as u64);
    let expected = rows * cols / total;
    let max = (rows + cols) / 2.0;
    if (max - expected).abs() < f64::EPSILON {
        // Both labelings are trivial (all-one or all-singleton) and agree.
        return if (index - expected).abs() < f64::EPSILON {
            1.0
        } else {
            0.0
        };
    }
    (index - expected) / (max - expected)
}

/// Seed for one resampling round; depends only on the base seed, k, and round.
fn round_seed(seed: u64, k: usize, round: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((k as u64) << 20)
        .wrapping_add(round as u64)
}

/// Mean ARI between `partition` and re-clusterings of random subsets holding
/// `fraction` of the points. A subset that cannot be clustered counts as 0.
pub fn bootstrap_stability<V: AsRef<[f32]>>(
    vectors: &[V],
    partition: &Partition,
    options: &ClusterOptions,
    rounds: usize,
    fraction: f64,
) -> f64 {
    let n = vectors.len();
    if rounds == 0 || n < 2 {
        return 0.0;
    }
    let subset_size = ((n as f64 * fraction).round() as usize).clamp(2, n);
    let local = options.clone().hard_count().with_k(partition.k());

    let total: f64 = (0..rounds)
        .map(|round| {
            let mut rng = Xoshiro256Plus::seed_from_u64(round_seed(options.seed, partition.k(), round));
            let mut indices = sample(&mut rng, n, subset_size).into_vec();
            indices.sort_unstable();
            let subset: Vec<&[f32]> = indices.iter().map(|i| vectors[*i].as_ref()).collect();
            match cluster(&subset, &local) {
                Ok(out) => {
                    let reference: Vec<usize> =
                        indices.iter().map(|i| partition.labels()[*i]).collect();
                    adjusted_rand_index(&reference, out.partition.labels())
                }
                Err(_) => 0.0,
            }
        })
        .sum();
    total / rounds as f64
}

/// Mean ARI between `partition` and re-clusterings of noisy copies of the
/// input (uniform noise in `[-noise, noise]` per coordinate).
pub fn perturbation_stability<V: AsRef<[f32]>>(
    vectors: &[V],
    partition: &Partition,
    options: &ClusterOptions,
    perturbations: usize,
    noise: f32,
) -> Option<f64> {
    if perturbations == 0 || vectors.is_empty() {
        return None;
    }
    let local = options.clone().hard_count().with_k(partition.k());
    let total: f64 = (0..perturbations)
        .map(|p| {
            let mut rng = Xoshiro256Plus::seed_from_u64(round_seed(
                options.seed ^ 0xA5A5_A5A5,
                partition.k(),
                p,
            ));
            let noisy: Vec<Vec<f32>> = vectors
                .iter()
                .map(|v| {
                    v.as_ref()
                        .iter()
                        .map(|x| x + rng.gen_range(-noise..=noise))
                        .collect()
                })
                .collect();
            match cluster(&noisy, &local) {
                Ok(out) => adjusted_rand_index(partition.labels(), out.partition.labels()),
                Err(_) => 0.0,
            }
        })
        .sum();
    Some(total / perturbations as f64)
}

/// Weighted sum of the component terms.
pub fn composite_score(c: &ComponentScores, w: &ScoreWeights) -> f64 {
    w.coherence * c.coherence + w.separation * c.separation + w.stability * c.stability
        - w.dominance * c.dominance
        - w.micro_clusters * c.micro_clusters
        - w.label * c.label_penalty
        - c.k_penalty
}
