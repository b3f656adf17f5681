//! Clustering engine: partitions sentence vectors into concepts.
//!
//! k-means runs through linfa on L2-normalized vectors (Euclidean distance on
//! the unit sphere, which orders points the same way cosine distance does);
//! hierarchical mode uses average linkage on cosine distance. Both are fully
//! determined by the input vectors and the seed.

use std::collections::HashSet;

use linfa::prelude::*;
use linfa_clustering::KMeans;
use ndarray::{Array1, Array2};
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::debug;

use crate::config::{ClusteringConfig, ClusteringMode, CutType};
use crate::services::hierarchy::Dendrogram;
use crate::utils::math::{cosine_distance, mean_vector, softmax, vector_normalize, weighted_mean};
use crate::JuryscopeError;

/// Hard partition of `n` points into `k` non-empty clusters.
///
/// Labels are compact (`0..k`) and numbered in order of first appearance, so
/// two partitions describing the same grouping compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    labels: Vec<usize>,
    centroids: Vec<Vec<f32>>,
    sizes: Vec<usize>,
}

impl Partition {
    /// Build from arbitrary cluster ids, recomputing centroids as member means.
    pub fn from_labels<V: AsRef<[f32]>>(vectors: &[V], raw_labels: &[usize]) -> Self {
        let labels = compact_labels(raw_labels);
        let k = labels.iter().max().map(|m| m + 1).unwrap_or(0);
        let mut sizes = vec![0usize; k];
        for &l in &labels {
            sizes[l] += 1;
        }
        let centroids = (0..k)
            .map(|c| {
                mean_vector(
                    labels
                        .iter()
                        .zip(vectors.iter())
                        .filter(|(l, _)| **l == c)
                        .map(|(_, v)| v.as_ref()),
                )
                .unwrap_or_default()
            })
            .collect();
        Self {
            labels,
            centroids,
            sizes,
        }
    }

    pub fn k(&self) -> usize {
        self.sizes.len()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Indices of the points in cluster `c`, ascending.
    pub fn members(&self, c: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == c)
            .map(|(i, _)| i)
            .collect()
    }

    /// Share of points held by the largest cluster.
    pub fn dominance(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        let largest = self.sizes.iter().copied().max().unwrap_or(0);
        largest as f64 / self.labels.len() as f64
    }

    pub(crate) fn set_centroids(&mut self, centroids: Vec<Vec<f32>>) {
        self.centroids = centroids;
    }
}

/// Renumber labels `0..k` in order of first appearance.
pub fn compact_labels(raw: &[usize]) -> Vec<usize> {
    let mut mapping = std::collections::HashMap::new();
    raw.iter()
        .map(|l| {
            let next = mapping.len();
            *mapping.entry(*l).or_insert(next)
        })
        .collect()
}

/// Number of bit-distinct vectors.
pub fn distinct_vector_count<V: AsRef<[f32]>>(vectors: &[V]) -> usize {
    vectors
        .iter()
        .map(|v| v.as_ref().iter().map(|x| x.to_bits()).collect::<Vec<u32>>())
        .collect::<HashSet<_>>()
        .len()
}

/// Parameters of one clustering call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    pub k: usize,
    pub mode: ClusteringMode,
    pub cut_type: CutType,
    pub granularity_percent: f64,
    pub seed: u64,
    pub soft_membership: bool,
    pub temperature: f32,
    pub membership_floor: f32,
    pub max_iterations: u64,
    pub tolerance: f64,
}

impl ClusterOptions {
    pub fn from_config(config: &ClusteringConfig) -> Self {
        Self {
            k: config.k_concepts,
            mode: config.clustering_mode,
            cut_type: config.cut_type,
            granularity_percent: config.granularity_percent,
            seed: config.cluster_seed,
            soft_membership: config.soft_membership,
            temperature: config.softmax_temperature,
            membership_floor: config.membership_floor,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Hard assignment with an exact-count cut, as used for local re-splits.
    pub fn hard_count(mut self) -> Self {
        self.soft_membership = false;
        self.cut_type = CutType::Count;
        self
    }
}

/// Sparse membership weights of one point: `(cluster, weight)` ascending by
/// cluster, weights summing to 1.
pub type PointMemberships = Vec<(usize, f32)>;

#[derive(Debug, Clone)]
pub struct ClusterOutput {
    pub partition: Partition,
    pub memberships: Vec<PointMemberships>,
}

/// Partition `vectors` according to `options`.
///
/// Returns [`JuryscopeError::DegenerateClustering`] when the request cannot
/// yield a valid partition (more clusters than distinct vectors, or k-means
/// leaving a cluster empty). Searches record that as an invalid candidate.
pub fn cluster<V: AsRef<[f32]>>(
    vectors: &[V],
    options: &ClusterOptions,
) -> Result<ClusterOutput, JuryscopeError> {
    if vectors.is_empty() {
        return Err(JuryscopeError::DegenerateClustering(
            "no vectors to cluster".to_string(),
        ));
    }
    let exact_k = options.mode == ClusteringMode::Kmeans || options.cut_type == CutType::Count;
    if exact_k {
        if options.k == 0 {
            return Err(JuryscopeError::DegenerateClustering(
                "k must be at least 1".to_string(),
            ));
        }
        let distinct = distinct_vector_count(vectors);
        if options.k > distinct {
            return Err(JuryscopeError::DegenerateClustering(format!(
                "k={} exceeds the {} distinct input vectors",
                options.k, distinct
            )));
        }
    }

    let labels = match options.mode {
        ClusteringMode::Kmeans => kmeans_labels(
            vectors,
            options.k,
            options.seed,
            options.max_iterations,
            options.tolerance,
        )?,
        ClusteringMode::Hierarchical => {
            let dendrogram = Dendrogram::build(vectors);
            match options.cut_type {
                CutType::Count => dendrogram.cut_count(options.k),
                CutType::Granularity => dendrogram.cut_granularity(options.granularity_percent),
            }
        }
    };

    let mut partition = Partition::from_labels(vectors, &labels);
    if exact_k && partition.k() != options.k {
        return Err(JuryscopeError::DegenerateClustering(format!(
            "produced {} non-empty clusters, expected {}",
            partition.k(),
            options.k
        )));
    }

    let memberships = assign_memberships(vectors, &mut partition, options);

    debug!(
        mode = ?options.mode,
        k = partition.k(),
        n = vectors.len(),
        seed = options.seed,
        "clustered"
    );

    Ok(ClusterOutput {
        partition,
        memberships,
    })
}

fn kmeans_labels<V: AsRef<[f32]>>(
    vectors: &[V],
    k: usize,
    seed: u64,
    max_iterations: u64,
    tolerance: f64,
) -> Result<Vec<usize>, JuryscopeError> {
    let n = vectors.len();
    let num_dims = vectors[0].as_ref().len();
    let mut matrix_data = Vec::with_capacity(n * num_dims);
    for v in vectors {
        matrix_data.extend(vector_normalize(v.as_ref()).iter().map(|x| *x as f64));
    }

    let embedding_matrix = Array2::from_shape_vec((n, num_dims), matrix_data).map_err(|e| {
        JuryscopeError::DegenerateClustering(format!("Failed to create embedding matrix: {}", e))
    })?;
    let dataset = DatasetBase::new(embedding_matrix, Array1::from_elem(n, ()));

    let rng = Xoshiro256Plus::seed_from_u64(seed);
    let model = KMeans::params_with_rng(k, rng)
        .n_runs(1)
        .max_n_iterations(max_iterations)
        .tolerance(tolerance)
        .fit(&dataset)
        .map_err(|e| {
            JuryscopeError::DegenerateClustering(format!("K-means clustering failed: {}", e))
        })?;

    let predictions = model.predict(&dataset);
    Ok(predictions.iter().cloned().collect())
}

/// Membership weights for a final partition. Under soft membership the
/// partition's centroids become membership-weighted means.
pub fn assign_memberships<V: AsRef<[f32]>>(
    vectors: &[V],
    partition: &mut Partition,
    options: &ClusterOptions,
) -> Vec<PointMemberships> {
    if !options.soft_membership {
        return hard_memberships(partition.labels());
    }
    let soft = soft_memberships(
        vectors,
        partition.centroids(),
        partition.labels(),
        options.temperature,
        options.membership_floor,
    );
    let centroids = weighted_centroids(vectors, &soft, partition.centroids());
    partition.set_centroids(centroids);
    soft
}

/// One-hot memberships.
pub fn hard_memberships(labels: &[usize]) -> Vec<PointMemberships> {
    labels.iter().map(|l| vec![(*l, 1.0)]).collect()
}

/// Softmax over negative cosine distance to every centroid. Weights under
/// `floor` are dropped (the hard cluster is always kept) and the rest
/// renormalized.
pub fn soft_memberships<V: AsRef<[f32]>>(
    vectors: &[V],
    centroids: &[Vec<f32>],
    labels: &[usize],
    temperature: f32,
    floor: f32,
) -> Vec<PointMemberships> {
    vectors
        .iter()
        .zip(labels.iter())
        .map(|(v, &assigned)| {
            let logits: Vec<f32> = centroids
                .iter()
                .map(|c| -cosine_distance(v.as_ref(), c))
                .collect();
            let probs = softmax(&logits, temperature);
            let kept: Vec<(usize, f32)> = probs
                .into_iter()
                .enumerate()
                .filter(|(c, p)| *p >= floor || *c == assigned)
                .collect();
            let total: f32 = kept.iter().map(|(_, p)| *p).sum();
            if total <= 0.0 {
                return vec![(assigned, 1.0)];
            }
            kept.into_iter().map(|(c, p)| (c, p / total)).collect()
        })
        .collect()
}

/// Membership-weighted centroid per cluster, keeping `fallback` for a
/// cluster that received no weight.
fn weighted_centroids<V: AsRef<[f32]>>(
    vectors: &[V],
    memberships: &[PointMemberships],
    fallback: &[Vec<f32>],
) -> Vec<Vec<f32>> {
    let dims = vectors.first().map(|v| v.as_ref().len()).unwrap_or(0);
    fallback
        .iter()
        .enumerate()
        .map(|(c, hard)| {
            let pairs = vectors.iter().zip(memberships.iter()).filter_map(|(v, m)| {
                m.iter()
                    .find(|(mc, _)| *mc == c)
                    .map(|(_, w)| (v.as_ref(), *w))
            });
            weighted_mean(pairs, dims).unwrap_or_else(|| hard.clone())
        })
        .collect()
}

/// Number of detail clusters for a primary concept of `size` members.
pub fn detail_k(size: usize) -> usize {
    ((size as f64 / 2.0).sqrt().round() as usize).max(2)
}

/// Re-cluster the members of one primary concept.
///
/// `None` when the concept is below `min_size` or cannot be split into
/// `detail_k(size)` distinct groups.
pub fn cluster_detail<V: AsRef<[f32]>>(
    members: &[V],
    options: &ClusterOptions,
    min_size: usize,
) -> Option<Partition> {
    if members.len() < min_size.max(2) {
        return None;
    }
    let local = options.clone().hard_count().with_k(detail_k(members.len()));
    match cluster(members, &local) {
        Ok(output) => Some(output.partition),
        Err(e) => {
            debug!("Skipping detail clustering: {}", e);
            None
        }
    }
}
