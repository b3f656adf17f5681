//! Cluster hygiene: undersized-cluster merging and the dominance cap.
//!
//! Both passes only relabel points, so the point count is preserved and every
//! cluster in the output is non-empty.

use tracing::{debug, warn};

use crate::config::{ClusteringMode, HygieneConfig};
use crate::models::{HierarchyLevel, MinSizeReport, SplitRecord};
use crate::services::clustering::{cluster, ClusterOptions, Partition};
use crate::utils::math::cosine_distance;

#[derive(Debug, Clone)]
pub struct HygieneOutcome {
    pub partition: Partition,
    pub min_size: Option<MinSizeReport>,
    pub splits: Vec<SplitRecord>,
    pub round_limit_hit: bool,
    pub still_dominant: bool,
}

/// Result of the dominance-cap pass.
#[derive(Debug, Clone)]
pub struct DominanceCap {
    pub partition: Partition,
    pub splits: Vec<SplitRecord>,
    /// Every allowed round ran and a cluster is still over the threshold.
    pub round_limit_hit: bool,
    /// A cluster is over the threshold when the pass stops, for any reason.
    pub still_dominant: bool,
}

/// Run both passes in order: min-size merge, then dominance cap.
///
/// `total` is the corpus size the dominance share is measured against; for a
/// primary partition it equals the partition length.
pub fn apply<V: AsRef<[f32]>>(
    vectors: &[V],
    partition: Partition,
    config: &HygieneConfig,
    options: &ClusterOptions,
    level: HierarchyLevel,
    total: usize,
) -> HygieneOutcome {
    let (partition, min_size) = if config.enable_min_size {
        let floor = config.effective_min_cluster_size(total);
        let (p, report) = enforce_min_size(vectors, partition, floor);
        (p, Some(report))
    } else {
        (partition, None)
    };

    let cap = if config.enable_dominance_cap {
        cap_dominance(
            vectors,
            partition,
            config.dominance_cap_threshold,
            config.max_split_rounds,
            options,
            level,
            total,
        )
    } else {
        DominanceCap {
            partition,
            splits: Vec::new(),
            round_limit_hit: false,
            still_dominant: false,
        }
    };

    HygieneOutcome {
        partition: cap.partition,
        min_size,
        splits: cap.splits,
        round_limit_hit: cap.round_limit_hit,
        still_dominant: cap.still_dominant,
    }
}

/// Merge every cluster smaller than `min_size` into its nearest cluster by
/// centroid cosine distance, smallest first, until none is undersized or a
/// single cluster remains.
pub fn enforce_min_size<V: AsRef<[f32]>>(
    vectors: &[V],
    mut partition: Partition,
    min_size: usize,
) -> (Partition, MinSizeReport) {
    let before_size = partition.k();
    let mut merged_count = 0;

    while partition.k() > 1 {
        let Some(small) = (0..partition.k())
            .filter(|c| partition.sizes()[*c] < min_size)
            .min_by_key(|c| (partition.sizes()[*c], *c))
        else {
            break;
        };

        let centroids = partition.centroids();
        let Some(target) = (0..partition.k()).filter(|c| *c != small).min_by(|a, b| {
            let da = cosine_distance(&centroids[small], &centroids[*a]);
            let db = cosine_distance(&centroids[small], &centroids[*b]);
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        }) else {
            break;
        };

        debug!(
            from = small,
            into = target,
            size = partition.sizes()[small],
            "merging undersized cluster"
        );
        let relabeled: Vec<usize> = partition
            .labels()
            .iter()
            .map(|l| if *l == small { target } else { *l })
            .collect();
        partition = Partition::from_labels(vectors, &relabeled);
        merged_count += 1;
    }

    let report = MinSizeReport {
        min_cluster_size: min_size,
        before_size,
        after_size: partition.k(),
        merged_count,
    };
    (partition, report)
}

/// Split clusters holding more than `threshold` of `total` points with a local
/// k=2 k-means, for at most `max_rounds` rounds.
///
/// The pass stops early when nothing is dominant or when no dominant cluster
/// can be split; only running out of rounds counts as hitting the limit.
pub fn cap_dominance<V: AsRef<[f32]>>(
    vectors: &[V],
    mut partition: Partition,
    threshold: f64,
    max_rounds: usize,
    options: &ClusterOptions,
    level: HierarchyLevel,
    total: usize,
) -> DominanceCap {
    let total = total.max(1) as f64;
    let dominant = |p: &Partition| -> Vec<usize> {
        let mut ids: Vec<usize> = (0..p.k())
            .filter(|c| p.sizes()[*c] as f64 / total > threshold)
            .collect();
        ids.sort_by_key(|c| (std::cmp::Reverse(p.sizes()[*c]), *c));
        ids
    };

    let split_options = ClusterOptions {
        mode: ClusteringMode::Kmeans,
        ..options.clone().hard_count().with_k(2)
    };
    let mut splits = Vec::new();
    let mut stalled = false;

    for round in 1..=max_rounds {
        let targets = dominant(&partition);
        if targets.is_empty() {
            return DominanceCap {
                partition,
                splits,
                round_limit_hit: false,
                still_dominant: false,
            };
        }

        let mut labels = partition.labels().to_vec();
        let mut next_label = partition.k();
        let mut split_any = false;

        for c in targets {
            let members = partition.members(c);
            let member_vectors: Vec<&[f32]> = members.iter().map(|i| vectors[*i].as_ref()).collect();
            let local = match cluster(&member_vectors, &split_options) {
                Ok(out) => out.partition,
                Err(e) => {
                    debug!(cluster = c, "cannot split dominant cluster: {}", e);
                    continue;
                }
            };
            for (member, sub) in members.iter().zip(local.labels()) {
                if *sub == 1 {
                    labels[*member] = next_label;
                }
            }
            next_label += 1;
            split_any = true;
            splits.push(SplitRecord {
                level,
                round,
                original_size: members.len(),
                resulting_sizes: local.sizes().to_vec(),
            });
        }

        partition = Partition::from_labels(vectors, &labels);
        if !split_any {
            stalled = true;
            break;
        }
    }

    let still_dominant = !dominant(&partition).is_empty();
    let round_limit_hit = still_dominant && !stalled;
    if round_limit_hit {
        warn!(
            level = ?level,
            rounds = max_rounds,
            dominance = partition.dominance(),
            "dominance cap ran out of rounds with a cluster above the threshold"
        );
    } else if still_dominant {
        warn!(
            level = ?level,
            dominance = partition.dominance(),
            "dominant cluster cannot be split further"
        );
    }
    DominanceCap {
        partition,
        splits,
        round_limit_hit,
        still_dominant,
    }
}
