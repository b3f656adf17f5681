//! Average-linkage agglomerative clustering on cosine distance.
//!
//! Builds the full dendrogram with the nearest-neighbor-chain algorithm
//! (O(n²) time and memory; average linkage is reducible, so the chain finds
//! the same merges as the naive closest-pair loop) and cuts it either to an
//! exact cluster count or at a percentile of the merge-distance range.

use crate::utils::math::cosine_distance;

/// One agglomeration step between two clusters, identified by the index of a
/// representative input point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f32,
    /// Points in the merged cluster.
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct Dendrogram {
    n: usize,
    /// Sorted by ascending distance.
    merges: Vec<Merge>,
}

/// Symmetric distance matrix stored row-major.
struct DistanceMatrix {
    n: usize,
    data: Vec<f32>,
}

impl DistanceMatrix {
    fn new<V: AsRef<[f32]>>(vectors: &[V]) -> Self {
        let n = vectors.len();
        let mut data = vec![0.0f32; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = cosine_distance(vectors[i].as_ref(), vectors[j].as_ref()).max(0.0);
                data[i * n + j] = d;
                data[j * n + i] = d;
            }
        }
        Self { n, data }
    }

    fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.n + j]
    }

    fn set(&mut self, i: usize, j: usize, d: f32) {
        self.data[i * self.n + j] = d;
        self.data[j * self.n + i] = d;
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

impl Dendrogram {
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Self {
        let n = vectors.len();
        if n < 2 {
            return Self {
                n,
                merges: Vec::new(),
            };
        }

        let mut dist = DistanceMatrix::new(vectors);
        let mut active = vec![true; n];
        let mut sizes = vec![1usize; n];
        let mut chain: Vec<usize> = Vec::with_capacity(n);
        let mut merges = Vec::with_capacity(n - 1);
        let mut remaining = n;

        while remaining > 1 {
            if chain.is_empty() {
                if let Some(first) = active.iter().position(|a| *a) {
                    chain.push(first);
                }
            }

            let (a, b) = loop {
                let a = chain[chain.len() - 1];
                let prev = if chain.len() >= 2 {
                    Some(chain[chain.len() - 2])
                } else {
                    None
                };

                // Ties keep the previous chain element so the chain terminates.
                let mut best = prev;
                let mut best_d = prev.map(|p| dist.get(a, p)).unwrap_or(f32::INFINITY);
                for c in 0..n {
                    if c == a || !active[c] {
                        continue;
                    }
                    let d = dist.get(a, c);
                    if d < best_d {
                        best_d = d;
                        best = Some(c);
                    }
                }

                match best {
                    Some(b) if Some(b) == prev => break (a, b),
                    Some(b) => chain.push(b),
                    None => unreachable!("at least two active clusters remain"),
                }
            };

            chain.pop();
            chain.pop();

            let d_ab = dist.get(a, b);
            let (keep, drop) = if a < b { (a, b) } else { (b, a) };
            let size_keep = sizes[keep] as f32;
            let size_drop = sizes[drop] as f32;
            for c in 0..n {
                if !active[c] || c == keep || c == drop {
                    continue;
                }
                let merged = (size_keep * dist.get(keep, c) + size_drop * dist.get(drop, c))
                    / (size_keep + size_drop);
                dist.set(keep, c, merged);
            }
            active[drop] = false;
            sizes[keep] += sizes[drop];
            remaining -= 1;

            merges.push(Merge {
                left: keep,
                right: drop,
                distance: d_ab,
                size: sizes[keep],
            });
        }

        // Reducible linkage: replaying merges in distance order (stable on ties)
        // reproduces the same nested partitions.
        merges.sort_by(|x, y| {
            x.distance
                .partial_cmp(&y.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Self { n, merges }
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// `(min, max)` merge distance, or `None` for fewer than two points.
    pub fn distance_range(&self) -> Option<(f32, f32)> {
        let first = self.merges.first()?;
        let last = self.merges.last()?;
        Some((first.distance, last.distance))
    }

    /// Cut to exactly `k` clusters (clamped to `[1, n]`).
    pub fn cut_count(&self, k: usize) -> Vec<usize> {
        let k = k.clamp(1, self.n.max(1));
        self.labels_after(self.n.saturating_sub(k))
    }

    /// Cut at `percent` of the merge-distance range: every merge at or below
    /// `min + percent/100 * (max - min)` is applied.
    pub fn cut_granularity(&self, percent: f64) -> Vec<usize> {
        let Some((min, max)) = self.distance_range() else {
            return vec![0; self.n];
        };
        let threshold = min as f64 + (percent.clamp(0.0, 100.0) / 100.0) * (max - min) as f64;
        let applied = self
            .merges
            .iter()
            .take_while(|m| (m.distance as f64) <= threshold + 1e-9)
            .count();
        self.labels_after(applied)
    }

    /// Labels after applying the first `count` merges, compacted in order of
    /// first appearance.
    fn labels_after(&self, count: usize) -> Vec<usize> {
        let mut uf = UnionFind::new(self.n);
        for m in self.merges.iter().take(count) {
            uf.union(m.left, m.right);
        }
        let mut label_of_root = std::collections::HashMap::new();
        (0..self.n)
            .map(|i| {
                let root = uf.find(i);
                let next = label_of_root.len();
                *label_of_root.entry(root).or_insert(next)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.95, 0.05, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 0.1, 0.9],
        ]
    }

    #[test]
    fn test_dendrogram_has_n_minus_one_sorted_merges() {
        let d = Dendrogram::build(&two_groups());
        assert_eq!(d.merges().len(), 4);
        for pair in d.merges().windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert_eq!(d.merges().last().unwrap().size, 5);
    }

    #[test]
    fn test_cut_count_separates_groups() {
        let d = Dendrogram::build(&two_groups());
        let labels = d.cut_count(2);
        assert_eq!(labels, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_cut_count_extremes() {
        let d = Dendrogram::build(&two_groups());
        assert_eq!(d.cut_count(1), vec![0; 5]);
        assert_eq!(d.cut_count(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(d.cut_count(50), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_granularity_lower_percent_is_finer() {
        let d = Dendrogram::build(&two_groups());
        let count = |labels: Vec<usize>| labels.iter().max().map(|m| m + 1).unwrap_or(0);
        let fine = count(d.cut_granularity(0.0));
        let mid = count(d.cut_granularity(50.0));
        let coarse = count(d.cut_granularity(100.0));
        assert!(fine >= mid && mid >= coarse);
        assert_eq!(coarse, 1);
    }

    #[test]
    fn test_single_point() {
        let d = Dendrogram::build(&[vec![1.0f32, 0.0]]);
        assert!(d.merges().is_empty());
        assert_eq!(d.cut_count(3), vec![0]);
        assert_eq!(d.cut_granularity(10.0), vec![0]);
    }
}
