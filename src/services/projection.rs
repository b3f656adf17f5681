//! PCA projection of juror and concept vectors, with per-axis pole labels.
//!
//! Principal directions come from the eigendecomposition of the centered
//! Gram matrix (nodes are few, embedding dimensions many), solved with cyclic
//! Jacobi rotations. Results are deterministic for a given node order.

use ndarray::{Array2, Axis};
use tracing::debug;

use crate::config::{DimensionMode, ProjectionConfig};
use crate::models::{AxisLabel, ProjectionSummary};

const JACOBI_MAX_SWEEPS: usize = 100;
const EIGEN_EPSILON: f64 = 1e-12;

/// Eigenpairs of a symmetric matrix, sorted by descending eigenvalue.
/// Eigenvectors are the columns of the returned matrix.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    let scale: f64 = a.iter().map(|x| x * x).sum::<f64>().max(f64::MIN_POSITIVE);
    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= scale * 1e-24 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|i, j| {
        a[[*j, *j]]
            .partial_cmp(&a[[*i, *i]])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(i.cmp(j))
    });
    let values = order.iter().map(|i| a[[*i, *i]]).collect();
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (col, src) in order.iter().enumerate() {
        vectors.column_mut(col).assign(&v.column(*src));
    }
    (values, vectors)
}

/// Principal component analysis of a point set.
#[derive(Debug, Clone)]
pub struct Pca {
    /// Variance explained by each component, non-increasing.
    pub explained_variances: Vec<f64>,
    pub total_variance: f64,
    /// `scores[i][c]`: coordinate of point `i` on component `c`.
    pub scores: Vec<Vec<f64>>,
}

impl Pca {
    pub fn fit<V: AsRef<[f32]>>(vectors: &[V]) -> Self {
        let n = vectors.len();
        if n == 0 {
            return Self {
                explained_variances: Vec::new(),
                total_variance: 0.0,
                scores: Vec::new(),
            };
        }
        let dims = vectors[0].as_ref().len();
        let mut x = Array2::<f64>::zeros((n, dims));
        for (i, v) in vectors.iter().enumerate() {
            for (j, value) in v.as_ref().iter().enumerate() {
                x[[i, j]] = *value as f64;
            }
        }
        if let Some(mean) = x.mean_axis(Axis(0)) {
            x -= &mean;
        }

        let gram = x.dot(&x.t());
        let (values, vectors) = symmetric_eigen(&gram);
        let denom = (n.max(2) - 1) as f64;

        // Components with (numerically) zero variance carry no direction.
        let available = values.iter().filter(|v| **v > EIGEN_EPSILON).count();
        let explained_variances: Vec<f64> = values
            .iter()
            .take(available)
            .map(|v| v / denom)
            .collect();
        let total_variance = gram.diag().sum() / denom;

        let mut scores = vec![vec![0.0f64; available]; n];
        for c in 0..available {
            let column = vectors.column(c);
            let sqrt_value = values[c].sqrt();
            // Sign convention: the largest-magnitude coordinate is positive.
            let pivot = column
                .iter()
                .enumerate()
                .fold((0usize, 0.0f64), |best, (i, x)| {
                    if x.abs() > best.1.abs() + 1e-12 {
                        (i, *x)
                    } else {
                        best
                    }
                });
            let sign = if pivot.1 < 0.0 { -1.0 } else { 1.0 };
            for (i, row) in scores.iter_mut().enumerate() {
                row[c] = sign * column[i] * sqrt_value;
            }
        }

        Self {
            explained_variances,
            total_variance,
            scores,
        }
    }

    pub fn cumulative_variances(&self) -> Vec<f64> {
        self.explained_variances
            .iter()
            .scan(0.0, |acc, v| {
                *acc += v;
                Some(*acc)
            })
            .collect()
    }
}

/// Number of projected dimensions for the given explained variances.
///
/// `elbow` picks the smallest `N >= 2` at which the gap
/// `ev[N-1] - ev[N]` falls below `elbow_fraction` of the first gap.
/// Every mode is clamped to `max_dimensions` and the available components.
pub fn choose_dimensions(explained: &[f64], total: f64, config: &ProjectionConfig) -> usize {
    let available = explained.len();
    if available == 0 {
        return 0;
    }
    let chosen = match config.dimension_mode {
        DimensionMode::Manual => config.num_dimensions,
        DimensionMode::Threshold => {
            let mut cumulative = 0.0;
            let mut n = available;
            for (i, v) in explained.iter().enumerate() {
                cumulative += v;
                if total > 0.0 && cumulative / total >= config.variance_threshold - 1e-12 {
                    n = i + 1;
                    break;
                }
            }
            n
        }
        DimensionMode::Elbow => {
            if available < 3 {
                available
            } else {
                let first_gap = explained[0] - explained[1];
                (2..available)
                    .find(|n| explained[n - 1] - explained[*n] < config.elbow_fraction * first_gap)
                    .unwrap_or(available)
            }
        }
    };
    chosen.clamp(1, config.max_dimensions.min(available).max(1))
}

/// Projected coordinates plus the summary a renderer needs.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Per node, `applied_num_dimensions` coordinates.
    pub coordinates: Vec<Vec<f32>>,
    pub summary: ProjectionSummary,
}

/// Project nodes and label each axis by its extreme nodes.
///
/// `describe` maps a node id to a short pole description.
pub fn project<V, F>(
    node_ids: &[String],
    vectors: &[V],
    config: &ProjectionConfig,
    describe: F,
) -> Projection
where
    V: AsRef<[f32]>,
    F: Fn(&str) -> String,
{
    let pca = Pca::fit(vectors);
    let applied = choose_dimensions(&pca.explained_variances, pca.total_variance, config);
    debug!(
        nodes = node_ids.len(),
        components = pca.explained_variances.len(),
        applied,
        "projection computed"
    );

    let coordinates: Vec<Vec<f32>> = pca
        .scores
        .iter()
        .map(|row| row.iter().take(applied).map(|x| *x as f32).collect())
        .collect();

    let axis_labels = (0..applied)
        .filter_map(|axis| {
            let (neg, pos) = extremes(&coordinates, axis)?;
            let negative_pole = describe(&node_ids[neg]);
            let positive_pole = describe(&node_ids[pos]);
            Some(AxisLabel {
                axis_index: axis,
                name: format!("{} vs {}", negative_pole, positive_pole),
                negative_pole,
                positive_pole,
                negative_node_id: node_ids[neg].clone(),
                positive_node_id: node_ids[pos].clone(),
            })
        })
        .collect();

    Projection {
        coordinates,
        summary: ProjectionSummary {
            dimension_mode: config.dimension_mode,
            applied_num_dimensions: applied,
            cumulative_variances: pca.cumulative_variances(),
            explained_variances: pca.explained_variances,
            total_variance: pca.total_variance,
            axis_labels,
        },
    }
}

/// Indices of the minimal and maximal coordinate on `axis`; first wins ties.
fn extremes(coordinates: &[Vec<f32>], axis: usize) -> Option<(usize, usize)> {
    let mut min: Option<(usize, f32)> = None;
    let mut max: Option<(usize, f32)> = None;
    for (i, row) in coordinates.iter().enumerate() {
        let value = *row.get(axis)?;
        if min.map_or(true, |(_, m)| value < m) {
            min = Some((i, value));
        }
        if max.map_or(true, |(_, m)| value > m) {
            max = Some((i, value));
        }
    }
    Some((min?.0, max?.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_symmetric_eigen_diagonalizes() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let (values, vectors) = symmetric_eigen(&m);
        assert!((values[0] - 3.0).abs() < 1e-9);
        assert!((values[1] - 1.0).abs() < 1e-9);
        // A v = lambda v
        let v0 = vectors.column(0).to_owned();
        let av = m.dot(&v0);
        for i in 0..2 {
            assert!((av[i] - 3.0 * v0[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pca_variance_ordering_and_total() {
        let points = vec![
            vec![2.0f32, 0.0, 0.1],
            vec![-2.0, 0.0, -0.1],
            vec![0.0, 1.0, 0.0],
            vec![0.0, -1.0, 0.0],
        ];
        let pca = Pca::fit(&points);
        for pair in pca.explained_variances.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        let cumulative = pca.cumulative_variances();
        for pair in cumulative.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        let last = *cumulative.last().unwrap();
        assert!((last - pca.total_variance).abs() < 1e-9);
        // First axis separates the two far points.
        assert!((pca.scores[0][0].abs() - pca.scores[1][0].abs()).abs() < 1e-6);
        assert!(pca.scores[0][0] * pca.scores[1][0] < 0.0);
    }

    #[test]
    fn test_threshold_mode_picks_smallest_sufficient_count() {
        let config = ProjectionConfig {
            dimension_mode: DimensionMode::Threshold,
            variance_threshold: 0.9,
            ..Default::default()
        };
        assert_eq!(choose_dimensions(&[0.5, 0.3, 0.15, 0.05], 1.0, &config), 3);
    }

    #[test]
    fn test_elbow_mode() {
        let config = ProjectionConfig {
            dimension_mode: DimensionMode::Elbow,
            elbow_fraction: 0.25,
            ..Default::default()
        };
        // gaps: 5.0, 0.2 -> elbow after two components
        assert_eq!(choose_dimensions(&[10.0, 5.0, 4.8, 4.7], 24.5, &config), 2);
        // steady decay never triggers; all components kept
        assert_eq!(choose_dimensions(&[8.0, 6.0, 4.0, 2.0], 20.0, &config), 4);
    }

    #[test]
    fn test_manual_mode_clamped_to_available() {
        let config = ProjectionConfig {
            num_dimensions: 5,
            ..Default::default()
        };
        assert_eq!(choose_dimensions(&[1.0, 0.5], 1.5, &config), 2);
        assert_eq!(choose_dimensions(&[], 0.0, &config), 0);
    }

    #[test]
    fn test_axis_labels_follow_extremes() {
        let ids: Vec<String> = ["juror:a", "juror:b", "concept:c0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = vec![vec![1.0f32, 0.0], vec![-1.0, 0.0], vec![0.0, 0.2]];
        let projection = project(&ids, &vectors, &ProjectionConfig::default(), |id| {
            id.to_uppercase()
        });
        let label = &projection.summary.axis_labels[0];
        let neg = ids.iter().position(|i| *i == label.negative_node_id).unwrap();
        let pos = ids.iter().position(|i| *i == label.positive_node_id).unwrap();
        assert!(projection.coordinates[neg][0] <= projection.coordinates[pos][0]);
        for row in &projection.coordinates {
            assert!(row[0] >= projection.coordinates[neg][0]);
            assert!(row[0] <= projection.coordinates[pos][0]);
        }
        assert_eq!(label.negative_pole, label.negative_node_id.to_uppercase());
    }

    #[test]
    fn test_projection_is_deterministic() {
        let ids: Vec<String> = (0..4).map(|i| format!("n{i}")).collect();
        let vectors = vec![
            vec![0.3f32, 0.1, 0.9],
            vec![0.2, 0.8, 0.1],
            vec![0.9, 0.2, 0.3],
            vec![0.4, 0.4, 0.4],
        ];
        let a = project(&ids, &vectors, &ProjectionConfig::default(), |s| s.to_string());
        let b = project(&ids, &vectors, &ProjectionConfig::default(), |s| s.to_string());
        assert_eq!(a.coordinates, b.coordinates);
    }
}
