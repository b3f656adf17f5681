//! Anchor axes: user-defined semantic directions scored outside PCA.
//!
//! A direction is the normalized difference between the positive and
//! negative seed-phrase centroids; a node's score is its signed projection
//! onto that direction, measured from the midpoint of the two centroids.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::{debug, warn};

use crate::embedding::{EmbeddingService, VectorStore};
use crate::models::{AnchorAxis, AnchorAxisScores, AnchorPole};
use crate::services::cancel::CancellationToken;
use crate::JuryscopeError;
use crate::utils::math::{
    dot, l2_norm, mean_vector, vector_midpoint, vector_normalize, vector_subtract,
};

/// Resolved direction of one anchor axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorDirection {
    pub axis: AnchorAxis,
    pub midpoint: Vec<f32>,
    /// Unit vector from the negative toward the positive pole.
    pub direction: Vec<f32>,
}

impl AnchorDirection {
    /// Build from pole centroids. `None` when the poles coincide.
    pub fn from_centroids(axis: AnchorAxis, negative: &[f32], positive: &[f32]) -> Option<Self> {
        let diff = vector_subtract(positive, negative);
        if l2_norm(&diff) <= f32::EPSILON {
            return None;
        }
        Some(Self {
            axis,
            midpoint: vector_midpoint(negative, positive),
            direction: vector_normalize(&diff),
        })
    }

    /// Signed projection of `vector`; positive leans toward the positive pole.
    pub fn score(&self, vector: &[f32]) -> f32 {
        dot(&vector_subtract(vector, &self.midpoint), &self.direction)
    }

    /// Score every `(node_id, vector)` pair.
    pub fn score_nodes<'v, I>(&self, nodes: I) -> AnchorAxisScores
    where
        I: IntoIterator<Item = (&'v str, &'v [f32])>,
    {
        let scores: BTreeMap<String, f32> = nodes
            .into_iter()
            .map(|(id, v)| (id.to_string(), self.score(v)))
            .collect();
        AnchorAxisScores {
            id: self.axis.id.clone(),
            name: self.axis.name.clone(),
            negative_label: self.axis.negative_pole.label.clone(),
            positive_label: self.axis.positive_pole.label.clone(),
            scores,
        }
    }
}

/// Identity of the inputs a direction was derived from.
fn fingerprint(axis: &AnchorAxis, dims: usize) -> String {
    let phrases = |pole: &AnchorPole| {
        pole.seed_phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join("\u{1f}")
    };
    format!(
        "{}|{}|{}",
        dims,
        phrases(&axis.negative_pole),
        phrases(&axis.positive_pole)
    )
}

/// Anchor directions cached across runs, keyed by axis id.
///
/// A direction is recomputed only when the axis seed phrases (or the
/// embedding dimensionality) change; renaming an axis or its poles reuses
/// the cached vectors.
#[derive(Debug, Default)]
pub struct AnchorSet {
    cache: HashMap<String, (String, AnchorDirection)>,
}

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Directions for `axes`, in input order. Axes whose poles cannot be
    /// embedded, or whose poles coincide, are skipped with a warning. Each
    /// embedding call for a missing seed phrase is bounded by `embed_timeout`.
    pub async fn resolve(
        &mut self,
        axes: &[AnchorAxis],
        store: &VectorStore,
        embedder: &dyn EmbeddingService,
        embed_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<AnchorDirection>, JuryscopeError> {
        let mut out = Vec::with_capacity(axes.len());
        for axis in axes {
            let key = fingerprint(axis, store.dims());
            if let Some((cached_key, cached)) = self.cache.get(&axis.id) {
                if *cached_key == key {
                    debug!(axis = %axis.id, "reusing cached anchor direction");
                    let mut direction = cached.clone();
                    direction.axis = axis.clone();
                    out.push(direction);
                    continue;
                }
            }

            let negative =
                pole_centroid(&axis.negative_pole, store, embedder, embed_timeout, cancel).await?;
            let positive =
                pole_centroid(&axis.positive_pole, store, embedder, embed_timeout, cancel).await?;
            let (Some(negative), Some(positive)) = (negative, positive) else {
                warn!(
                    axis = %axis.id,
                    "anchor axis skipped: a pole has no resolvable seed phrases"
                );
                continue;
            };
            let Some(direction) = AnchorDirection::from_centroids(axis.clone(), &negative, &positive)
            else {
                warn!(axis = %axis.id, "anchor axis skipped: poles coincide");
                continue;
            };
            self.cache.insert(axis.id.clone(), (key, direction.clone()));
            out.push(direction);
        }
        Ok(out)
    }
}

async fn pole_centroid(
    pole: &AnchorPole,
    store: &VectorStore,
    embedder: &dyn EmbeddingService,
    embed_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<Vec<f32>>, JuryscopeError> {
    let mut vectors = Vec::with_capacity(pole.seed_phrases.len());
    for phrase in &pole.seed_phrases {
        if let Some(v) = store
            .resolve_phrase(phrase, embedder, embed_timeout, cancel)
            .await?
        {
            vectors.push(v);
        }
    }
    Ok(mean_vector(vectors.iter().map(|v| v.as_slice())))
}
