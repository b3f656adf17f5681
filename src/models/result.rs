//! Analysis input and result documents.
//!
//! The result is self-contained: a renderer needs nothing beyond this
//! document to draw the graph, the axes, and the diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::{ClusteringMode, DimensionMode};
use crate::models::concept::{ConceptTree, JurorVector, MembershipWeight};
use crate::models::graph::{GraphLink, GraphNode};
use crate::models::sentence::Sentence;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One pole of a user-defined anchor axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorPole {
    pub label: String,
    pub seed_phrases: Vec<String>,
}

/// A user-defined semantic direction scored independently of PCA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorAxis {
    pub id: String,
    pub name: String,
    pub negative_pole: AnchorPole,
    pub positive_pole: AnchorPole,
}

/// Everything the engine consumes for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    pub sentences: Vec<Sentence>,
    /// Pre-computed vectors for terms and anchor seed phrases.
    #[serde(default)]
    pub term_embeddings: BTreeMap<String, Vec<f32>>,
    #[serde(default)]
    pub anchor_axes: Vec<AnchorAxis>,
}

// ---------------------------------------------------------------------------
// Hyperparameter search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    UnitWindow,
    Weights,
    K,
    Seed,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::UnitWindow => "unit_window",
            SearchKind::Weights => "weights",
            SearchKind::K => "k",
            SearchKind::Seed => "seed",
        }
    }
}

/// Parameters evaluated by one search trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateParams {
    UnitWindow {
        window: usize,
    },
    Weights {
        #[serde(rename = "semanticWeight")]
        semantic_weight: f32,
        #[serde(rename = "frequencyWeight")]
        frequency_weight: f32,
    },
    K {
        k: usize,
    },
    Seed {
        seed: u64,
    },
}

impl CandidateParams {
    pub fn kind(&self) -> SearchKind {
        match self {
            CandidateParams::UnitWindow { .. } => SearchKind::UnitWindow,
            CandidateParams::Weights { .. } => SearchKind::Weights,
            CandidateParams::K { .. } => SearchKind::K,
            CandidateParams::Seed { .. } => SearchKind::Seed,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CandidateParams::UnitWindow { window } => format!("window={}", window),
            CandidateParams::Weights {
                semantic_weight,
                frequency_weight,
            } => format!("semantic={:.2} frequency={:.2}", semantic_weight, frequency_weight),
            CandidateParams::K { k } => format!("k={}", k),
            CandidateParams::Seed { seed } => format!("seed={}", seed),
        }
    }
}

/// Raw objective terms of a trial. Penalties are stored as positive numbers
/// and subtracted by the composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    pub coherence: f64,
    pub separation: f64,
    pub stability: f64,
    pub dominance: f64,
    pub micro_clusters: f64,
    pub label_penalty: f64,
    #[serde(default)]
    pub k_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub params: CandidateParams,
    pub score: f64,
    pub component_scores: ComponentScores,
    pub valid: bool,
    /// Why the trial was invalid, when it was.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReport {
    pub kind: SearchKind,
    pub selected: Option<CandidateParams>,
    /// Every trial in candidate order, valid or not.
    pub leaderboard: Vec<CandidateResult>,
}

impl SearchReport {
    pub fn best(&self) -> Option<&CandidateResult> {
        self.leaderboard
            .iter()
            .filter(|c| c.valid)
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
    }
}

// ---------------------------------------------------------------------------
// Hygiene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Primary,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinSizeReport {
    pub min_cluster_size: usize,
    /// Cluster count before merging.
    pub before_size: usize,
    /// Cluster count after merging.
    pub after_size: usize,
    pub merged_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRecord {
    pub level: HierarchyLevel,
    pub round: usize,
    pub original_size: usize,
    pub resulting_sizes: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HygieneReport {
    pub min_size: Option<MinSizeReport>,
    pub splits: Vec<SplitRecord>,
    /// True when the dominance cap used every round and a cluster is still
    /// above the threshold.
    pub round_limit_hit: bool,
    /// True when a cluster is above the threshold after the cap, including
    /// clusters that could not be split at all.
    #[serde(default)]
    pub still_dominant: bool,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisLabel {
    pub axis_index: usize,
    pub name: String,
    pub negative_pole: String,
    pub positive_pole: String,
    /// Node anchoring the negative pole (minimal signed coordinate).
    pub negative_node_id: String,
    /// Node anchoring the positive pole (maximal signed coordinate).
    pub positive_node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub dimension_mode: DimensionMode,
    pub applied_num_dimensions: usize,
    pub explained_variances: Vec<f64>,
    pub cumulative_variances: Vec<f64>,
    pub total_variance: f64,
    pub axis_labels: Vec<AxisLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorAxisScores {
    pub id: String,
    pub name: String,
    pub negative_label: String,
    pub positive_label: String,
    /// Node id to signed projection.
    pub scores: BTreeMap<String, f32>,
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRejection {
    pub concept_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelReport {
    pub rule_based: usize,
    pub synthesized: usize,
    pub rejected: Vec<LabelRejection>,
    /// Failed or timed-out synthesizer calls.
    pub service_failures: usize,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChosenParameters {
    pub k: usize,
    pub seed: u64,
    pub unit_window: usize,
    pub semantic_weight: f32,
    pub frequency_weight: f32,
    pub clustering_mode: ClusteringMode,
    pub soft_membership: bool,
    pub min_cluster_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub searches: Vec<SearchReport>,
    pub hygiene: HygieneReport,
    pub labels: LabelReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub parameters: ChosenParameters,
    pub concepts: ConceptTree,
    /// Sentence id to primary concept id.
    pub assignments: BTreeMap<String, String>,
    pub memberships: Vec<MembershipWeight>,
    pub juror_vectors: BTreeMap<String, JurorVector>,
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
    pub projection: ProjectionSummary,
    pub anchor_axes: Vec<AnchorAxisScores>,
    pub diagnostics: Diagnostics,
}

impl AnalysisResult {
    pub fn search(&self, kind: SearchKind) -> Option<&SearchReport> {
        self.diagnostics.searches.iter().find(|s| s.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_params_tagged_serialization() {
        let params = CandidateParams::Weights {
            semantic_weight: 0.75,
            frequency_weight: 0.25,
        };
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["kind"], "weights");
        assert_eq!(json["semanticWeight"], 0.75);

        let back: CandidateParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
        assert_eq!(back.kind(), SearchKind::Weights);
    }

    #[test]
    fn test_search_report_best_ignores_invalid() {
        let report = SearchReport {
            kind: SearchKind::K,
            selected: None,
            leaderboard: vec![
                CandidateResult {
                    params: CandidateParams::K { k: 2 },
                    score: 0.4,
                    component_scores: ComponentScores::default(),
                    valid: true,
                    reason: None,
                },
                CandidateResult {
                    params: CandidateParams::K { k: 9 },
                    score: 5.0,
                    component_scores: ComponentScores::default(),
                    valid: false,
                    reason: Some("k exceeds distinct vectors".into()),
                },
            ],
        };
        assert_eq!(report.best().unwrap().params, CandidateParams::K { k: 2 });
    }
}
