//! Analysis configuration.
//!
//! Every field has a default, so a partial TOML file or JSON env override
//! only needs to name what it changes. Loaded from an explicit file,
//! `{data_path}/analysis.toml`, or the `JURYSCOPE_CONFIG` env var (JSON).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::JuryscopeError;

pub const CONFIG_ENV_VAR: &str = "JURYSCOPE_CONFIG";
pub const CONFIG_FILE_NAME: &str = "analysis.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringMode {
    #[default]
    Kmeans,
    Hierarchical,
}

/// How a hierarchical dendrogram is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutType {
    /// Cut to exactly `k` clusters.
    #[default]
    Count,
    /// Cut at a percentile of the merge-distance range.
    Granularity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionMode {
    #[default]
    Manual,
    Elbow,
    Threshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusteringConfig {
    pub k_concepts: usize,
    pub clustering_mode: ClusteringMode,
    pub cut_type: CutType,
    pub granularity_percent: f64,
    pub cluster_seed: u64,
    pub soft_membership: bool,
    pub softmax_temperature: f32,
    pub membership_floor: f32,
    pub max_iterations: u64,
    pub tolerance: f64,
    pub enable_detail: bool,
    /// Primary concepts smaller than this are not subdivided.
    pub detail_min_size: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k_concepts: 6,
            clustering_mode: ClusteringMode::Kmeans,
            cut_type: CutType::Count,
            granularity_percent: 50.0,
            cluster_seed: 42,
            soft_membership: false,
            softmax_temperature: 0.1,
            membership_floor: 0.05,
            max_iterations: 300,
            tolerance: 1e-4,
            enable_detail: true,
            detail_min_size: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HygieneConfig {
    pub enable_min_size: bool,
    /// `None` derives `max(2, round(n * 0.02))` from the corpus size.
    pub min_cluster_size: Option<usize>,
    /// Opt-in: splitting can return more concepts than `kConcepts`.
    pub enable_dominance_cap: bool,
    pub dominance_cap_threshold: f64,
    pub max_split_rounds: usize,
}

impl Default for HygieneConfig {
    fn default() -> Self {
        Self {
            enable_min_size: true,
            min_cluster_size: None,
            enable_dominance_cap: false,
            dominance_cap_threshold: 0.35,
            max_split_rounds: 4,
        }
    }
}

impl HygieneConfig {
    pub fn effective_min_cluster_size(&self, total_sentences: usize) -> usize {
        self.min_cluster_size
            .unwrap_or_else(|| ((total_sentences as f64 * 0.02).round() as usize).max(2))
    }
}

/// Weights of the composite search objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreWeights {
    pub coherence: f64,
    pub separation: f64,
    pub stability: f64,
    pub dominance: f64,
    pub micro_clusters: f64,
    pub label: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            coherence: 1.0,
            separation: 1.0,
            stability: 0.5,
            dominance: 1.0,
            micro_clusters: 0.5,
            label: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    pub auto_k: bool,
    pub auto_seed: bool,
    pub auto_unit: bool,
    pub auto_weights: bool,
    pub k_min_override: Option<usize>,
    pub k_max_override: Option<usize>,
    pub seed_candidates: usize,
    pub seed_perturbations: usize,
    pub perturbation_noise: f32,
    pub unit_windows: Vec<usize>,
    /// Number of semantic-weight steps in `[0, 1]` (inclusive ends).
    pub weight_grid_steps: usize,
    pub bootstrap_rounds: usize,
    pub bootstrap_fraction: f64,
    pub k_penalty_per_unit: f64,
    pub weights: ScoreWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            auto_k: false,
            auto_seed: false,
            auto_unit: false,
            auto_weights: false,
            k_min_override: None,
            k_max_override: None,
            seed_candidates: 8,
            seed_perturbations: 0,
            perturbation_noise: 0.02,
            unit_windows: vec![1, 2, 3],
            weight_grid_steps: 5,
            bootstrap_rounds: 3,
            bootstrap_fraction: 0.8,
            k_penalty_per_unit: 0.01,
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectionConfig {
    pub dimension_mode: DimensionMode,
    pub num_dimensions: usize,
    pub variance_threshold: f64,
    pub elbow_fraction: f64,
    pub max_dimensions: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            dimension_mode: DimensionMode::Manual,
            num_dimensions: 3,
            variance_threshold: 0.8,
            elbow_fraction: 0.25,
            max_dimensions: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphConfig {
    pub min_edge_weight: f32,
    pub similarity_threshold: f32,
    pub representative_count: usize,
    pub semantic_weight: f32,
    pub frequency_weight: f32,
    pub top_term_count: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_edge_weight: 0.05,
            similarity_threshold: 0.6,
            representative_count: 8,
            semantic_weight: 0.7,
            frequency_weight: 0.3,
            top_term_count: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub max_concurrency: usize,
    pub cache_ttl_secs: u64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 15_000,
            max_concurrency: 4,
            cache_ttl_secs: 600,
        }
    }
}

/// Calls to the embedding service for seed phrases missing from the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    pub clustering: ClusteringConfig,
    pub hygiene: HygieneConfig,
    pub search: SearchConfig,
    pub projection: ProjectionConfig,
    pub graph: GraphConfig,
    pub labels: LabelConfig,
    pub embedding: EmbeddingConfig,
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

impl AnalysisConfig {
    /// Reject contradictory or out-of-range parameters.
    pub fn validate(&self) -> Result<(), JuryscopeError> {
        let c = &self.clustering;
        let s = &self.search;

        if c.k_concepts == 0 {
            return Err(JuryscopeError::Configuration(
                "kConcepts must be at least 1".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (s.k_min_override, s.k_max_override) {
            if min > max {
                return Err(JuryscopeError::Configuration(format!(
                    "kMinOverride ({}) is greater than kMaxOverride ({})",
                    min, max
                )));
            }
        }
        if s.k_min_override == Some(0) {
            return Err(JuryscopeError::Configuration(
                "kMinOverride must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&c.granularity_percent) {
            return Err(JuryscopeError::Configuration(format!(
                "granularityPercent must be within [0, 100], got {}",
                c.granularity_percent
            )));
        }
        if c.softmax_temperature <= 0.0 {
            return Err(JuryscopeError::Configuration(
                "softmaxTemperature must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&c.membership_floor) {
            return Err(JuryscopeError::Configuration(format!(
                "membershipFloor must be within [0, 1), got {}",
                c.membership_floor
            )));
        }
        if !in_unit_interval(self.hygiene.dominance_cap_threshold) {
            return Err(JuryscopeError::Configuration(format!(
                "dominanceCapThreshold must be within (0, 1], got {}",
                self.hygiene.dominance_cap_threshold
            )));
        }
        if s.unit_windows.is_empty() || s.unit_windows.contains(&0) {
            return Err(JuryscopeError::Configuration(
                "unitWindows must be a non-empty list of positive window sizes".to_string(),
            ));
        }
        if s.weight_grid_steps < 2 {
            return Err(JuryscopeError::Configuration(
                "weightGridSteps must be at least 2".to_string(),
            ));
        }
        if s.auto_seed && s.seed_candidates == 0 {
            return Err(JuryscopeError::Configuration(
                "autoSeed requires seedCandidates > 0".to_string(),
            ));
        }
        if !in_unit_interval(s.bootstrap_fraction) {
            return Err(JuryscopeError::Configuration(format!(
                "bootstrapFraction must be within (0, 1], got {}",
                s.bootstrap_fraction
            )));
        }
        let w = &s.weights;
        if [
            w.coherence,
            w.separation,
            w.stability,
            w.dominance,
            w.micro_clusters,
            w.label,
            s.k_penalty_per_unit,
        ]
        .iter()
        .any(|v| *v < 0.0 || !v.is_finite())
        {
            return Err(JuryscopeError::Configuration(
                "score weights must be finite and non-negative".to_string(),
            ));
        }

        let p = &self.projection;
        if p.num_dimensions == 0 || p.max_dimensions == 0 {
            return Err(JuryscopeError::Configuration(
                "numDimensions and maxDimensions must be at least 1".to_string(),
            ));
        }
        if !in_unit_interval(p.variance_threshold) {
            return Err(JuryscopeError::Configuration(format!(
                "varianceThreshold must be within (0, 1], got {}",
                p.variance_threshold
            )));
        }
        if !in_unit_interval(p.elbow_fraction) {
            return Err(JuryscopeError::Configuration(format!(
                "elbowFraction must be within (0, 1], got {}",
                p.elbow_fraction
            )));
        }

        let g = &self.graph;
        if g.semantic_weight < 0.0
            || g.frequency_weight < 0.0
            || ((g.semantic_weight + g.frequency_weight) - 1.0).abs() > 1e-6
        {
            return Err(JuryscopeError::Configuration(format!(
                "semanticWeight ({}) and frequencyWeight ({}) must be non-negative and sum to 1",
                g.semantic_weight, g.frequency_weight
            )));
        }
        if !(0.0..=1.0).contains(&g.similarity_threshold) || !(0.0..=1.0).contains(&g.min_edge_weight)
        {
            return Err(JuryscopeError::Configuration(
                "similarityThreshold and minEdgeWeight must be within [0, 1]".to_string(),
            ));
        }
        if g.representative_count == 0 {
            return Err(JuryscopeError::Configuration(
                "representativeCount must be at least 1".to_string(),
            ));
        }
        if self.embedding.timeout_ms == 0 || self.labels.timeout_ms == 0 {
            return Err(JuryscopeError::Configuration(
                "embedding and label timeouts must be at least 1ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, JuryscopeError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String, JuryscopeError> {
        toml::to_string_pretty(self)
            .map_err(|e| JuryscopeError::Serialization(format!("TOML error: {}", e)))
    }
}

/// Load analysis config with priority:
/// 1. explicit file (errors are fatal: the caller asked for it)
/// 2. `{data_path}/analysis.toml`
/// 3. `JURYSCOPE_CONFIG` env var (JSON)
/// 4. defaults
pub fn load_config(
    explicit: Option<&Path>,
    data_path: &Path,
) -> Result<AnalysisConfig, JuryscopeError> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            JuryscopeError::Configuration(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = AnalysisConfig::from_toml_str(&contents)?;
        info!("Loaded analysis config from {}", path.display());
        return Ok(config);
    }

    let config_path = data_path.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match AnalysisConfig::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded analysis config from {}", config_path.display());
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {}. Using default.",
                        config_path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read {}: {}. Using default.",
                    config_path.display(),
                    e
                );
            }
        }
    }

    if let Ok(json) = std::env::var(CONFIG_ENV_VAR) {
        match serde_json::from_str::<AnalysisConfig>(&json) {
            Ok(config) => {
                info!("Loaded analysis config from {} env", CONFIG_ENV_VAR);
                return Ok(config);
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}. Using default.", CONFIG_ENV_VAR, e);
            }
        }
    }

    Ok(AnalysisConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn test_k_overrides_contradiction_rejected() {
        let mut config = AnalysisConfig::default();
        config.search.k_min_override = Some(8);
        config.search.k_max_override = Some(3);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, JuryscopeError::Configuration(_)));
        assert!(err.to_string().contains("kMinOverride"));
    }

    #[test]
    fn test_evidence_weights_must_sum_to_one() {
        let mut config = AnalysisConfig::default();
        config.graph.semantic_weight = 0.8;
        config.graph.frequency_weight = 0.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [clustering]
            kConcepts = 3
            clusteringMode = "hierarchical"

            [search]
            autoK = true
            kMaxOverride = 9
        "#;
        let config = AnalysisConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.clustering.k_concepts, 3);
        assert_eq!(config.clustering.clustering_mode, ClusteringMode::Hierarchical);
        assert_eq!(config.clustering.cluster_seed, 42);
        assert!(config.search.auto_k);
        assert_eq!(config.search.k_max_override, Some(9));
        assert_eq!(config.hygiene.dominance_cap_threshold, 0.35);
        assert!(!config.hygiene.enable_dominance_cap);
        assert_eq!(config.embedding.timeout_ms, 10_000);
    }

    #[test]
    fn test_embedding_timeout_section() {
        let config = AnalysisConfig::from_toml_str("[embedding]\ntimeoutMs = 250\n").unwrap();
        assert_eq!(config.embedding.timeout(), Duration::from_millis(250));
        config.validate().unwrap();

        let mut zero = AnalysisConfig::default();
        zero.embedding.timeout_ms = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_effective_min_cluster_size() {
        let hygiene = HygieneConfig::default();
        assert_eq!(hygiene.effective_min_cluster_size(10), 2);
        assert_eq!(hygiene.effective_min_cluster_size(500), 10);
        let explicit = HygieneConfig {
            min_cluster_size: Some(4),
            ..Default::default()
        };
        assert_eq!(explicit.effective_min_cluster_size(500), 4);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AnalysisConfig::default();
        let text = config.to_toml_string().unwrap();
        let back = AnalysisConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_load_config_prefers_data_path_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("analysis.toml"),
            "[clustering]\nkConcepts = 4\n",
        )
        .unwrap();
        let config = load_config(None, dir.path()).unwrap();
        assert_eq!(config.clustering.k_concepts, 4);
    }

    #[test]
    fn test_load_config_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing), dir.path()).is_err());
    }
}
