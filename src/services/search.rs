//! Hyperparameter search.
//!
//! One search routine runs every kind: it enumerates the candidate set for a
//! [`SearchKind`], evaluates candidates in parallel against the current
//! [`Choice`] of the other parameters, and keeps the best valid one. Invalid
//! (degenerate) candidates stay on the leaderboard with `valid = false`.
//!
//! With several searches enabled they run in the fixed order
//! unit window, weights, K, seed; each winner is fed forward.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand_xoshiro::rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{AnalysisConfig, CutType};
use crate::models::{
    CandidateParams, CandidateResult, ComponentScores, HierarchyLevel, SearchKind, SearchReport,
    Sentence,
};
use crate::services::cancel::CancellationToken;
use crate::services::clustering::{cluster, ClusterOptions, Partition};
use crate::services::evidence::{rank_representatives, EvidenceCandidate, EvidenceWeights};
use crate::services::hygiene;
use crate::services::progress::RunProgress;
use crate::services::scoring::{
    bootstrap_stability, coherence, composite_score, dominance_penalty, label_penalty,
    micro_cluster_penalty, perturbation_stability, separation,
};
use crate::services::terms::TermScorer;
use crate::utils::math::{cosine_similarity, mean_vector};
use crate::JuryscopeError;

/// Current value of every searchable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Choice {
    pub window: usize,
    pub semantic_weight: f32,
    pub frequency_weight: f32,
    pub k: usize,
    pub seed: u64,
}

impl Choice {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            window: 1,
            semantic_weight: config.graph.semantic_weight,
            frequency_weight: config.graph.frequency_weight,
            k: config.clustering.k_concepts,
            seed: config.clustering.cluster_seed,
        }
    }

    /// This choice with one parameter replaced by a candidate's value.
    pub fn with(mut self, params: CandidateParams) -> Self {
        match params {
            CandidateParams::UnitWindow { window } => self.window = window,
            CandidateParams::Weights {
                semantic_weight,
                frequency_weight,
            } => {
                self.semantic_weight = semantic_weight;
                self.frequency_weight = frequency_weight;
            }
            CandidateParams::K { k } => self.k = k,
            CandidateParams::Seed { seed } => self.seed = seed,
        }
        self
    }
}

/// Inclusive K range searched for a corpus of `n` units.
pub fn k_range(config: &AnalysisConfig, n: usize) -> (usize, usize) {
    let k_min = config.search.k_min_override.unwrap_or(2);
    let default_max = (n / 2).min(12).max(k_min);
    let k_max = config.search.k_max_override.unwrap_or(default_max);
    (k_min, k_max.max(k_min))
}

/// Seeds tried by seed search; the configured seed always comes first.
pub fn seed_candidates(base: u64, count: usize) -> Vec<u64> {
    let mut rng = Xoshiro256Plus::seed_from_u64(base);
    let mut seeds = vec![base];
    while seeds.len() < count {
        let s = rng.next_u64();
        if !seeds.contains(&s) {
            seeds.push(s);
        }
    }
    seeds.truncate(count.max(1));
    seeds
}

/// Search engine over prepared unit sets.
pub struct SearchEngine<'a> {
    config: &'a AnalysisConfig,
    /// Unit set per window, every window in `config.search.unit_windows` plus 1.
    units: &'a BTreeMap<usize, Vec<Sentence>>,
    scorer: &'a dyn TermScorer,
    cancel: &'a CancellationToken,
    progress: &'a RunProgress,
}

impl<'a> SearchEngine<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        units: &'a BTreeMap<usize, Vec<Sentence>>,
        scorer: &'a dyn TermScorer,
        cancel: &'a CancellationToken,
        progress: &'a RunProgress,
    ) -> Self {
        Self {
            config,
            units,
            scorer,
            cancel,
            progress,
        }
    }

    /// Enabled searches, in run order.
    pub fn enabled_kinds(&self) -> Vec<SearchKind> {
        let s = &self.config.search;
        [
            (s.auto_unit, SearchKind::UnitWindow),
            (s.auto_weights, SearchKind::Weights),
            (s.auto_k, SearchKind::K),
            (s.auto_seed, SearchKind::Seed),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .map(|(_, kind)| kind)
        .collect()
    }

    /// Run every enabled search in order within the `[start, end]` progress
    /// band, feeding each winner into the next.
    pub fn run_enabled(
        &self,
        mut choice: Choice,
        band: (u8, u8),
    ) -> Result<(Choice, Vec<SearchReport>), JuryscopeError> {
        let kinds = self.enabled_kinds();
        let mut reports = Vec::with_capacity(kinds.len());
        let span = band.1.saturating_sub(band.0) as usize;
        for (i, kind) in kinds.iter().enumerate() {
            let start = band.0 + (span * i / kinds.len()) as u8;
            let end = band.0 + (span * (i + 1) / kinds.len()) as u8;
            let report = self.run(*kind, choice, (start, end))?;
            if let Some(selected) = report.selected {
                choice = choice.with(selected);
            }
            reports.push(report);
        }
        Ok((choice, reports))
    }

    pub fn candidates(&self, kind: SearchKind, choice: Choice) -> Vec<CandidateParams> {
        let s = &self.config.search;
        match kind {
            SearchKind::UnitWindow => {
                let mut windows = s.unit_windows.clone();
                windows.sort_unstable();
                windows.dedup();
                windows
                    .into_iter()
                    .map(|window| CandidateParams::UnitWindow { window })
                    .collect()
            }
            SearchKind::Weights => {
                let steps = s.weight_grid_steps.max(2);
                (0..steps)
                    .map(|i| {
                        let semantic = i as f32 / (steps - 1) as f32;
                        CandidateParams::Weights {
                            semantic_weight: semantic,
                            frequency_weight: 1.0 - semantic,
                        }
                    })
                    .collect()
            }
            SearchKind::K => {
                let n = self.units.get(&choice.window).map(|u| u.len()).unwrap_or(0);
                let (k_min, k_max) = k_range(self.config, n);
                (k_min..=k_max).map(|k| CandidateParams::K { k }).collect()
            }
            SearchKind::Seed => seed_candidates(self.config.clustering.cluster_seed, s.seed_candidates)
                .into_iter()
                .map(|seed| CandidateParams::Seed { seed })
                .collect(),
        }
    }

    /// Evaluate one search kind. Candidates run on the rayon pool; the
    /// leaderboard keeps candidate order, and ties go to the earlier candidate.
    pub fn run(
        &self,
        kind: SearchKind,
        choice: Choice,
        band: (u8, u8),
    ) -> Result<SearchReport, JuryscopeError> {
        let candidates = self.candidates(kind, choice);
        info!(
            search = kind.as_str(),
            candidates = candidates.len(),
            "starting search"
        );
        let total = candidates.len();
        let completed = AtomicUsize::new(0);
        let step = format!("{} search", kind.as_str());

        let leaderboard = candidates
            .par_iter()
            .map(|params| -> Result<CandidateResult, JuryscopeError> {
                self.cancel.check()?;
                let result = self.evaluate(choice, *params);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                self.progress.update_within(band.0, band.1, done, total, &step);
                Ok(result)
            })
            .collect::<Result<Vec<_>, JuryscopeError>>()?;
        self.cancel.check()?;

        let mut selected: Option<&CandidateResult> = None;
        for c in leaderboard.iter().filter(|c| c.valid) {
            if selected.map_or(true, |best| c.score > best.score) {
                selected = Some(c);
            }
        }
        let selected = selected.map(|c| c.params);

        match selected {
            Some(params) => info!(search = kind.as_str(), "selected {}", params.describe()),
            None => warn!(
                search = kind.as_str(),
                "no valid candidate; keeping current parameters"
            ),
        }

        Ok(SearchReport {
            kind,
            selected,
            leaderboard,
        })
    }

    /// Score one candidate. Degenerate configurations become invalid results.
    pub fn evaluate(&self, choice: Choice, params: CandidateParams) -> CandidateResult {
        match self.trial(choice, params) {
            Ok(components) => {
                let score = composite_score(&components, &self.config.search.weights);
                debug!(candidate = %params.describe(), score, "candidate scored");
                CandidateResult {
                    params,
                    score,
                    component_scores: components,
                    valid: true,
                    reason: None,
                }
            }
            Err(e) => {
                debug!(candidate = %params.describe(), "candidate invalid: {}", e);
                CandidateResult {
                    params,
                    // Never selected; kept finite so results serialize.
                    score: 0.0,
                    component_scores: ComponentScores::default(),
                    valid: false,
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    fn trial(&self, choice: Choice, params: CandidateParams) -> Result<ComponentScores, JuryscopeError> {
        let choice = choice.with(params);
        let units = self
            .units
            .get(&choice.window)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                JuryscopeError::DegenerateClustering(format!(
                    "no text units for window {}",
                    choice.window
                ))
            })?;
        let vectors: Vec<&[f32]> = units.iter().map(|u| u.embedding.as_slice()).collect();

        let mut options = ClusterOptions::from_config(&self.config.clustering)
            .with_k(choice.k)
            .with_seed(choice.seed);
        if params.kind() == SearchKind::K {
            options.cut_type = CutType::Count;
        }

        let output = cluster(&vectors, &options)?;
        let outcome = hygiene::apply(
            &vectors,
            output.partition,
            &self.config.hygiene,
            &options,
            HierarchyLevel::Primary,
            vectors.len(),
        );
        let partition = outcome.partition;
        if partition.sizes().iter().any(|s| *s == 0) {
            return Err(JuryscopeError::DegenerateClustering(
                "hygiene left an empty cluster".to_string(),
            ));
        }

        if let CandidateParams::Weights {
            semantic_weight,
            frequency_weight,
        } = params
        {
            return Ok(self.evidence_components(
                units,
                &partition,
                EvidenceWeights::new(semantic_weight, frequency_weight),
            ));
        }

        let search = &self.config.search;
        let min_size = self.config.hygiene.effective_min_cluster_size(vectors.len());
        let mut c = ComponentScores {
            coherence: coherence(&vectors, &partition),
            separation: separation(&partition),
            stability: bootstrap_stability(
                &vectors,
                &partition,
                &options,
                search.bootstrap_rounds,
                search.bootstrap_fraction,
            ),
            dominance: dominance_penalty(&partition, self.config.hygiene.dominance_cap_threshold),
            micro_clusters: micro_cluster_penalty(&partition, min_size),
            label_penalty: 0.0,
            k_penalty: 0.0,
        };

        match params {
            CandidateParams::K { k } => {
                c.k_penalty = search.k_penalty_per_unit * k as f64;
            }
            CandidateParams::Seed { .. } => {
                c.label_penalty = label_penalty(&self.cluster_top_terms(units, &partition));
                if let Some(perturbed) = perturbation_stability(
                    &vectors,
                    &partition,
                    &options,
                    search.seed_perturbations,
                    search.perturbation_noise,
                ) {
                    c.stability = (c.stability + perturbed) / 2.0;
                }
            }
            _ => {}
        }
        Ok(c)
    }

    fn cluster_top_terms(&self, units: &[Sentence], partition: &Partition) -> Vec<Vec<String>> {
        (0..partition.k())
            .map(|c| {
                let texts: Vec<&str> = partition
                    .members(c)
                    .iter()
                    .map(|i| units[*i].text.as_str())
                    .collect();
                self.scorer
                    .top_terms(&texts, self.config.graph.top_term_count)
            })
            .collect()
    }

    /// Evidence-ranking objective on a fixed partition: how close the chosen
    /// representatives sit to their centroid, how distinct the representative
    /// sets are across concepts, and how much their vocabularies overlap.
    fn evidence_components(
        &self,
        units: &[Sentence],
        partition: &Partition,
        weights: EvidenceWeights,
    ) -> ComponentScores {
        let count = self.config.graph.representative_count;
        let top_terms = self.cluster_top_terms(units, partition);

        let mut rep_similarity = Vec::new();
        let mut rep_means = Vec::new();
        let mut rep_terms = Vec::new();
        for c in 0..partition.k() {
            let members = partition.members(c);
            let candidates: Vec<EvidenceCandidate<'_>> = members
                .iter()
                .map(|i| EvidenceCandidate {
                    text: &units[*i].text,
                    embedding: &units[*i].embedding,
                })
                .collect();
            let centroid = &partition.centroids()[c];
            let chosen = rank_representatives(
                &candidates,
                centroid,
                &top_terms[c],
                weights,
                self.scorer,
                count,
            );
            for i in &chosen {
                rep_similarity.push(cosine_similarity(candidates[*i].embedding, centroid) as f64);
            }
            if let Some(mean) = mean_vector(chosen.iter().map(|i| candidates[*i].embedding)) {
                rep_means.push(mean);
            }
            let texts: Vec<&str> = chosen.iter().map(|i| candidates[*i].text).collect();
            rep_terms.push(self.scorer.top_terms(&texts, self.config.graph.top_term_count));
        }

        let coherence = if rep_similarity.is_empty() {
            0.0
        } else {
            rep_similarity.iter().sum::<f64>() / rep_similarity.len() as f64
        };
        let rep_labels: Vec<usize> = (0..rep_means.len()).collect();
        let rep_partition = Partition::from_labels(&rep_means, &rep_labels);

        ComponentScores {
            coherence,
            separation: separation(&rep_partition),
            label_penalty: label_penalty(&rep_terms),
            ..ComponentScores::default()
        }
    }
}
