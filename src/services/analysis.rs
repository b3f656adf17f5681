//! End-to-end analysis run.
//!
//! The numeric pipeline (units, search, clustering, hygiene, detail
//! clustering, concepts, projection) runs on a blocking worker so the rayon
//! search never stalls the async runtime. Anchor resolution and label
//! synthesis follow on the async side, then the graph is assembled.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AnalysisConfig, LabelConfig};
use crate::embedding::{EmbeddingService, NoopEmbeddingService, VectorStore};
use crate::models::{
    concept_node_id, juror_node_id, AnalysisInput, AnalysisResult, AnchorAxisScores,
    ChosenParameters, Concept, ConceptLevel, ConceptTree, Diagnostics, GraphNode, HierarchyLevel,
    HygieneReport, JurorVector, LabelSource, MembershipWeight, NodeKind, SearchReport, Sentence,
    StructuralRole,
};
use crate::services::anchors::AnchorSet;
use crate::services::cancel::CancellationToken;
use crate::services::clustering::{assign_memberships, cluster, cluster_detail, ClusterOptions};
use crate::services::evidence::{rank_representatives, EvidenceCandidate, EvidenceWeights};
use crate::services::graph::{juror_vectors, GraphAssembler};
use crate::services::hygiene;
use crate::services::labeling::{
    rule_label, CachedLabelSynthesizer, LabelService, LabelSynthesizer, NoopLabelSynthesizer,
};
use crate::services::progress::{ProgressReporter, RunProgress};
use crate::services::projection::{project, Projection};
use crate::services::search::{k_range, Choice, SearchEngine};
use crate::services::terms::{Bm25Scorer, TermScorer};
use crate::services::units::units_for_window;
use crate::utils::math::mean_vector;
use crate::JuryscopeError;

/// Runs analyses. Holds the collaborators plus the anchor-direction and
/// label caches shared by successive runs.
pub struct AnalysisService {
    embedder: Arc<dyn EmbeddingService>,
    synthesizer: Arc<dyn LabelSynthesizer>,
    anchors: Mutex<AnchorSet>,
}

impl Default for AnalysisService {
    fn default() -> Self {
        Self::new(
            Arc::new(NoopEmbeddingService::new()),
            Arc::new(NoopLabelSynthesizer),
            &LabelConfig::default(),
        )
    }
}

impl AnalysisService {
    /// Successful syntheses are cached by evidence fingerprint for
    /// `labels.cache_ttl_secs`; zero disables the cache.
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        synthesizer: Arc<dyn LabelSynthesizer>,
        labels: &LabelConfig,
    ) -> Self {
        let synthesizer: Arc<dyn LabelSynthesizer> = if labels.cache_ttl_secs > 0 {
            Arc::new(CachedLabelSynthesizer::new(synthesizer, labels.cache_ttl_secs))
        } else {
            synthesizer
        };
        Self {
            embedder,
            synthesizer,
            anchors: Mutex::new(AnchorSet::new()),
        }
    }

    /// Run a full analysis.
    ///
    /// Emits monotonic progress and exactly one terminal event: `done` on
    /// success, `error` on any failure including cancellation.
    pub async fn analyze(
        &self,
        input: AnalysisInput,
        config: &AnalysisConfig,
        progress: Arc<dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, JuryscopeError> {
        let run = Arc::new(RunProgress::new(progress));
        let result = self.run(input, config, cancel, &run).await;
        match &result {
            Ok(r) => {
                info!(
                    run_id = %r.run_id,
                    concepts = r.concepts.primary.len(),
                    nodes = r.nodes.len(),
                    links = r.links.len(),
                    "analysis complete"
                );
                run.done("analysis complete");
            }
            Err(e) => {
                warn!("analysis failed: {}", e);
                run.fail(&e.to_string());
            }
        }
        result
    }

    async fn run(
        &self,
        input: AnalysisInput,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
        run: &Arc<RunProgress>,
    ) -> Result<AnalysisResult, JuryscopeError> {
        config.validate()?;
        run.update(2, "configuration validated");

        let AnalysisInput {
            sentences,
            term_embeddings,
            anchor_axes,
        } = input;
        let store = Arc::new(VectorStore::new(sentences, term_embeddings)?);
        let base_count = store.sentences_for_window(1).len();
        let required = if config.search.auto_k {
            k_range(config, base_count).0
        } else {
            config.clustering.k_concepts
        };
        if base_count < required {
            return Err(JuryscopeError::Input(format!(
                "{} sentences cannot form {} concepts",
                base_count, required
            )));
        }
        info!(
            sentences = base_count,
            jurors = store.jurors().len(),
            dims = store.dims(),
            "starting analysis"
        );
        run.update(5, "embeddings loaded");
        cancel.check()?;

        let worker = {
            let store = store.clone();
            let config = config.clone();
            let cancel = cancel.clone();
            let run = run.clone();
            tokio::task::spawn_blocking(move || numeric_phase(&store, &config, &cancel, &run))
        };
        let mut numeric = match worker.await {
            Ok(outcome) => outcome?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => return Err(JuryscopeError::Cancelled),
        };
        cancel.check()?;

        let directions = {
            let mut anchors = self.anchors.lock().await;
            anchors
                .resolve(
                    &anchor_axes,
                    &store,
                    self.embedder.as_ref(),
                    config.embedding.timeout(),
                    cancel,
                )
                .await?
        };
        let anchor_scores: Vec<AnchorAxisScores> = directions
            .iter()
            .map(|d| {
                d.score_nodes(
                    numeric
                        .node_ids
                        .iter()
                        .zip(numeric.node_vectors.iter())
                        .map(|(id, v)| (id.as_str(), v.as_slice())),
                )
            })
            .collect();
        run.update(88, "anchor axes scored");
        cancel.check()?;

        let texts: HashMap<String, String> = numeric
            .units
            .iter()
            .map(|u| (u.id.clone(), u.text.clone()))
            .collect();
        let labeler = LabelService::new(self.synthesizer.clone(), config.labels.clone());
        let label_report = labeler
            .label_concepts(&mut numeric.tree, &texts, cancel)
            .await?;
        run.update(92, "concepts labeled");

        let nodes = build_nodes(&numeric);
        let graph = GraphAssembler::new(&config.graph).assemble(
            nodes,
            &numeric.units,
            &numeric.memberships,
            &numeric.tree.primary,
            &numeric.juror_vectors,
        );
        run.update(96, "graph assembled");
        cancel.check()?;

        let choice = numeric.choice;
        Ok(AnalysisResult {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            parameters: ChosenParameters {
                k: choice.k,
                seed: choice.seed,
                unit_window: choice.window,
                semantic_weight: choice.semantic_weight,
                frequency_weight: choice.frequency_weight,
                clustering_mode: config.clustering.clustering_mode,
                soft_membership: config.clustering.soft_membership,
                min_cluster_size: config.hygiene.effective_min_cluster_size(numeric.units.len()),
            },
            concepts: numeric.tree,
            assignments: numeric.assignments,
            memberships: numeric.memberships,
            juror_vectors: numeric.juror_vectors,
            nodes: graph.nodes,
            links: graph.links,
            projection: numeric.projection.summary,
            anchor_axes: anchor_scores,
            diagnostics: Diagnostics {
                searches: numeric.searches,
                hygiene: numeric.hygiene,
                labels: label_report,
            },
        })
    }
}

/// What a graph node stands for.
enum NodeSubject {
    Juror { name: String, sentences: usize },
    Concept(String),
}

/// Output of the synchronous half of a run.
struct NumericOutcome {
    choice: Choice,
    searches: Vec<SearchReport>,
    units: Vec<Sentence>,
    tree: ConceptTree,
    memberships: Vec<MembershipWeight>,
    assignments: BTreeMap<String, String>,
    hygiene: HygieneReport,
    juror_vectors: BTreeMap<String, JurorVector>,
    node_ids: Vec<String>,
    node_subjects: Vec<NodeSubject>,
    node_vectors: Vec<Vec<f32>>,
    projection: Projection,
}

fn primary_id(cluster: usize) -> String {
    format!("c{}", cluster)
}

fn numeric_phase(
    store: &VectorStore,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
    run: &RunProgress,
) -> Result<NumericOutcome, JuryscopeError> {
    let mut windows = BTreeSet::from([1usize]);
    if config.search.auto_unit {
        windows.extend(config.search.unit_windows.iter().copied());
    }
    let units_by_window: BTreeMap<usize, Vec<Sentence>> = windows
        .into_iter()
        .map(|w| (w, units_for_window(store, w)))
        .collect();
    run.update(8, "text units prepared");

    let base = store.sentences_for_window(1);
    let corpus: Vec<&str> = base.iter().map(|s| s.text.as_str()).collect();
    let scorer = Bm25Scorer::fit(&corpus);

    let engine = SearchEngine::new(config, &units_by_window, &scorer, cancel, run);
    let (choice, searches) = engine.run_enabled(Choice::from_config(config), (10, 60))?;
    cancel.check()?;

    let units = units_by_window
        .get(&choice.window)
        .cloned()
        .unwrap_or_default();
    let vectors: Vec<&[f32]> = units.iter().map(|u| u.embedding.as_slice()).collect();
    if vectors.len() < choice.k {
        return Err(JuryscopeError::Input(format!(
            "{} text units cannot form {} concepts",
            vectors.len(),
            choice.k
        )));
    }

    let options = ClusterOptions::from_config(&config.clustering)
        .with_k(choice.k)
        .with_seed(choice.seed);
    let output = cluster(&vectors, &options).map_err(|e| {
        JuryscopeError::Input(format!(
            "cannot partition {} text units into {} concepts: {}",
            vectors.len(),
            choice.k,
            e
        ))
    })?;
    run.update(65, "concepts clustered");
    cancel.check()?;

    let outcome = hygiene::apply(
        &vectors,
        output.partition,
        &config.hygiene,
        &options,
        HierarchyLevel::Primary,
        vectors.len(),
    );
    if outcome.round_limit_hit {
        warn!(
            "dominance cap hit its round limit with a cluster above {:.0}%",
            config.hygiene.dominance_cap_threshold * 100.0
        );
    } else if outcome.still_dominant {
        warn!(
            "a cluster stays above {:.0}% and cannot be split further",
            config.hygiene.dominance_cap_threshold * 100.0
        );
    }
    let mut hygiene_report = HygieneReport {
        min_size: outcome.min_size,
        splits: outcome.splits,
        round_limit_hit: outcome.round_limit_hit,
        still_dominant: outcome.still_dominant,
    };
    let mut partition = outcome.partition;
    let point_memberships = assign_memberships(&vectors, &mut partition, &options);
    run.update(70, "cluster hygiene applied");

    let builder = ConceptBuilder {
        units: &units,
        scorer: &scorer,
        weights: EvidenceWeights::new(choice.semantic_weight, choice.frequency_weight),
        top_term_count: config.graph.top_term_count,
        representative_count: config.graph.representative_count,
    };
    let primary: Vec<Concept> = (0..partition.k())
        .map(|c| {
            builder.build(
                primary_id(c),
                ConceptLevel::Primary,
                &partition.members(c),
                partition.centroids()[c].clone(),
            )
        })
        .collect();
    let mut tree = ConceptTree::new(primary);

    if config.clustering.enable_detail {
        for c in 0..partition.k() {
            cancel.check()?;
            let members = partition.members(c);
            let member_vectors: Vec<&[f32]> = members.iter().map(|i| vectors[*i]).collect();
            let Some(local) =
                cluster_detail(&member_vectors, &options, config.clustering.detail_min_size)
            else {
                continue;
            };
            let local_options = options.clone().hard_count().with_k(local.k());
            let outcome = hygiene::apply(
                &member_vectors,
                local,
                &config.hygiene,
                &local_options,
                HierarchyLevel::Detail,
                vectors.len(),
            );
            hygiene_report.splits.extend(outcome.splits);
            hygiene_report.round_limit_hit |= outcome.round_limit_hit;
            hygiene_report.still_dominant |= outcome.still_dominant;
            let local = outcome.partition;
            if local.k() < 2 {
                continue;
            }
            let parent = primary_id(c);
            let details: Vec<Concept> = (0..local.k())
                .map(|d| {
                    let indices: Vec<usize> = local.members(d).iter().map(|i| members[*i]).collect();
                    builder.build(
                        format!("{}.d{}", parent, d),
                        ConceptLevel::Detail,
                        &indices,
                        local.centroids()[d].clone(),
                    )
                })
                .collect();
            tree.attach_details(&parent, details);
        }
    }
    run.update(75, "detail concepts built");

    let memberships: Vec<MembershipWeight> = units
        .iter()
        .zip(point_memberships.iter())
        .flat_map(|(u, m)| {
            m.iter().map(move |(c, w)| MembershipWeight {
                sentence_id: u.id.clone(),
                concept_id: primary_id(*c),
                weight: *w,
            })
        })
        .collect();
    let assignments: BTreeMap<String, String> = units
        .iter()
        .zip(partition.labels())
        .map(|(u, l)| (u.id.clone(), primary_id(*l)))
        .collect();
    let jurors = juror_vectors(&units, &memberships);
    run.update(80, "memberships computed");
    cancel.check()?;

    // Nodes: jurors (sorted) then primary concepts.
    let mut by_juror: BTreeMap<&str, Vec<&[f32]>> = BTreeMap::new();
    for u in &units {
        by_juror
            .entry(u.juror.as_str())
            .or_default()
            .push(u.embedding.as_slice());
    }
    let mut authored: HashMap<&str, usize> = HashMap::new();
    for s in &base {
        *authored.entry(s.juror.as_str()).or_default() += 1;
    }

    let mut node_ids = Vec::new();
    let mut node_subjects = Vec::new();
    let mut node_vectors = Vec::new();
    for (juror, embeddings) in &by_juror {
        if let Some(mean) = mean_vector(embeddings.iter().copied()) {
            node_ids.push(juror_node_id(juror));
            node_subjects.push(NodeSubject::Juror {
                name: juror.to_string(),
                sentences: authored.get(juror).copied().unwrap_or(embeddings.len()),
            });
            node_vectors.push(mean);
        }
    }
    for concept in &tree.primary {
        node_ids.push(concept_node_id(&concept.id));
        node_subjects.push(NodeSubject::Concept(concept.id.clone()));
        node_vectors.push(concept.centroid.clone());
    }

    let descriptions = pole_descriptions(&tree, &jurors);
    let projection = project(&node_ids, &node_vectors, &config.projection, |id| {
        descriptions
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    });
    run.update(85, "projection computed");

    Ok(NumericOutcome {
        choice,
        searches,
        units,
        tree,
        memberships,
        assignments,
        hygiene: hygiene_report,
        juror_vectors: jurors,
        node_ids,
        node_subjects,
        node_vectors,
        projection,
    })
}

/// Builds concepts from member indices into one unit set.
struct ConceptBuilder<'a> {
    units: &'a [Sentence],
    scorer: &'a dyn TermScorer,
    weights: EvidenceWeights,
    top_term_count: usize,
    representative_count: usize,
}

impl ConceptBuilder<'_> {
    fn build(&self, id: String, level: ConceptLevel, members: &[usize], centroid: Vec<f32>) -> Concept {
        let texts: Vec<&str> = members.iter().map(|i| self.units[*i].text.as_str()).collect();
        let top_terms = self.scorer.top_terms(&texts, self.top_term_count);
        let candidates: Vec<EvidenceCandidate<'_>> = members
            .iter()
            .map(|i| EvidenceCandidate {
                text: &self.units[*i].text,
                embedding: &self.units[*i].embedding,
            })
            .collect();
        let representatives = rank_representatives(
            &candidates,
            &centroid,
            &top_terms,
            self.weights,
            self.scorer,
            self.representative_count,
        );
        Concept {
            label: rule_label(&id, &top_terms),
            id,
            summary: None,
            label_source: LabelSource::Rule,
            level,
            parent_id: None,
            size: members.len(),
            centroid,
            top_terms,
            representative_sentence_ids: representatives
                .iter()
                .map(|r| self.units[members[*r]].id.clone())
                .collect(),
            detail_concept_ids: Vec::new(),
            member_sentence_ids: members.iter().map(|i| self.units[*i].id.clone()).collect(),
        }
    }
}

/// Short pole text per node: a concept's leading top terms, or a juror's
/// two strongest concepts.
fn pole_descriptions(
    tree: &ConceptTree,
    jurors: &BTreeMap<String, JurorVector>,
) -> HashMap<String, String> {
    let concept_text = |c: &Concept| {
        if c.top_terms.is_empty() {
            c.id.clone()
        } else {
            c.top_terms.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
        }
    };

    let mut out: HashMap<String, String> = tree
        .primary
        .iter()
        .map(|c| (concept_node_id(&c.id), concept_text(c)))
        .collect();
    for (juror, vector) in jurors {
        let mut weighted: Vec<(&String, &f32)> = vector.iter().collect();
        weighted.sort_by(|a, b| {
            b.1.partial_cmp(a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(b.0))
        });
        let text = weighted
            .iter()
            .take(2)
            .filter_map(|(id, _)| tree.get(id).map(concept_text))
            .collect::<Vec<_>>()
            .join(" + ");
        out.insert(juror_node_id(juror), text);
    }
    out
}

fn build_nodes(numeric: &NumericOutcome) -> Vec<GraphNode> {
    numeric
        .node_ids
        .iter()
        .zip(numeric.node_subjects.iter())
        .enumerate()
        .map(|(i, (id, subject))| {
            let (kind, label, size) = match subject {
                NodeSubject::Juror { name, sentences } => (NodeKind::Juror, name.clone(), *sentences),
                NodeSubject::Concept(cid) => match numeric.tree.get(cid) {
                    Some(c) => (NodeKind::Concept, c.label.clone(), c.size),
                    None => (NodeKind::Concept, cid.clone(), 0),
                },
            };
            GraphNode {
                id: id.clone(),
                kind,
                label,
                size,
                pc_values: numeric
                    .projection
                    .coordinates
                    .get(i)
                    .cloned()
                    .unwrap_or_default(),
                degree: 0.0,
                betweenness: 0.0,
                structural_role: StructuralRole::default(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stance;
    use crate::services::progress::ProgressEvent;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }

    fn input(n: usize) -> AnalysisInput {
        let sentences = (0..n)
            .map(|i| {
                let e = if i % 2 == 0 {
                    vec![1.0, 0.05 * i as f32, 0.0]
                } else {
                    vec![0.0, 0.05 * i as f32, 1.0]
                };
                let text = if i % 2 == 0 {
                    "warm lighting at the entrance"
                } else {
                    "narrow staircase feels unsafe"
                };
                Sentence::new(format!("s{}", i), format!("J{}", i % 3), text, Stance::Neutral, e)
            })
            .collect();
        AnalysisInput {
            sentences,
            ..Default::default()
        }
    }

    fn config(k: usize) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.clustering.k_concepts = k;
        config
    }

    #[tokio::test]
    async fn test_too_few_sentences_is_input_error() {
        let recorder = Arc::new(Recorder::default());
        let err = AnalysisService::default()
            .analyze(input(2), &config(3), recorder.clone(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JuryscopeError::Input(_)));
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().error.is_some());
    }

    #[tokio::test]
    async fn test_contradictory_config_fails_fast() {
        let mut cfg = config(2);
        cfg.search.k_min_override = Some(5);
        cfg.search.k_max_override = Some(3);
        let err = AnalysisService::default()
            .analyze(input(8), &cfg, crate::services::progress::noop_progress(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JuryscopeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_single_error() {
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = AnalysisService::default()
            .analyze(input(8), &config(2), recorder.clone(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, JuryscopeError::Cancelled));
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_small_run_produces_two_concepts() {
        let recorder = Arc::new(Recorder::default());
        let result = AnalysisService::default()
            .analyze(input(8), &config(2), recorder.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.concepts.primary.len(), 2);
        assert_eq!(result.assignments.len(), 8);
        assert_eq!(result.assignments["s0"], result.assignments["s2"]);
        assert_ne!(result.assignments["s0"], result.assignments["s1"]);
        assert_eq!(
            result.nodes.iter().filter(|n| n.kind == NodeKind::Juror).count(),
            3
        );
        for vector in result.juror_vectors.values() {
            assert!((vector.values().sum::<f32>() - 1.0).abs() < 1e-5);
        }

        let events = recorder.events.lock().unwrap();
        assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
        let last = events.last().unwrap();
        assert!(last.done);
        assert_eq!(last.progress, 100);
    }
}
