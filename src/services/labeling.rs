//! Concept labels: rule-based titles, optionally upgraded by an external
//! synthesizer whose output must pass deterministic quality gates.
//!
//! Labels never touch clustering or graph weights. A synthesizer failure or
//! timeout only costs the concept its synthesized title.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use moka::future::Cache;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::LabelConfig;
use crate::models::{Concept, ConceptTree, LabelRejection, LabelReport, LabelSource};
use crate::services::cancel::CancellationToken;
use crate::services::terms::tokenize;
use crate::JuryscopeError;

const MAX_TITLE_CHARS: usize = 60;
const MAX_TITLE_WORDS: usize = 8;
const NEAR_ECHO_SIMILARITY: f64 = 0.9;
const RULE_LABEL_TERMS: usize = 3;

const BOILERPLATE: &[&str] = &[
    "this concept",
    "this cluster",
    "this group",
    "the jurors",
    "jurors said",
    "general feedback",
    "miscellaneous",
    "various topics",
    "as an ai",
    "untitled",
    "n/a",
];

/// What the synthesizer sees for one concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConceptEvidence {
    pub concept_id: String,
    pub top_terms: Vec<String>,
    /// Representative sentence texts, best first.
    pub sentences: Vec<String>,
}

impl ConceptEvidence {
    /// Cache key over the content only; the concept id does not matter.
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.top_terms.hash(&mut hasher);
        self.sentences.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedLabel {
    pub title: String,
    pub one_liner: String,
}

/// External title/summary generator.
#[async_trait]
pub trait LabelSynthesizer: Send + Sync {
    /// `Ok(None)` means the service declined; the rule label stays.
    async fn synthesize(
        &self,
        evidence: &ConceptEvidence,
    ) -> Result<Option<SynthesizedLabel>, JuryscopeError>;
}

/// Synthesizer used when no label service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLabelSynthesizer;

#[async_trait]
impl LabelSynthesizer for NoopLabelSynthesizer {
    async fn synthesize(
        &self,
        _evidence: &ConceptEvidence,
    ) -> Result<Option<SynthesizedLabel>, JuryscopeError> {
        Ok(None)
    }
}

/// Caches successful syntheses by evidence fingerprint.
pub struct CachedLabelSynthesizer {
    inner: Arc<dyn LabelSynthesizer>,
    cache: Cache<String, SynthesizedLabel>,
}

impl CachedLabelSynthesizer {
    pub fn new(inner: Arc<dyn LabelSynthesizer>, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl LabelSynthesizer for CachedLabelSynthesizer {
    async fn synthesize(
        &self,
        evidence: &ConceptEvidence,
    ) -> Result<Option<SynthesizedLabel>, JuryscopeError> {
        let key = evidence.fingerprint();
        if let Some(hit) = self.cache.get(&key).await {
            debug!(concept = %evidence.concept_id, "label cache hit");
            return Ok(Some(hit));
        }
        let label = self.inner.synthesize(evidence).await?;
        if let Some(label) = &label {
            self.cache.insert(key, label.clone()).await;
        }
        Ok(label)
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deterministic label from a concept's leading top terms.
pub fn rule_label(concept_id: &str, top_terms: &[String]) -> String {
    let words: Vec<String> = top_terms
        .iter()
        .take(RULE_LABEL_TERMS)
        .map(|t| title_case(t))
        .collect();
    if words.is_empty() {
        format!("Concept {}", concept_id)
    } else {
        words.join(" / ")
    }
}

/// Reason a synthesized label is unusable, or `None` if it passes.
pub fn quality_gate(label: &SynthesizedLabel, evidence: &ConceptEvidence) -> Option<String> {
    let title = label.title.trim();
    if title.is_empty() {
        return Some("empty title".to_string());
    }
    if title.chars().count() > MAX_TITLE_CHARS || title.split_whitespace().count() > MAX_TITLE_WORDS
    {
        return Some("title too long".to_string());
    }

    let lowered = title.to_lowercase();
    for sentence in &evidence.sentences {
        let other = sentence.trim().to_lowercase();
        if other == lowered {
            return Some("title echoes evidence text".to_string());
        }
        let similarity = rapidfuzz::distance::levenshtein::normalized_similarity(
            lowered.chars(),
            other.chars(),
        );
        if similarity >= NEAR_ECHO_SIMILARITY {
            return Some(format!(
                "title nearly echoes evidence text ({:.2})",
                similarity
            ));
        }
    }

    let words: Vec<String> = tokenize(title);
    let mut seen = std::collections::HashSet::new();
    if let Some(repeated) = words.iter().find(|w| !seen.insert(w.as_str())) {
        return Some(format!("repeated word in title: {}", repeated));
    }

    let one_liner = label.one_liner.to_lowercase();
    if let Some(phrase) = BOILERPLATE
        .iter()
        .find(|p| lowered.contains(*p) || one_liner.contains(*p))
    {
        return Some(format!("boilerplate phrasing: {}", phrase));
    }

    None
}

/// Applies rule labels to every concept and upgrades them through the
/// synthesizer where it produces an acceptable title.
pub struct LabelService {
    synthesizer: Arc<dyn LabelSynthesizer>,
    config: LabelConfig,
}

impl LabelService {
    pub fn new(synthesizer: Arc<dyn LabelSynthesizer>, config: LabelConfig) -> Self {
        Self {
            synthesizer,
            config,
        }
    }

    /// Labels are written in place. `texts` maps sentence ids to text.
    pub async fn label_concepts(
        &self,
        tree: &mut ConceptTree,
        texts: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<LabelReport, JuryscopeError> {
        for concept in tree.primary.iter_mut().chain(tree.detail.iter_mut()) {
            concept.label = rule_label(&concept.id, &concept.top_terms);
            concept.summary = None;
            concept.label_source = LabelSource::Rule;
        }

        let mut report = LabelReport::default();
        if !self.config.enabled {
            report.rule_based = tree.len();
            return Ok(report);
        }

        let evidence: Vec<ConceptEvidence> = tree
            .primary
            .iter()
            .chain(tree.detail.iter())
            .map(|c| evidence_for(c, texts))
            .collect();

        let limit = Duration::from_millis(self.config.timeout_ms);
        let synthesizer = &self.synthesizer;
        let calls = stream::iter(evidence.iter())
            .map(|ev| async move {
                let outcome = timeout(limit, synthesizer.synthesize(ev)).await;
                (ev.concept_id.clone(), outcome)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect::<HashMap<String, _>>();
        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JuryscopeError::Cancelled),
            outcomes = calls => outcomes,
        };

        let evidence_by_id: HashMap<&str, &ConceptEvidence> =
            evidence.iter().map(|e| (e.concept_id.as_str(), e)).collect();

        for concept in tree.primary.iter_mut().chain(tree.detail.iter_mut()) {
            let Some(outcome) = outcomes.get(&concept.id) else {
                report.rule_based += 1;
                continue;
            };
            match outcome {
                Ok(Ok(Some(label))) => {
                    let Some(ev) = evidence_by_id.get(concept.id.as_str()) else {
                        report.rule_based += 1;
                        continue;
                    };
                    match quality_gate(label, ev) {
                        None => {
                            concept.label = label.title.trim().to_string();
                            let one_liner = label.one_liner.trim();
                            concept.summary =
                                (!one_liner.is_empty()).then(|| one_liner.to_string());
                            concept.label_source = LabelSource::Synthesized;
                            report.synthesized += 1;
                        }
                        Some(reason) => {
                            warn!(concept = %concept.id, %reason, "synthesized label rejected");
                            report.rejected.push(LabelRejection {
                                concept_id: concept.id.clone(),
                                reason,
                            });
                            report.rule_based += 1;
                        }
                    }
                }
                Ok(Ok(None)) => report.rule_based += 1,
                Ok(Err(e)) => {
                    warn!(concept = %concept.id, "label synthesis failed: {}", e);
                    report.service_failures += 1;
                    report.rule_based += 1;
                }
                Err(_) => {
                    warn!(
                        concept = %concept.id,
                        "label synthesis timed out after {}ms", self.config.timeout_ms
                    );
                    report.service_failures += 1;
                    report.rule_based += 1;
                }
            }
        }

        info!(
            synthesized = report.synthesized,
            rule_based = report.rule_based,
            rejected = report.rejected.len(),
            "concept labels assigned"
        );
        Ok(report)
    }
}

fn evidence_for(concept: &Concept, texts: &HashMap<String, String>) -> ConceptEvidence {
    ConceptEvidence {
        concept_id: concept.id.clone(),
        top_terms: concept.top_terms.clone(),
        sentences: concept
            .representative_sentence_ids
            .iter()
            .filter_map(|id| texts.get(id).cloned())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConceptLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSynthesizer {
        title: String,
        calls: AtomicUsize,
    }

    impl FixedSynthesizer {
        fn new(title: &str) -> Self {
            Self {
                title: title.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LabelSynthesizer for FixedSynthesizer {
        async fn synthesize(
            &self,
            _evidence: &ConceptEvidence,
        ) -> Result<Option<SynthesizedLabel>, JuryscopeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(SynthesizedLabel {
                title: self.title.clone(),
                one_liner: "Jurors want warmer light at night.".to_string(),
            }))
        }
    }

    struct FailingSynthesizer;

    #[async_trait]
    impl LabelSynthesizer for FailingSynthesizer {
        async fn synthesize(
            &self,
            _evidence: &ConceptEvidence,
        ) -> Result<Option<SynthesizedLabel>, JuryscopeError> {
            Err(JuryscopeError::external("labels", "503"))
        }
    }

    struct SlowSynthesizer;

    #[async_trait]
    impl LabelSynthesizer for SlowSynthesizer {
        async fn synthesize(
            &self,
            _evidence: &ConceptEvidence,
        ) -> Result<Option<SynthesizedLabel>, JuryscopeError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
    }

    fn concept(id: &str, terms: &[&str]) -> Concept {
        Concept {
            id: id.to_string(),
            label: String::new(),
            summary: None,
            label_source: LabelSource::Rule,
            level: ConceptLevel::Primary,
            parent_id: None,
            size: 2,
            centroid: vec![1.0, 0.0],
            top_terms: terms.iter().map(|s| s.to_string()).collect(),
            representative_sentence_ids: vec!["s1".to_string()],
            detail_concept_ids: vec![],
            member_sentence_ids: vec!["s1".to_string()],
        }
    }

    fn texts() -> HashMap<String, String> {
        HashMap::from([(
            "s1".to_string(),
            "The lighting at the entrance is too harsh".to_string(),
        )])
    }

    fn evidence() -> ConceptEvidence {
        ConceptEvidence {
            concept_id: "c0".to_string(),
            top_terms: vec!["lighting".to_string()],
            sentences: vec!["The lighting at the entrance is too harsh".to_string()],
        }
    }

    fn label(title: &str) -> SynthesizedLabel {
        SynthesizedLabel {
            title: title.to_string(),
            one_liner: String::new(),
        }
    }

    #[test]
    fn test_rule_labels_snapshot() {
        let labels = [
            rule_label("c0", &["lighting".into(), "entrance".into(), "harsh".into(), "glare".into()]),
            rule_label("c1", &["façade".into()]),
            rule_label("c2", &[]),
        ];
        insta::assert_snapshot!(labels.join("\n"), @r"
        Lighting / Entrance / Harsh
        Façade
        Concept c2
        ");
    }

    #[test]
    fn test_quality_gates() {
        let ev = evidence();
        assert!(quality_gate(&label("Harsh Entrance Lighting"), &ev).is_none());
        assert_eq!(quality_gate(&label("   "), &ev).unwrap(), "empty title");
        assert!(quality_gate(&label("the lighting at the entrance is too harsh"), &ev)
            .unwrap()
            .contains("echoes"));
        assert!(quality_gate(&label("The lighting at the entrance is too harsh!"), &ev)
            .unwrap()
            .contains("nearly"));
        assert!(quality_gate(&label("Light Light Show"), &ev)
            .unwrap()
            .contains("repeated"));
        assert!(quality_gate(&label("This Concept Covers Light"), &ev)
            .unwrap()
            .contains("boilerplate"));
        assert_eq!(
            quality_gate(&label("one two three four five six seven eight nine"), &ev).unwrap(),
            "title too long"
        );
    }

    #[tokio::test]
    async fn test_accepted_synthesis_replaces_rule_label() {
        let service = LabelService::new(
            Arc::new(FixedSynthesizer::new("Harsh Entrance Lighting")),
            LabelConfig::default(),
        );
        let mut tree = ConceptTree::new(vec![concept("c0", &["lighting", "entrance"])]);
        let report = service
            .label_concepts(&mut tree, &texts(), &CancellationToken::new())
            .await
            .unwrap();
        let c = tree.get("c0").unwrap();
        assert_eq!(c.label, "Harsh Entrance Lighting");
        assert_eq!(c.label_source, LabelSource::Synthesized);
        assert_eq!(c.summary.as_deref(), Some("Jurors want warmer light at night."));
        assert_eq!(report.synthesized, 1);
    }

    #[tokio::test]
    async fn test_rejected_synthesis_keeps_rule_label() {
        let service = LabelService::new(
            Arc::new(FixedSynthesizer::new("The lighting at the entrance is too harsh")),
            LabelConfig::default(),
        );
        let mut tree = ConceptTree::new(vec![concept("c0", &["lighting", "entrance"])]);
        let report = service
            .label_concepts(&mut tree, &texts(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tree.get("c0").unwrap().label, "Lighting / Entrance");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rule_based, 1);
    }

    #[tokio::test]
    async fn test_service_failure_and_timeout_fall_back() {
        let mut tree = ConceptTree::new(vec![concept("c0", &["lighting"])]);
        let failing = LabelService::new(Arc::new(FailingSynthesizer), LabelConfig::default());
        let report = failing
            .label_concepts(&mut tree, &texts(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.service_failures, 1);
        assert_eq!(tree.get("c0").unwrap().label, "Lighting");

        let slow = LabelService::new(
            Arc::new(SlowSynthesizer),
            LabelConfig {
                timeout_ms: 20,
                ..Default::default()
            },
        );
        let report = slow
            .label_concepts(&mut tree, &texts(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.service_failures, 1);
        assert_eq!(tree.get("c0").unwrap().label_source, LabelSource::Rule);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_synthesis() {
        let mut tree = ConceptTree::new(vec![concept("c0", &["lighting"])]);
        let service = LabelService::new(Arc::new(SlowSynthesizer), LabelConfig::default());
        let cancel = CancellationToken::new();
        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };
        let started = std::time::Instant::now();
        let err = service
            .label_concepts(&mut tree, &texts(), &cancel)
            .await
            .unwrap_err();
        trigger.await.unwrap();
        assert!(matches!(err, JuryscopeError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_cache_skips_repeat_calls() {
        let inner = Arc::new(FixedSynthesizer::new("Harsh Entrance Lighting"));
        let cached = CachedLabelSynthesizer::new(inner.clone(), 60);
        let ev = evidence();
        cached.synthesize(&ev).await.unwrap();
        let mut renamed = ev.clone();
        renamed.concept_id = "c9".to_string();
        cached.synthesize(&renamed).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_labels_skip_synthesizer() {
        let inner = Arc::new(FixedSynthesizer::new("Harsh Entrance Lighting"));
        let service = LabelService::new(
            inner.clone(),
            LabelConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let mut tree = ConceptTree::new(vec![concept("c0", &["lighting"])]);
        let report = service
            .label_concepts(&mut tree, &texts(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.rule_based, 1);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }
}
