//! In-memory holder for sentence and term vectors supplied by the embedder.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::embedding::EmbeddingService;
use crate::models::Sentence;
use crate::services::cancel::CancellationToken;
use crate::JuryscopeError;

/// Pure data holder: validated sentences plus a term/phrase vector table.
///
/// Every vector shares one dimensionality `d`; construction fails otherwise.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dims: usize,
    sentences: Vec<Sentence>,
    terms: BTreeMap<String, Vec<f32>>,
}

fn term_key(term: &str) -> String {
    term.trim().to_lowercase()
}

fn check_vector(owner: &str, v: &[f32], dims: usize) -> Result<(), JuryscopeError> {
    if v.len() != dims {
        return Err(JuryscopeError::Input(format!(
            "Invalid embedding dimension for {}: expected {}, got {}",
            owner,
            dims,
            v.len()
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(JuryscopeError::Input(format!(
            "Embedding for {} contains non-finite values",
            owner
        )));
    }
    Ok(())
}

impl VectorStore {
    pub fn new(
        sentences: Vec<Sentence>,
        term_embeddings: BTreeMap<String, Vec<f32>>,
    ) -> Result<Self, JuryscopeError> {
        let first = sentences
            .first()
            .ok_or_else(|| JuryscopeError::Input("No sentences supplied".to_string()))?;
        let dims = first.embedding.len();
        if dims == 0 {
            return Err(JuryscopeError::Input(format!(
                "Sentence '{}' has an empty embedding",
                first.id
            )));
        }

        let mut seen = HashSet::with_capacity(sentences.len());
        for sentence in &sentences {
            check_vector(&format!("sentence '{}'", sentence.id), &sentence.embedding, dims)?;
            if !seen.insert(sentence.id.as_str()) {
                return Err(JuryscopeError::Input(format!(
                    "Duplicate sentence id '{}'",
                    sentence.id
                )));
            }
        }

        let mut terms = BTreeMap::new();
        for (term, vector) in term_embeddings {
            check_vector(&format!("term '{}'", term), &vector, dims)?;
            terms.insert(term_key(&term), vector);
        }

        debug!(
            sentences = sentences.len(),
            terms = terms.len(),
            dims,
            "vector store loaded"
        );

        Ok(Self {
            dims,
            sentences,
            terms,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Sentences of one segmentation granularity, in input order.
    pub fn sentences_for_window(&self, window: usize) -> Vec<&Sentence> {
        self.sentences
            .iter()
            .filter(|s| s.unit_window == window)
            .collect()
    }

    /// Distinct jurors, sorted.
    pub fn jurors(&self) -> Vec<String> {
        self.sentences
            .iter()
            .map(|s| s.juror.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn term_vector(&self, term: &str) -> Option<&[f32]> {
        self.terms.get(&term_key(term)).map(|v| v.as_slice())
    }

    /// Look up a phrase vector, falling back to the embedding service.
    ///
    /// The fallback call is bounded by `limit` and raced against `cancel`.
    /// Returns `Ok(None)` when neither source can provide a vector of the
    /// right dimensionality (service failures and timeouts are logged, never
    /// raised) and `Err(Cancelled)` when the run is cancelled while waiting.
    pub async fn resolve_phrase(
        &self,
        phrase: &str,
        embedder: &dyn EmbeddingService,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<f32>>, JuryscopeError> {
        if let Some(v) = self.term_vector(phrase) {
            return Ok(Some(v.to_vec()));
        }
        if !embedder.is_available() {
            debug!("No vector for phrase '{}' and no embedder available", phrase);
            return Ok(None);
        }
        if embedder.dimensions() != self.dims {
            warn!(
                "Embedder produces {} dims, store uses {}; cannot embed '{}'",
                embedder.dimensions(),
                self.dims,
                phrase
            );
            return Ok(None);
        }
        cancel.check()?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JuryscopeError::Cancelled),
            outcome = timeout(limit, embedder.embed_text(phrase)) => outcome,
        };
        match outcome {
            Ok(Ok(v)) if v.len() == self.dims => Ok(Some(v)),
            Ok(Ok(v)) => {
                warn!(
                    "Embedder returned {} dims for '{}', store uses {}",
                    v.len(),
                    phrase,
                    self.dims
                );
                Ok(None)
            }
            Ok(Err(e)) => {
                warn!("Failed to embed phrase '{}': {}", phrase, e);
                Ok(None)
            }
            Err(_) => {
                let e = JuryscopeError::external(
                    "embedding",
                    format!("timed out after {}ms", limit.as_millis()),
                );
                warn!("Failed to embed phrase '{}': {}", phrase, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NoopEmbeddingService;
    use crate::models::Stance;
    use async_trait::async_trait;

    fn sentence(id: &str, juror: &str, embedding: Vec<f32>) -> Sentence {
        Sentence::new(id, juror, format!("text {id}"), Stance::Neutral, embedding)
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = VectorStore::new(vec![], BTreeMap::new()).unwrap_err();
        assert!(matches!(err, JuryscopeError::Input(_)));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = VectorStore::new(
            vec![
                sentence("a", "Ana", vec![1.0, 0.0]),
                sentence("b", "Ben", vec![1.0, 0.0, 0.0]),
            ],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid embedding dimension"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = VectorStore::new(
            vec![
                sentence("a", "Ana", vec![1.0, 0.0]),
                sentence("a", "Ben", vec![0.0, 1.0]),
            ],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_jurors_sorted_and_unique() {
        let store = VectorStore::new(
            vec![
                sentence("a", "Zoe", vec![1.0, 0.0]),
                sentence("b", "Ana", vec![0.0, 1.0]),
                sentence("c", "Zoe", vec![0.5, 0.5]),
            ],
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(store.jurors(), vec!["Ana", "Zoe"]);
    }

    #[tokio::test]
    async fn test_resolve_phrase_uses_term_table_case_insensitively() {
        let mut terms = BTreeMap::new();
        terms.insert("Daylight".to_string(), vec![0.0, 1.0]);
        let store = VectorStore::new(vec![sentence("a", "Ana", vec![1.0, 0.0])], terms).unwrap();

        let noop = NoopEmbeddingService::new();
        let cancel = CancellationToken::new();
        assert_eq!(
            store
                .resolve_phrase(" daylight ", &noop, LIMIT, &cancel)
                .await
                .unwrap(),
            Some(vec![0.0, 1.0])
        );
        assert_eq!(
            store
                .resolve_phrase("darkness", &noop, LIMIT, &cancel)
                .await
                .unwrap(),
            None
        );
    }

    const LIMIT: Duration = Duration::from_millis(50);

    /// Never answers.
    struct StalledEmbedder;

    #[async_trait]
    impl EmbeddingService for StalledEmbedder {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, JuryscopeError> {
            std::future::pending().await
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    /// Answers with a fixed vector of the given length.
    struct FixedEmbedder(usize);

    #[async_trait]
    impl EmbeddingService for FixedEmbedder {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, JuryscopeError> {
            Ok(vec![0.5; self.0])
        }

        fn dimensions(&self) -> usize {
            self.0
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn one_sentence_store() -> VectorStore {
        VectorStore::new(vec![sentence("a", "Ana", vec![1.0, 0.0])], BTreeMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_phrase_falls_back_to_embedder() {
        let store = one_sentence_store();
        let cancel = CancellationToken::new();
        let v = store
            .resolve_phrase("glare", &FixedEmbedder(2), LIMIT, &cancel)
            .await
            .unwrap();
        assert_eq!(v, Some(vec![0.5, 0.5]));

        // A provider in another space is never called.
        let v = store
            .resolve_phrase("glare", &FixedEmbedder(3), LIMIT, &cancel)
            .await
            .unwrap();
        assert_eq!(v, None);
    }

    #[tokio::test]
    async fn test_stalled_embedder_times_out_to_none() {
        let store = one_sentence_store();
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            store.resolve_phrase("glare", &StalledEmbedder, LIMIT, &CancellationToken::new()),
        )
        .await
        .expect("embedding call must be bounded");
        assert_eq!(outcome.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_embedder() {
        let store = one_sentence_store();
        let cancel = CancellationToken::new();
        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            store.resolve_phrase("glare", &StalledEmbedder, Duration::from_secs(3600), &cancel),
        )
        .await
        .expect("cancellation must interrupt the wait");
        trigger.await.unwrap();
        assert!(matches!(outcome, Err(JuryscopeError::Cancelled)));
    }
}
