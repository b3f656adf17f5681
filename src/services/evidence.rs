//! Evidence ranking: which member sentences represent a concept.

use crate::services::terms::{normalized_scores, TermScorer};
use crate::utils::math::cosine_similarity;

/// Evidence-ranking weight blend. The two weights sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvidenceWeights {
    pub semantic: f32,
    pub frequency: f32,
}

impl EvidenceWeights {
    pub fn new(semantic: f32, frequency: f32) -> Self {
        Self {
            semantic,
            frequency,
        }
    }
}

/// One member of a concept as seen by the ranker.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceCandidate<'a> {
    pub text: &'a str,
    pub embedding: &'a [f32],
}

/// Blended score per candidate:
/// `semantic * cos(embedding, centroid) + frequency * normalized BM25(top_terms)`.
pub fn blended_scores(
    candidates: &[EvidenceCandidate<'_>],
    centroid: &[f32],
    top_terms: &[String],
    weights: EvidenceWeights,
    scorer: &dyn TermScorer,
) -> Vec<f64> {
    let texts: Vec<&str> = candidates.iter().map(|c| c.text).collect();
    let lexical = normalized_scores(scorer, top_terms, &texts);
    candidates
        .iter()
        .zip(lexical)
        .map(|(c, bm25)| {
            weights.semantic as f64 * cosine_similarity(c.embedding, centroid) as f64
                + weights.frequency as f64 * bm25
        })
        .collect()
}

/// Indices (into `candidates`) of the `count` best-scoring candidates,
/// best first. Ties keep input order.
pub fn rank_representatives(
    candidates: &[EvidenceCandidate<'_>],
    centroid: &[f32],
    top_terms: &[String],
    weights: EvidenceWeights,
    scorer: &dyn TermScorer,
    count: usize,
) -> Vec<usize> {
    let scores = blended_scores(candidates, centroid, top_terms, weights, scorer);
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        scores[*b]
            .partial_cmp(&scores[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(count);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::terms::Bm25Scorer;

    fn candidates() -> Vec<EvidenceCandidate<'static>> {
        vec![
            EvidenceCandidate {
                text: "generic remark",
                embedding: &[1.0, 0.0],
            },
            EvidenceCandidate {
                text: "lighting lighting design",
                embedding: &[0.6, 0.8],
            },
            EvidenceCandidate {
                text: "nothing relevant",
                embedding: &[0.0, 1.0],
            },
        ]
    }

    #[test]
    fn test_semantic_weight_prefers_centroid_neighbor() {
        let scorer = Bm25Scorer::fit(&["generic remark", "lighting lighting design", "nothing relevant"]);
        let terms = vec!["lighting".to_string()];
        let top = rank_representatives(
            &candidates(),
            &[1.0, 0.0],
            &terms,
            EvidenceWeights::new(1.0, 0.0),
            &scorer,
            2,
        );
        assert_eq!(top, vec![0, 1]);
    }

    #[test]
    fn test_frequency_weight_prefers_term_match() {
        let scorer = Bm25Scorer::fit(&["generic remark", "lighting lighting design", "nothing relevant"]);
        let terms = vec!["lighting".to_string()];
        let top = rank_representatives(
            &candidates(),
            &[1.0, 0.0],
            &terms,
            EvidenceWeights::new(0.0, 1.0),
            &scorer,
            1,
        );
        assert_eq!(top, vec![1]);
    }

    #[test]
    fn test_count_larger_than_members() {
        let scorer = Bm25Scorer::fit(&["a b"]);
        let top = rank_representatives(
            &candidates(),
            &[1.0, 0.0],
            &[],
            EvidenceWeights::new(0.7, 0.3),
            &scorer,
            8,
        );
        assert_eq!(top.len(), 3);
    }
}
