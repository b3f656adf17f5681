//! Term scoring: tokenization, BM25 evidence scores, and cluster top terms.
//!
//! [`TermScorer`] is the seam for an external keyphrase service; the engine
//! ships [`Bm25Scorer`], fitted on the sentence texts of one run.

use std::collections::{BTreeMap, HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into",
    "through", "during", "before", "after", "above", "below", "between", "under", "over",
    "again", "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
    "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own",
    "same", "so", "than", "too", "very", "just", "and", "but", "if", "or", "because", "until",
    "while", "about", "against", "this", "that", "these", "those", "what", "which", "who",
    "whom", "i", "me", "my", "we", "our", "you", "your", "he", "him", "his", "she", "her", "it",
    "its", "they", "them", "their", "also", "really", "quite", "bit", "lot", "think", "felt",
    "feel", "like", "one", "much", "many", "well",
];

/// Lowercase alphanumeric tokens of at least two characters, stop words and
/// pure numbers removed. Order and duplicates are preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    let stop_set: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| {
            word.chars().count() >= 2
                && !stop_set.contains(word)
                && !word.chars().all(|c| c.is_ascii_digit())
        })
        .map(|s| s.to_string())
        .collect()
}

/// Scores terms and documents for evidence ranking and concept labels.
pub trait TermScorer: Send + Sync {
    /// The `count` most characteristic terms of a group of documents.
    fn top_terms(&self, documents: &[&str], count: usize) -> Vec<String>;

    /// Relevance of `document` to the `query` terms. Unbounded, non-negative.
    fn score(&self, query: &[String], document: &str) -> f64;
}

/// Scores of `documents` against `query`, divided by the maximum so the best
/// document scores 1. All zeros when nothing matches.
pub fn normalized_scores(scorer: &dyn TermScorer, query: &[String], documents: &[&str]) -> Vec<f64> {
    let raw: Vec<f64> = documents.iter().map(|d| scorer.score(query, d)).collect();
    let max = raw.iter().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; raw.len()];
    }
    raw.into_iter().map(|s| s / max).collect()
}

/// Okapi BM25 over a fixed corpus.
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    k1: f64,
    b: f64,
    idf: HashMap<String, f64>,
    avg_doc_len: f64,
    /// IDF of a term absent from the corpus.
    unseen_idf: f64,
}

impl Bm25Scorer {
    pub const DEFAULT_K1: f64 = 1.2;
    pub const DEFAULT_B: f64 = 0.75;

    pub fn fit(corpus: &[&str]) -> Self {
        Self::with_params(corpus, Self::DEFAULT_K1, Self::DEFAULT_B)
    }

    pub fn with_params(corpus: &[&str], k1: f64, b: f64) -> Self {
        let n = corpus.len() as f64;
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;
        for doc in corpus {
            let tokens = tokenize(doc);
            total_len += tokens.len();
            for t in tokens.into_iter().collect::<HashSet<_>>() {
                *df.entry(t).or_default() += 1;
            }
        }
        let idf_of = |df: f64| (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
        let idf = df
            .into_iter()
            .map(|(t, d)| (t, idf_of(d as f64)))
            .collect();
        Self {
            k1,
            b,
            idf,
            avg_doc_len: if corpus.is_empty() {
                0.0
            } else {
                total_len as f64 / n
            },
            unseen_idf: idf_of(0.0),
        }
    }

    fn idf(&self, term: &str) -> f64 {
        self.idf.get(term).copied().unwrap_or(self.unseen_idf)
    }
}

impl TermScorer for Bm25Scorer {
    fn top_terms(&self, documents: &[&str], count: usize) -> Vec<String> {
        let mut tf: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            for t in tokenize(doc) {
                *tf.entry(t).or_default() += 1;
            }
        }
        // Saturated group frequency weighted by corpus rarity; ties break
        // alphabetically through the BTreeMap order and the stable sort.
        let mut scored: Vec<(String, f64)> = tf
            .into_iter()
            .map(|(t, f)| {
                let f = f as f64;
                let s = self.idf(&t) * f * (self.k1 + 1.0) / (f + self.k1);
                (t, s)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(count).map(|(t, _)| t).collect()
    }

    fn score(&self, query: &[String], document: &str) -> f64 {
        let tokens = tokenize(document);
        if tokens.is_empty() || query.is_empty() {
            return 0.0;
        }
        let doc_len = tokens.len() as f64;
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for t in &tokens {
            *tf.entry(t.as_str()).or_default() += 1;
        }
        let norm = if self.avg_doc_len > 0.0 {
            1.0 - self.b + self.b * doc_len / self.avg_doc_len
        } else {
            1.0
        };
        query
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|q| tf.get(q.as_str()).map(|f| (q, *f as f64)))
            .map(|(q, f)| self.idf(q) * f * (self.k1 + 1.0) / (f + self.k1 * norm))
            .sum()
    }
}

/// Jaccard overlap of two term lists.
pub fn term_overlap(a: &[String], b: &[String]) -> f64 {
    let sa: HashSet<&String> = a.iter().collect();
    let sb: HashSet<&String> = b.iter().collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}
