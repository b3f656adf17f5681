//! Sentence model: the segmenter's tagged output, consumed read-only.

use serde::{Deserialize, Serialize};

/// Stance classification assigned by the external segmenter.
///
/// Variant order doubles as the tie-break order when a majority stance is
/// computed over several sentences.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Praise,
    Critique,
    Suggestion,
    #[default]
    Neutral,
}

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::Praise => "praise",
            Stance::Critique => "critique",
            Stance::Suggestion => "suggestion",
            Stance::Neutral => "neutral",
        }
    }

    pub fn all() -> [Stance; 4] {
        [
            Stance::Praise,
            Stance::Critique,
            Stance::Suggestion,
            Stance::Neutral,
        ]
    }

    /// Most frequent stance; ties resolve to the earliest variant.
    /// Returns `Neutral` for an empty input.
    pub fn majority<I: IntoIterator<Item = Stance>>(stances: I) -> Stance {
        let mut counts = [0usize; 4];
        let mut seen = false;
        for stance in stances {
            counts[stance as usize] += 1;
            seen = true;
        }
        if !seen {
            return Stance::Neutral;
        }
        let mut best = 0;
        for i in 1..counts.len() {
            if counts[i] > counts[best] {
                best = i;
            }
        }
        Stance::all()[best]
    }
}

/// A tagged text unit with its embedding.
///
/// `unit_window` is the segmentation granularity the unit was produced at:
/// 1 for single sentences, `w` for windows of `w` consecutive sentences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    pub id: String,
    pub juror: String,
    pub text: String,
    #[serde(default)]
    pub stance: Stance,
    pub embedding: Vec<f32>,
    #[serde(default = "default_unit_window")]
    pub unit_window: usize,
}

fn default_unit_window() -> usize {
    1
}

impl Sentence {
    pub fn new(
        id: impl Into<String>,
        juror: impl Into<String>,
        text: impl Into<String>,
        stance: Stance,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            juror: juror.into(),
            text: text.into(),
            stance,
            embedding,
            unit_window: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_stance_simple() {
        let stances = vec![Stance::Critique, Stance::Praise, Stance::Critique];
        assert_eq!(Stance::majority(stances), Stance::Critique);
    }

    #[test]
    fn test_majority_stance_tie_prefers_earlier_variant() {
        let stances = vec![Stance::Suggestion, Stance::Praise];
        assert_eq!(Stance::majority(stances), Stance::Praise);
    }

    #[test]
    fn test_majority_stance_empty_is_neutral() {
        assert_eq!(Stance::majority(Vec::new()), Stance::Neutral);
    }

    #[test]
    fn test_sentence_deserializes_with_defaults() {
        let json = r#"{"id":"s1","juror":"Ana","text":"Nice facade.","embedding":[0.1,0.2]}"#;
        let sentence: Sentence = serde_json::from_str(json).unwrap();
        assert_eq!(sentence.stance, Stance::Neutral);
        assert_eq!(sentence.unit_window, 1);
    }

    #[test]
    fn test_stance_serializes_lowercase() {
        let json = serde_json::to_string(&Stance::Suggestion).unwrap();
        assert_eq!(json, "\"suggestion\"");
    }
}
