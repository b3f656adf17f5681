//! Test data builders for analysis inputs.
//!
//! Provides a fluent API for assembling sentences, term vectors, and anchor
//! axes with sensible defaults.

#![allow(dead_code)]

use std::collections::BTreeMap;

use juryscope::models::{AnalysisInput, AnchorAxis, AnchorPole, Sentence, Stance};

/// Builder for analysis inputs. Sentence ids are assigned `s1`, `s2`, ...
/// in insertion order.
#[derive(Default)]
pub struct InputBuilder {
    sentences: Vec<Sentence>,
    terms: BTreeMap<String, Vec<f32>>,
    axes: Vec<AnchorAxis>,
}

impl InputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a neutral sentence.
    pub fn sentence(self, juror: &str, text: &str, embedding: &[f32]) -> Self {
        self.stanced(juror, text, Stance::Neutral, embedding)
    }

    /// Add a sentence with an explicit stance.
    pub fn stanced(mut self, juror: &str, text: &str, stance: Stance, embedding: &[f32]) -> Self {
        let id = format!("s{}", self.sentences.len() + 1);
        self.sentences
            .push(Sentence::new(id, juror, text, stance, embedding.to_vec()));
        self
    }

    /// Add a multi-sentence unit produced at `window` granularity.
    pub fn window_unit(mut self, window: usize, juror: &str, text: &str, embedding: &[f32]) -> Self {
        let id = format!("w{}-{}", window, self.sentences.len() + 1);
        let mut unit = Sentence::new(id, juror, text, Stance::Neutral, embedding.to_vec());
        unit.unit_window = window;
        self.sentences.push(unit);
        self
    }

    /// Register a pre-computed term or seed-phrase vector.
    pub fn term(mut self, term: &str, embedding: &[f32]) -> Self {
        self.terms.insert(term.to_string(), embedding.to_vec());
        self
    }

    pub fn axis(mut self, axis: AnchorAxis) -> Self {
        self.axes.push(axis);
        self
    }

    pub fn build(self) -> AnalysisInput {
        AnalysisInput {
            sentences: self.sentences,
            term_embeddings: self.terms,
            anchor_axes: self.axes,
        }
    }
}

/// Builder for anchor axes.
pub struct AxisBuilder {
    id: String,
    name: String,
    negative: AnchorPole,
    positive: AnchorPole,
}

impl AxisBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let pole = |label: &str| AnchorPole {
            label: label.to_string(),
            seed_phrases: Vec::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            negative: pole("Negative"),
            positive: pole("Positive"),
        }
    }

    /// Set the negative pole label and its seed phrases.
    pub fn negative(mut self, label: &str, phrases: &[&str]) -> Self {
        self.negative = AnchorPole {
            label: label.to_string(),
            seed_phrases: phrases.iter().map(|p| p.to_string()).collect(),
        };
        self
    }

    /// Set the positive pole label and its seed phrases.
    pub fn positive(mut self, label: &str, phrases: &[&str]) -> Self {
        self.positive = AnchorPole {
            label: label.to_string(),
            seed_phrases: phrases.iter().map(|p| p.to_string()).collect(),
        };
        self
    }

    pub fn build(self) -> AnchorAxis {
        AnchorAxis {
            id: self.id,
            name: self.name,
            negative_pole: self.negative,
            positive_pole: self.positive,
        }
    }
}
