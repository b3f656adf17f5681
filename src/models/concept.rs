//! Concept model: primary clusters and their one-level detail children.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hierarchy level of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptLevel {
    Primary,
    Detail,
}

/// Where a concept's label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSource {
    /// Built from the concept's top terms.
    #[default]
    Rule,
    /// Produced by the label synthesizer and accepted by the quality gates.
    Synthesized,
}

/// A cluster of semantically related sentences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub label_source: LabelSource,
    pub level: ConceptLevel,
    /// Set on detail concepts only.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub size: usize,
    pub centroid: Vec<f32>,
    pub top_terms: Vec<String>,
    pub representative_sentence_ids: Vec<String>,
    #[serde(default)]
    pub detail_concept_ids: Vec<String>,
    /// All member sentence ids (hard assignment).
    pub member_sentence_ids: Vec<String>,
}

/// Strict two-level concept tree stored as an arena.
///
/// Primary concepts reference their children through `detail_concept_ids`;
/// detail concepts point back through `parent_id`. Detail concepts never
/// have children of their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptTree {
    pub primary: Vec<Concept>,
    pub detail: Vec<Concept>,
}

impl ConceptTree {
    pub fn new(primary: Vec<Concept>) -> Self {
        Self {
            primary,
            detail: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Concept> {
        self.primary
            .iter()
            .chain(self.detail.iter())
            .find(|c| c.id == id)
    }

    /// Children of a primary concept, in insertion order.
    pub fn children_of(&self, parent_id: &str) -> Vec<&Concept> {
        self.detail
            .iter()
            .filter(|c| c.parent_id.as_deref() == Some(parent_id))
            .collect()
    }

    /// Attach detail concepts under a primary concept.
    ///
    /// Replaces any detail concepts previously attached to the same parent.
    pub fn attach_details(&mut self, parent_id: &str, mut details: Vec<Concept>) {
        self.detail
            .retain(|c| c.parent_id.as_deref() != Some(parent_id));
        for detail in &mut details {
            detail.level = ConceptLevel::Detail;
            detail.parent_id = Some(parent_id.to_string());
            detail.detail_concept_ids.clear();
        }
        let ids: Vec<String> = details.iter().map(|d| d.id.clone()).collect();
        if let Some(parent) = self.primary.iter_mut().find(|c| c.id == parent_id) {
            parent.detail_concept_ids = ids;
        }
        self.detail.extend(details);
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.detail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.detail.is_empty()
    }
}

/// Fractional assignment of a sentence to a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipWeight {
    pub sentence_id: String,
    pub concept_id: String,
    pub weight: f32,
}

/// Per-juror concept weights (concept id to weight), normalized to sum to 1.
pub type JurorVector = BTreeMap<String, f32>;

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str) -> Concept {
        Concept {
            id: id.to_string(),
            label: id.to_uppercase(),
            summary: None,
            label_source: LabelSource::Rule,
            level: ConceptLevel::Primary,
            parent_id: None,
            size: 1,
            centroid: vec![1.0, 0.0],
            top_terms: vec![],
            representative_sentence_ids: vec![],
            detail_concept_ids: vec![],
            member_sentence_ids: vec!["s1".to_string()],
        }
    }

    #[test]
    fn test_attach_details_links_both_directions() {
        let mut tree = ConceptTree::new(vec![concept("c0"), concept("c1")]);
        tree.attach_details("c0", vec![concept("c0.d0"), concept("c0.d1")]);

        let parent = tree.get("c0").unwrap();
        assert_eq!(parent.detail_concept_ids, vec!["c0.d0", "c0.d1"]);
        for child in tree.children_of("c0") {
            assert_eq!(child.parent_id.as_deref(), Some("c0"));
            assert_eq!(child.level, ConceptLevel::Detail);
        }
        assert!(tree.children_of("c1").is_empty());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_attach_details_replaces_previous_children() {
        let mut tree = ConceptTree::new(vec![concept("c0")]);
        tree.attach_details("c0", vec![concept("c0.d0"), concept("c0.d1")]);
        tree.attach_details("c0", vec![concept("c0.d9")]);
        assert_eq!(tree.detail.len(), 1);
        assert_eq!(tree.get("c0").unwrap().detail_concept_ids, vec!["c0.d9"]);
    }
}
