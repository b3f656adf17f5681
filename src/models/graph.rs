//! Presentation graph: juror and concept nodes plus derived links.

use serde::{Deserialize, Serialize};

use crate::models::sentence::Stance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Juror,
    Concept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    JurorConcept,
    JurorJuror,
    ConceptConcept,
}

/// Structural emphasis for visualization. Never feeds back into weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralRole {
    #[default]
    Connected,
    Hub,
    Bridge,
    Peripheral,
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    /// Sentences for concepts; sentences authored for jurors.
    pub size: usize,
    pub pc_values: Vec<f32>,
    #[serde(default)]
    pub degree: f64,
    #[serde(default)]
    pub betweenness: f64,
    #[serde(default)]
    pub structural_role: StructuralRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub kind: LinkKind,
    pub weight: f32,
    /// Juror-concept links only.
    #[serde(default)]
    pub stance: Option<Stance>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    /// `Bridge` when removing the link separates concept groups.
    #[serde(default)]
    pub structural_role: Option<StructuralRole>,
}

impl GraphLink {
    pub fn is_bridge(&self) -> bool {
        self.structural_role == Some(StructuralRole::Bridge)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn links_of_kind(&self, kind: LinkKind) -> impl Iterator<Item = &GraphLink> {
        self.links.iter().filter(move |l| l.kind == kind)
    }
}

/// Graph id for a juror node.
pub fn juror_node_id(juror: &str) -> String {
    format!("juror:{}", juror)
}

/// Graph id for a concept node.
pub fn concept_node_id(concept_id: &str) -> String {
    format!("concept:{}", concept_id)
}
