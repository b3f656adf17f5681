//! Graph assembler: juror and concept nodes, weighted links, bridge flags,
//! and node centrality.
//!
//! Links are derived from memberships and vectors on every run and never feed
//! back into clustering. Structural roles are for visual emphasis only.

use std::collections::{BTreeMap, HashMap};

use graphrs::{algorithms::centrality, Edge, Graph as CentralityGraph, GraphSpecs, Node};
use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::models::{
    concept_node_id, juror_node_id, Concept, Graph, GraphLink, GraphNode, JurorVector, LinkKind,
    MembershipWeight, NodeKind, Sentence, Stance, StructuralRole,
};
use crate::utils::math::cosine_similarity;

/// Map centrality scores to a structural role.
pub(crate) fn assign_structural_role(degree: f64, betweenness: f64) -> StructuralRole {
    if degree == 0.0 {
        StructuralRole::Isolated
    } else if degree > 0.5 {
        StructuralRole::Hub
    } else if betweenness > 0.3 && degree < 0.5 {
        StructuralRole::Bridge
    } else if degree < 0.2 && betweenness < 0.1 {
        StructuralRole::Peripheral
    } else {
        StructuralRole::Connected
    }
}

/// Per-juror concept weights: membership weight sums, normalized per juror.
pub fn juror_vectors(
    units: &[Sentence],
    memberships: &[MembershipWeight],
) -> BTreeMap<String, JurorVector> {
    let juror_of: HashMap<&str, &str> = units
        .iter()
        .map(|u| (u.id.as_str(), u.juror.as_str()))
        .collect();
    let mut raw: BTreeMap<String, JurorVector> = BTreeMap::new();
    for m in memberships {
        let Some(juror) = juror_of.get(m.sentence_id.as_str()) else {
            continue;
        };
        *raw.entry(juror.to_string())
            .or_default()
            .entry(m.concept_id.clone())
            .or_default() += m.weight;
    }
    for vector in raw.values_mut() {
        let total: f32 = vector.values().sum();
        if total > 0.0 {
            for w in vector.values_mut() {
                *w /= total;
            }
        }
    }
    raw
}

/// Cosine similarity of two sparse juror vectors.
fn juror_similarity(a: &JurorVector, b: &JurorVector) -> f32 {
    let dot: f32 = a
        .iter()
        .filter_map(|(k, x)| b.get(k).map(|y| x * y))
        .sum();
    let na = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.values().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)).clamp(0.0, 1.0)
    }
}

pub struct GraphAssembler<'a> {
    config: &'a GraphConfig,
}

impl<'a> GraphAssembler<'a> {
    pub fn new(config: &'a GraphConfig) -> Self {
        Self { config }
    }

    /// Juror to concept links from juror vector entries at or above
    /// `min_edge_weight`, with majority stance and evidence ids.
    pub fn juror_concept_links(
        &self,
        units: &[Sentence],
        memberships: &[MembershipWeight],
        vectors: &BTreeMap<String, JurorVector>,
    ) -> Vec<GraphLink> {
        let unit_of: HashMap<&str, &Sentence> = units.iter().map(|u| (u.id.as_str(), u)).collect();

        // (juror, concept) -> [(weight, input position, sentence)]
        let mut evidence: BTreeMap<(&str, &str), Vec<(f32, usize, &Sentence)>> = BTreeMap::new();
        for (pos, m) in memberships.iter().enumerate() {
            if let Some(unit) = unit_of.get(m.sentence_id.as_str()) {
                evidence
                    .entry((unit.juror.as_str(), m.concept_id.as_str()))
                    .or_default()
                    .push((m.weight, pos, unit));
            }
        }

        let mut links = Vec::new();
        for (juror, vector) in vectors {
            for (concept_id, weight) in vector {
                if *weight <= 0.0 || *weight < self.config.min_edge_weight {
                    continue;
                }
                let mut items = evidence
                    .get(&(juror.as_str(), concept_id.as_str()))
                    .cloned()
                    .unwrap_or_default();
                items.sort_by(|a, b| {
                    b.0.partial_cmp(&a.0)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.1.cmp(&b.1))
                });
                let stance = Stance::majority(items.iter().map(|(_, _, s)| s.stance));
                links.push(GraphLink {
                    source: juror_node_id(juror),
                    target: concept_node_id(concept_id),
                    kind: LinkKind::JurorConcept,
                    weight: *weight,
                    stance: Some(stance),
                    evidence_ids: items.iter().map(|(_, _, s)| s.id.clone()).collect(),
                    structural_role: None,
                });
            }
        }
        links
    }

    /// Concept pairs whose centroid similarity reaches the threshold.
    pub fn concept_links(&self, concepts: &[Concept]) -> Vec<GraphLink> {
        let mut links = Vec::new();
        for i in 0..concepts.len() {
            for j in (i + 1)..concepts.len() {
                let sim = cosine_similarity(&concepts[i].centroid, &concepts[j].centroid);
                if sim >= self.config.similarity_threshold {
                    links.push(GraphLink {
                        source: concept_node_id(&concepts[i].id),
                        target: concept_node_id(&concepts[j].id),
                        kind: LinkKind::ConceptConcept,
                        weight: sim.clamp(0.0, 1.0),
                        stance: None,
                        evidence_ids: Vec::new(),
                        structural_role: None,
                    });
                }
            }
        }
        links
    }

    /// Juror pairs whose concept-overlap similarity reaches the threshold.
    pub fn juror_links(&self, vectors: &BTreeMap<String, JurorVector>) -> Vec<GraphLink> {
        let entries: Vec<(&String, &JurorVector)> = vectors.iter().collect();
        let mut links = Vec::new();
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let sim = juror_similarity(entries[i].1, entries[j].1);
                if sim >= self.config.similarity_threshold && sim > 0.0 {
                    links.push(GraphLink {
                        source: juror_node_id(entries[i].0),
                        target: juror_node_id(entries[j].0),
                        kind: LinkKind::JurorJuror,
                        weight: sim,
                        stance: None,
                        evidence_ids: Vec::new(),
                        structural_role: None,
                    });
                }
            }
        }
        links
    }

    /// Build every link kind, flag bridges, and score node centrality.
    pub fn assemble(
        &self,
        mut nodes: Vec<GraphNode>,
        units: &[Sentence],
        memberships: &[MembershipWeight],
        concepts: &[Concept],
        vectors: &BTreeMap<String, JurorVector>,
    ) -> Graph {
        let mut links = self.juror_concept_links(units, memberships, vectors);
        links.extend(self.juror_links(vectors));
        links.extend(self.concept_links(concepts));

        mark_bridges(&nodes, &mut links);
        apply_centrality(&mut nodes, &links);

        debug!(
            nodes = nodes.len(),
            links = links.len(),
            bridges = links.iter().filter(|l| l.is_bridge()).count(),
            "graph assembled"
        );
        Graph { nodes, links }
    }
}

/// Flag links whose removal separates two groups that each hold a concept.
pub fn mark_bridges(nodes: &[GraphNode], links: &mut [GraphLink]) {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let n = nodes.len();
    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
    for (li, link) in links.iter().enumerate() {
        if let (Some(&a), Some(&b)) = (index.get(link.source.as_str()), index.get(link.target.as_str())) {
            if a != b {
                adjacency[a].push((b, li));
                adjacency[b].push((a, li));
            }
        }
    }
    let is_concept: Vec<usize> = nodes
        .iter()
        .map(|n| usize::from(n.kind == NodeKind::Concept))
        .collect();

    let mut state = BridgeSearch {
        adjacency: &adjacency,
        is_concept: &is_concept,
        disc: vec![usize::MAX; n],
        low: vec![0; n],
        subtree_concepts: vec![0; n],
        timer: 0,
        bridges: Vec::new(),
    };

    for root in 0..n {
        if state.disc[root] != usize::MAX {
            continue;
        }
        let first_bridge = state.bridges.len();
        state.visit(root, None);
        let component_concepts = state.subtree_concepts[root];
        for &(child, link_index) in &state.bridges[first_bridge..] {
            let below = state.subtree_concepts[child];
            if below > 0 && component_concepts - below > 0 {
                links[link_index].structural_role = Some(StructuralRole::Bridge);
            }
        }
    }
}

struct BridgeSearch<'g> {
    adjacency: &'g [Vec<(usize, usize)>],
    is_concept: &'g [usize],
    disc: Vec<usize>,
    low: Vec<usize>,
    subtree_concepts: Vec<usize>,
    timer: usize,
    /// `(child node, link index)` for every bridge found.
    bridges: Vec<(usize, usize)>,
}

impl BridgeSearch<'_> {
    fn visit(&mut self, u: usize, parent_link: Option<usize>) {
        self.disc[u] = self.timer;
        self.low[u] = self.timer;
        self.timer += 1;
        self.subtree_concepts[u] = self.is_concept[u];

        for &(v, link) in &self.adjacency[u] {
            if Some(link) == parent_link {
                continue;
            }
            if self.disc[v] == usize::MAX {
                self.visit(v, Some(link));
                self.low[u] = self.low[u].min(self.low[v]);
                self.subtree_concepts[u] += self.subtree_concepts[v];
                if self.low[v] > self.disc[u] {
                    self.bridges.push((v, link));
                }
            } else {
                self.low[u] = self.low[u].min(self.disc[v]);
            }
        }
    }
}

/// Normalized degree and betweenness per node, plus the derived role.
pub fn apply_centrality(nodes: &mut [GraphNode], links: &[GraphLink]) {
    let n = nodes.len();
    if n <= 1 {
        for node in nodes.iter_mut() {
            node.degree = 0.0;
            node.betweenness = 0.0;
            node.structural_role = StructuralRole::Isolated;
        }
        return;
    }

    let mut degree: HashMap<&str, usize> = HashMap::new();
    for link in links {
        *degree.entry(link.source.as_str()).or_default() += 1;
        *degree.entry(link.target.as_str()).or_default() += 1;
    }

    let betweenness = betweenness_scores(nodes, links);

    for node in nodes.iter_mut() {
        let d = degree.get(node.id.as_str()).copied().unwrap_or(0) as f64 / (n - 1) as f64;
        // Rounded so summation order inside the centrality pass cannot leak
        // into otherwise identical results.
        let b = betweenness
            .get(&node.id)
            .copied()
            .filter(|b| b.is_finite())
            .map(|b| (b * 1e9).round() / 1e9)
            .unwrap_or(0.0);
        node.degree = d;
        node.betweenness = b;
        node.structural_role = assign_structural_role(d, b);
    }
}

fn betweenness_scores(nodes: &[GraphNode], links: &[GraphLink]) -> HashMap<String, f64> {
    if nodes.len() <= 2 {
        return HashMap::new();
    }
    let mut graph = CentralityGraph::<String, ()>::new(GraphSpecs::undirected());
    for node in nodes {
        graph.add_node(Node::from_name(node.id.clone()));
    }
    for link in links {
        if link.source == link.target {
            continue;
        }
        if let Err(e) = graph.add_edge(Edge::new(link.source.clone(), link.target.clone())) {
            warn!("Skipping link {} - {}: {:?}", link.source, link.target, e);
        }
    }
    match centrality::betweenness::betweenness_centrality(&graph, false, true) {
        Ok(scores) => scores,
        Err(e) => {
            warn!("Betweenness centrality error: {:?}", e);
            HashMap::new()
        }
    }
}
