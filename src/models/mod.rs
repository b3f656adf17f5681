pub mod concept;
pub mod graph;
pub mod result;
pub mod sentence;

pub use concept::{Concept, ConceptLevel, ConceptTree, JurorVector, LabelSource, MembershipWeight};
pub use graph::{
    concept_node_id, juror_node_id, Graph, GraphLink, GraphNode, LinkKind, NodeKind,
    StructuralRole,
};
pub use result::{
    AnalysisInput, AnalysisResult, AnchorAxis, AnchorAxisScores, AnchorPole, AxisLabel,
    CandidateParams, CandidateResult, ChosenParameters, ComponentScores, Diagnostics,
    HierarchyLevel, HygieneReport, LabelRejection, LabelReport, MinSizeReport,
    ProjectionSummary, SearchKind, SearchReport, SplitRecord,
};
pub use sentence::{Sentence, Stance};
