pub mod analysis;
pub mod anchors;
pub mod cancel;
pub mod clustering;
pub mod evidence;
pub mod export;
pub mod graph;
pub mod hierarchy;
pub mod hygiene;
pub mod labeling;
pub mod progress;
pub mod projection;
pub mod scoring;
pub mod search;
pub mod terms;
pub mod units;

pub use analysis::AnalysisService;
pub use anchors::{AnchorDirection, AnchorSet};
pub use cancel::CancellationToken;
pub use clustering::{cluster, ClusterOptions, ClusterOutput, Partition};
pub use export::{load_input, load_result, save_result, ExportFormat};
pub use graph::GraphAssembler;
pub use hierarchy::Dendrogram;
pub use labeling::{
    CachedLabelSynthesizer, ConceptEvidence, LabelService, LabelSynthesizer,
    NoopLabelSynthesizer, SynthesizedLabel,
};
pub use progress::{
    noop_progress, ChannelProgressReporter, NoopProgressReporter, ProgressEvent,
    ProgressReporter, RunProgress,
};
pub use projection::{Pca, Projection};
pub use search::{Choice, SearchEngine};
pub use terms::{Bm25Scorer, TermScorer};
