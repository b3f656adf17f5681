//! CLI interface for Juryscope.

pub mod handlers;
pub mod output;
pub mod progress;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{AnalysisConfig, ClusteringMode, CutType, DimensionMode};
use crate::init::AppContext;
use output::OutputMode;

/// Juryscope - concept extraction and embedding engine for juror feedback
#[derive(Parser)]
#[command(name = "juryscope", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.juryscope)
    #[arg(long, env = "JURYSCOPE_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Analysis config file (TOML); defaults to {data_path}/analysis.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Kmeans,
    Hierarchical,
}

impl From<ModeArg> for ClusteringMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Kmeans => ClusteringMode::Kmeans,
            ModeArg::Hierarchical => ClusteringMode::Hierarchical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DimensionArg {
    Manual,
    Elbow,
    Threshold,
}

impl From<DimensionArg> for DimensionMode {
    fn from(mode: DimensionArg) -> Self {
        match mode {
            DimensionArg::Manual => DimensionMode::Manual,
            DimensionArg::Elbow => DimensionMode::Elbow,
            DimensionArg::Threshold => DimensionMode::Threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InspectSection {
    /// Chosen parameters and counts
    Summary,
    /// Primary and detail concepts
    Concepts,
    /// Search leaderboards
    Search,
    /// Projection axes and anchor axes
    Axes,
    /// Graph nodes with centrality
    Graph,
}

/// Per-run overrides of the loaded config.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct AnalyzeOverrides {
    /// Number of primary concepts
    #[arg(long)]
    pub k: Option<usize>,
    /// Clustering seed
    #[arg(long)]
    pub seed: Option<u64>,
    /// Clustering algorithm
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
    /// Cut a hierarchical tree at this percent of the merge-distance range
    #[arg(long)]
    pub granularity: Option<f64>,
    /// Fractional membership instead of hard assignment
    #[arg(long)]
    pub soft: bool,
    /// Search K
    #[arg(long)]
    pub auto_k: bool,
    /// Search the clustering seed
    #[arg(long)]
    pub auto_seed: bool,
    /// Search the text-unit window
    #[arg(long)]
    pub auto_unit: bool,
    /// Search the evidence-ranking weights
    #[arg(long)]
    pub auto_weights: bool,
    /// Lower bound for K search
    #[arg(long)]
    pub k_min: Option<usize>,
    /// Upper bound for K search
    #[arg(long)]
    pub k_max: Option<usize>,
    /// How many projected dimensions to keep
    #[arg(long, value_enum)]
    pub dimension_mode: Option<DimensionArg>,
    /// Projected dimensions in manual mode
    #[arg(long)]
    pub dimensions: Option<usize>,
    /// Skip detail (second-level) concepts
    #[arg(long)]
    pub no_detail: bool,
    /// Split oversized concepts (may return more than K concepts)
    #[arg(long)]
    pub dominance_cap: bool,
}

impl AnalyzeOverrides {
    pub fn apply(&self, config: &mut AnalysisConfig) {
        let c = &mut config.clustering;
        if let Some(k) = self.k {
            c.k_concepts = k;
        }
        if let Some(seed) = self.seed {
            c.cluster_seed = seed;
        }
        if let Some(mode) = self.mode {
            c.clustering_mode = mode.into();
        }
        if let Some(percent) = self.granularity {
            c.cut_type = CutType::Granularity;
            c.granularity_percent = percent;
        }
        if self.soft {
            c.soft_membership = true;
        }
        if self.no_detail {
            c.enable_detail = false;
        }
        if self.dominance_cap {
            config.hygiene.enable_dominance_cap = true;
        }

        let s = &mut config.search;
        s.auto_k |= self.auto_k;
        s.auto_seed |= self.auto_seed;
        s.auto_unit |= self.auto_unit;
        s.auto_weights |= self.auto_weights;
        if self.k_min.is_some() {
            s.k_min_override = self.k_min;
        }
        if self.k_max.is_some() {
            s.k_max_override = self.k_max;
        }

        let p = &mut config.projection;
        if let Some(mode) = self.dimension_mode {
            p.dimension_mode = mode.into();
        }
        if let Some(n) = self.dimensions {
            p.num_dimensions = n;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cluster segmented juror feedback into concepts and build the graph
    Analyze {
        /// Input file (JSON or YAML) with sentences, term embeddings, and anchor axes
        input: PathBuf,
        /// Write the result here (.json or .yaml); default {data_path}/runs/
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Do not write the result to disk
        #[arg(long)]
        no_save: bool,
        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
        #[command(flatten)]
        overrides: AnalyzeOverrides,
    },

    /// Inspect a saved analysis result
    Inspect {
        /// Result file (.json or .yaml)
        file: PathBuf,
        /// Section to show
        #[arg(long, value_enum, default_value = "summary")]
        section: InspectSection,
    },

    /// Analysis configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the default configuration to {data_path}/analysis.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check the effective configuration for contradictions
    Validate,
}

pub async fn execute(command: &Commands, ctx: &AppContext, mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Analyze {
            input,
            output,
            no_save,
            quiet,
            overrides,
        } => {
            handlers::analyze::handle_analyze(
                ctx,
                input,
                output.as_deref(),
                *no_save,
                *quiet,
                overrides,
                mode,
            )
            .await?
        }
        Commands::Inspect { file, section } => {
            handlers::inspect::handle_inspect(file, *section, mode)?
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => handlers::config::handle_show(ctx, mode)?,
            ConfigCommands::Init { force } => handlers::config::handle_init(ctx, *force, mode)?,
            ConfigCommands::Validate => handlers::config::handle_validate(ctx, mode)?,
        },
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "juryscope", &mut std::io::stdout());
        }
    }
    Ok(())
}
