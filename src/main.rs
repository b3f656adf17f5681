//! Juryscope - concept extraction and embedding engine for juror feedback
//!
//! Usage:
//!   juryscope analyze input.json             Cluster, project, and build the graph
//!   juryscope analyze input.json --auto-k    Search K before clustering
//!   juryscope inspect result.json            Summarize a saved result
//!   juryscope config show                    Print the effective config
//!   juryscope --help                         Show all commands

use anyhow::Result;
use clap::Parser;

use juryscope::cli::output::OutputMode;
use juryscope::cli::Cli;
use juryscope::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("juryscope=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);

    let ctx = AppContext::new(cli.data_path.clone(), cli.config.as_deref())?;
    juryscope::cli::execute(&cli.command, &ctx, mode).await?;

    Ok(())
}
