//! `juryscope analyze`: run the engine over an input file.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::handlers::inspect::print_summary;
use crate::cli::output::{output_json, print_hint, print_success, print_warning, OutputMode};
use crate::cli::progress::BarProgressReporter;
use crate::cli::AnalyzeOverrides;
use crate::init::AppContext;
use crate::services::export::{default_result_path, load_input, save_result, ExportFormat};
use crate::services::progress::{noop_progress, ProgressReporter};
use crate::services::CancellationToken;

pub async fn handle_analyze(
    ctx: &AppContext,
    input: &Path,
    output: Option<&Path>,
    no_save: bool,
    quiet: bool,
    overrides: &AnalyzeOverrides,
    mode: OutputMode,
) -> Result<()> {
    let mut config = ctx.config.clone();
    overrides.apply(&mut config);

    let input_doc =
        load_input(input).with_context(|| format!("Failed to load input {}", input.display()))?;

    let bar = (!quiet && mode == OutputMode::Human).then(|| Arc::new(BarProgressReporter::new()));
    let reporter: Arc<dyn ProgressReporter> = match &bar {
        Some(bar) => bar.clone(),
        None => noop_progress(),
    };

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let outcome = ctx
        .analysis
        .analyze(input_doc, &config, reporter, &cancel)
        .await;
    ctrl_c.abort();
    if let Some(bar) = &bar {
        bar.finish();
    }
    let result = outcome.context("Analysis failed")?;

    let saved_to = if no_save {
        None
    } else {
        let path = match output {
            Some(p) => p.to_path_buf(),
            None => default_result_path(&ctx.data_path.join("runs"), &result, ExportFormat::Json),
        };
        save_result(&result, &path)
            .with_context(|| format!("Failed to save result to {}", path.display()))?;
        Some(path)
    };

    if mode == OutputMode::Json {
        output_json(&result);
        return Ok(());
    }

    print_summary(&result);
    let hygiene = &result.diagnostics.hygiene;
    if hygiene.round_limit_hit {
        print_warning("Dominance cap stopped at its round limit; one concept is still oversized.");
    } else if hygiene.still_dominant {
        print_warning("One concept is still oversized and could not be split further.");
    }
    if result.diagnostics.labels.service_failures > 0 {
        print_warning(&format!(
            "{} label synthesis call(s) failed; rule-based labels were used.",
            result.diagnostics.labels.service_failures
        ));
    }
    match saved_to {
        Some(path) => {
            print_success(&format!("Saved result to {}", path.display()));
            print_hint(&format!(
                "Inspect with: juryscope inspect {} --section concepts",
                path.display()
            ));
        }
        None => print_success("Analysis complete (not saved)"),
    }
    Ok(())
}
