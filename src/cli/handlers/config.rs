//! `juryscope config`: show, initialize, and validate analysis config.

use anyhow::{bail, Context, Result};

use crate::cli::output::{output_json, print_error, print_success, OutputMode};
use crate::config::{AnalysisConfig, CONFIG_FILE_NAME};
use crate::init::AppContext;

pub fn handle_show(ctx: &AppContext, mode: OutputMode) -> Result<()> {
    if mode == OutputMode::Json {
        output_json(&ctx.config);
    } else {
        print!("{}", ctx.config.to_toml_string()?);
    }
    Ok(())
}

pub fn handle_init(ctx: &AppContext, force: bool, mode: OutputMode) -> Result<()> {
    let path = ctx.data_path.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    std::fs::create_dir_all(&ctx.data_path)
        .with_context(|| format!("Failed to create {}", ctx.data_path.display()))?;
    let toml = AnalysisConfig::default().to_toml_string()?;
    std::fs::write(&path, toml).with_context(|| format!("Failed to write {}", path.display()))?;

    if mode == OutputMode::Json {
        output_json(&serde_json::json!({ "path": path.display().to_string() }));
    } else {
        print_success(&format!("Wrote default config to {}", path.display()));
    }
    Ok(())
}

pub fn handle_validate(ctx: &AppContext, mode: OutputMode) -> Result<()> {
    let outcome = ctx.config.validate();
    if mode == OutputMode::Json {
        output_json(&serde_json::json!({
            "valid": outcome.is_ok(),
            "error": outcome.as_ref().err().map(|e| e.to_string()),
        }));
    }
    match outcome {
        Ok(()) => {
            if mode == OutputMode::Human {
                print_success("Configuration is valid");
            }
            Ok(())
        }
        Err(e) => {
            if mode == OutputMode::Human {
                print_error(&e.to_string());
            }
            Err(e.into())
        }
    }
}
