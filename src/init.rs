//! Shared initialization for CLI commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{load_config, AnalysisConfig};
use crate::embedding::NoopEmbeddingService;
use crate::services::{AnalysisService, NoopLabelSynthesizer};

pub const DATA_PATH_ENV_VAR: &str = "JURYSCOPE_DATA_PATH";

/// Application context: resolved data path, loaded config, and the engine.
pub struct AppContext {
    pub data_path: PathBuf,
    pub config: AnalysisConfig,
    pub analysis: Arc<AnalysisService>,
}

/// Data path priority: explicit path > JURYSCOPE_DATA_PATH env >
/// ./.juryscope (if exists) > ~/.juryscope
pub fn resolve_data_path(explicit_path: Option<PathBuf>) -> PathBuf {
    explicit_path
        .or_else(|| std::env::var(DATA_PATH_ENV_VAR).ok().map(PathBuf::from))
        .or_else(|| {
            let local_path = Path::new(".juryscope");
            if local_path.exists() && local_path.is_dir() {
                Some(local_path.to_path_buf())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".juryscope"))
                .unwrap_or_else(|| PathBuf::from(".juryscope"))
        })
}

impl AppContext {
    pub fn new(explicit_path: Option<PathBuf>, config_path: Option<&Path>) -> Result<Self> {
        let data_path = resolve_data_path(explicit_path);
        tracing::info!("Using data path: {}", data_path.display());

        let config = load_config(config_path, &data_path).context("Failed to load analysis config")?;

        let analysis = AnalysisService::new(
            Arc::new(NoopEmbeddingService::new()),
            Arc::new(NoopLabelSynthesizer),
            &config.labels,
        );

        Ok(Self {
            data_path,
            config,
            analysis: Arc::new(analysis),
        })
    }
}
