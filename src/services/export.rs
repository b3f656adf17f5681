//! Result export and input loading (JSON and YAML).

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::models::{AnalysisInput, AnalysisResult};
use crate::JuryscopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl ExportFormat {
    /// Format implied by a file extension; anything but `.yaml`/`.yml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ExportFormat::Yaml,
            _ => ExportFormat::Json,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }
}

fn encode<T: Serialize>(value: &T, format: ExportFormat) -> Result<String, JuryscopeError> {
    Ok(match format {
        ExportFormat::Json => serde_json::to_string_pretty(value)?,
        ExportFormat::Yaml => serde_yaml_ng::to_string(value)?,
    })
}

fn decode<T: DeserializeOwned>(content: &str, format: ExportFormat) -> Result<T, JuryscopeError> {
    Ok(match format {
        ExportFormat::Json => serde_json::from_str(content)?,
        ExportFormat::Yaml => serde_yaml_ng::from_str(content)?,
    })
}

pub fn result_to_string(
    result: &AnalysisResult,
    format: ExportFormat,
) -> Result<String, JuryscopeError> {
    let body = encode(result, format)?;
    Ok(match format {
        ExportFormat::Json => body,
        ExportFormat::Yaml => format!(
            "# Juryscope analysis export\n# Version: {}\n# Run: {}\n{}",
            env!("CARGO_PKG_VERSION"),
            result.run_id,
            body
        ),
    })
}

pub fn result_from_str(content: &str, format: ExportFormat) -> Result<AnalysisResult, JuryscopeError> {
    decode(content, format)
}

/// Write a result, choosing the format from the file extension.
pub fn save_result(result: &AnalysisResult, path: &Path) -> Result<(), JuryscopeError> {
    let format = ExportFormat::from_path(path);
    let content = result_to_string(result, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    info!("Saved analysis result to {}", path.display());
    Ok(())
}

pub fn load_result(path: &Path) -> Result<AnalysisResult, JuryscopeError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        JuryscopeError::Io(format!("Failed to read {}: {}", path.display(), e))
    })?;
    result_from_str(&content, ExportFormat::from_path(path))
}

/// Load the segmenter/embedder output an analysis consumes.
pub fn load_input(path: &Path) -> Result<AnalysisInput, JuryscopeError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        JuryscopeError::Input(format!("Failed to read input {}: {}", path.display(), e))
    })?;
    decode(&content, ExportFormat::from_path(path))
}

/// Default result path: `{dir}/juryscope-{run_id}.{ext}`.
pub fn default_result_path(dir: &Path, result: &AnalysisResult, format: ExportFormat) -> PathBuf {
    dir.join(format!("juryscope-{}.{}", result.run_id, format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a/result.yaml")), ExportFormat::Yaml);
        assert_eq!(ExportFormat::from_path(Path::new("result.YML")), ExportFormat::Yaml);
        assert_eq!(ExportFormat::from_path(Path::new("result.json")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("result")), ExportFormat::Json);
    }

    #[test]
    fn test_load_input_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.yaml");
        std::fs::write(
            &path,
            "sentences:\n  - id: s1\n    juror: Ana\n    text: Bright hall.\n    stance: praise\n    embedding: [1.0, 0.0]\n",
        )
        .unwrap();
        let input = load_input(&path).unwrap();
        assert_eq!(input.sentences.len(), 1);
        assert_eq!(input.sentences[0].juror, "Ana");
        assert!(input.anchor_axes.is_empty());
    }

    #[test]
    fn test_missing_input_is_input_error() {
        let err = load_input(Path::new("/nonexistent/juryscope-input.json")).unwrap_err();
        assert!(matches!(err, JuryscopeError::Input(_)));
    }
}
