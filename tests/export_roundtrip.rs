//! Saving and reloading analysis results through the export layer.

mod common;

use pretty_assertions::assert_eq;

use common::{studio_config, studio_review};
use juryscope::models::AnalysisResult;
use juryscope::services::export::{default_result_path, result_to_string};
use juryscope::services::{
    load_input, load_result, noop_progress, save_result, AnalysisService, CancellationToken,
    ExportFormat,
};
use juryscope::JuryscopeError;

async fn searched_result() -> AnalysisResult {
    let mut config = studio_config();
    config.search.auto_k = true;
    config.search.k_max_override = Some(4);
    config.clustering.soft_membership = true;
    AnalysisService::default()
        .analyze(
            studio_review(),
            &config,
            noop_progress(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_json_round_trip_preserves_result() {
    let result = searched_result().await;
    let dir = tempfile::tempdir().unwrap();
    let path = default_result_path(dir.path(), &result, ExportFormat::Json);

    save_result(&result, &path).unwrap();
    let loaded = load_result(&path).unwrap();

    assert_eq!(loaded, result);
    assert!(path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".json")));
}

#[tokio::test]
async fn test_yaml_round_trip_preserves_result() {
    let result = searched_result().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("run.yaml");

    save_result(&result, &path).unwrap();
    let loaded = load_result(&path).unwrap();

    assert_eq!(loaded, result);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("# Juryscope analysis export"));
}

#[tokio::test]
async fn test_json_uses_camel_case_keys() {
    let result = searched_result().await;
    let text = result_to_string(&result, ExportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert!(value.get("runId").is_some());
    assert!(value.get("jurorVectors").is_some());
    assert!(value["diagnostics"]["searches"][0]["leaderboard"].is_array());
    assert_eq!(value["diagnostics"]["searches"][0]["kind"], "k");
}

#[test]
fn test_input_document_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.json");
    let input = studio_review();
    std::fs::write(&path, serde_json::to_string(&input).unwrap()).unwrap();

    let loaded = load_input(&path).unwrap();
    assert_eq!(loaded.sentences, input.sentences);
    assert_eq!(loaded.anchor_axes, input.anchor_axes);
}

#[test]
fn test_missing_input_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_input(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, JuryscopeError::Input(_)));
}
