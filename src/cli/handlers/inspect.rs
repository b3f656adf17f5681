//! `juryscope inspect`: read back a saved result.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{
    output_json, print_header, print_kv, print_table, truncate, OutputMode,
};
use crate::cli::InspectSection;
use crate::models::{AnalysisResult, LinkKind};
use crate::services::export::load_result;

pub fn handle_inspect(file: &Path, section: InspectSection, mode: OutputMode) -> Result<()> {
    let result =
        load_result(file).with_context(|| format!("Failed to load result {}", file.display()))?;

    if mode == OutputMode::Json {
        match section {
            InspectSection::Summary => output_json(&serde_json::json!({
                "runId": result.run_id,
                "generatedAt": result.generated_at,
                "parameters": result.parameters,
                "concepts": result.concepts.primary.len(),
                "detailConcepts": result.concepts.detail.len(),
                "nodes": result.nodes.len(),
                "links": result.links.len(),
                "labels": result.diagnostics.labels,
            })),
            InspectSection::Concepts => output_json(&result.concepts),
            InspectSection::Search => output_json(&result.diagnostics.searches),
            InspectSection::Axes => output_json(&serde_json::json!({
                "projection": result.projection,
                "anchorAxes": result.anchor_axes,
            })),
            InspectSection::Graph => output_json(&serde_json::json!({
                "nodes": result.nodes,
                "links": result.links,
            })),
        }
        return Ok(());
    }

    match section {
        InspectSection::Summary => print_summary(&result),
        InspectSection::Concepts => print_concepts(&result),
        InspectSection::Search => print_search(&result),
        InspectSection::Axes => print_axes(&result),
        InspectSection::Graph => print_graph(&result),
    }
    Ok(())
}

pub fn print_summary(result: &AnalysisResult) {
    let p = &result.parameters;
    print_header("Analysis");
    print_kv("Run", &result.run_id.to_string());
    print_kv("Generated", &result.generated_at.to_rfc3339());
    print_kv(
        "Parameters",
        &format!(
            "k={} seed={} window={} weights={:.2}/{:.2} mode={:?} soft={}",
            p.k,
            p.seed,
            p.unit_window,
            p.semantic_weight,
            p.frequency_weight,
            p.clustering_mode,
            p.soft_membership
        ),
    );
    print_kv(
        "Concepts",
        &format!(
            "{} primary, {} detail",
            result.concepts.primary.len(),
            result.concepts.detail.len()
        ),
    );
    print_kv(
        "Graph",
        &format!("{} nodes, {} links", result.nodes.len(), result.links.len()),
    );
    print_kv(
        "Labels",
        &format!(
            "{} synthesized, {} rule-based, {} rejected",
            result.diagnostics.labels.synthesized,
            result.diagnostics.labels.rule_based,
            result.diagnostics.labels.rejected.len()
        ),
    );
    print_concepts(result);
}

fn print_concepts(result: &AnalysisResult) {
    let rows = result
        .concepts
        .primary
        .iter()
        .flat_map(|c| {
            let mut rows = vec![vec![
                c.id.clone(),
                truncate(&c.label, 40),
                c.size.to_string(),
                truncate(&c.top_terms.join(", "), 40),
            ]];
            for child in result.concepts.children_of(&c.id) {
                rows.push(vec![
                    format!("  {}", child.id),
                    truncate(&child.label, 40),
                    child.size.to_string(),
                    truncate(&child.top_terms.join(", "), 40),
                ]);
            }
            rows
        })
        .collect();
    print_table(&["Concept", "Label", "Size", "Top terms"], rows);
}

fn print_search(result: &AnalysisResult) {
    if result.diagnostics.searches.is_empty() {
        println!("No hyperparameter search was run.");
        return;
    }
    for report in &result.diagnostics.searches {
        print_header(&format!("{} search", report.kind.as_str()));
        let rows = report
            .leaderboard
            .iter()
            .map(|c| {
                let chosen = report.selected == Some(c.params);
                vec![
                    format!("{}{}", if chosen { "* " } else { "" }, c.params.describe()),
                    if c.valid {
                        format!("{:.4}", c.score)
                    } else {
                        "-".to_string()
                    },
                    format!("{:.3}", c.component_scores.coherence),
                    format!("{:.3}", c.component_scores.separation),
                    format!("{:.3}", c.component_scores.stability),
                    c.reason.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(
            &["Candidate", "Score", "Coherence", "Separation", "Stability", "Note"],
            rows,
        );
    }
}

fn print_axes(result: &AnalysisResult) {
    let projection = &result.projection;
    print_header(&format!(
        "Projection ({} of {} components)",
        projection.applied_num_dimensions,
        projection.explained_variances.len()
    ));
    let rows = projection
        .axis_labels
        .iter()
        .map(|a| {
            let ratio = if projection.total_variance > 0.0 {
                projection.explained_variances[a.axis_index] / projection.total_variance
            } else {
                0.0
            };
            vec![
                format!("PC{}", a.axis_index + 1),
                truncate(&a.negative_pole, 30),
                truncate(&a.positive_pole, 30),
                format!("{:.1}%", ratio * 100.0),
            ]
        })
        .collect();
    print_table(&["Axis", "Negative", "Positive", "Variance"], rows);

    for axis in &result.anchor_axes {
        print_header(&format!(
            "{} ({} vs {})",
            axis.name, axis.negative_label, axis.positive_label
        ));
        let mut scores: Vec<(&String, &f32)> = axis.scores.iter().collect();
        scores.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        let rows = scores
            .into_iter()
            .map(|(id, s)| vec![id.clone(), format!("{:+.3}", s)])
            .collect();
        print_table(&["Node", "Score"], rows);
    }
}

fn print_graph(result: &AnalysisResult) {
    let rows = result
        .nodes
        .iter()
        .map(|n| {
            vec![
                n.id.clone(),
                truncate(&n.label, 30),
                n.size.to_string(),
                format!("{:.3}", n.degree),
                format!("{:.3}", n.betweenness),
                format!("{:?}", n.structural_role).to_lowercase(),
            ]
        })
        .collect();
    print_table(
        &["Node", "Label", "Size", "Degree", "Betweenness", "Role"],
        rows,
    );
    let count = |kind: LinkKind| result.links.iter().filter(|l| l.kind == kind).count();
    print_kv(
        "Links",
        &format!(
            "{} juror-concept, {} juror-juror, {} concept-concept, {} bridges",
            count(LinkKind::JurorConcept),
            count(LinkKind::JurorJuror),
            count(LinkKind::ConceptConcept),
            result.links.iter().filter(|l| l.is_bridge()).count()
        ),
    );
}
