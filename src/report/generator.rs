//! Markdown and JSON report generation.
//!
//! The Markdown report lists the run metadata, an optional whole-chart
//! overview and one section per palace in chart order.

use crate::models::{AnalysisReport, PalaceReport, ReportMetadata};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push_str("# Ziwei Chart Reading\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));

    if let Some(ref overview) = report.overview {
        output.push_str(&generate_overview_section(overview));
    }

    if !report.palaces.is_empty() {
        output.push_str(&generate_palaces_section(&report.palaces));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Subject:** {}\n", metadata.subject));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Palaces Analyzed:** {}\n",
        metadata.palaces_analyzed
    ));
    if metadata.palaces_failed > 0 {
        section.push_str(&format!(
            "- **Palaces Failed:** {}\n",
            metadata.palaces_failed
        ));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn palace_anchor(palace: &PalaceReport) -> String {
    format!("palace-{}", palace.index)
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &AnalysisReport) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");

    if report.overview.is_some() {
        toc.push_str("- [Overview](#overview)\n");
    }

    if !report.palaces.is_empty() {
        toc.push_str("- [Palaces](#palaces)\n");
        for palace in &report.palaces {
            toc.push_str(&format!(
                "  - [{}](#{})\n",
                palace.name,
                palace_anchor(palace)
            ));
        }
    }

    toc.push('\n');

    toc
}

/// Generate the overview section.
fn generate_overview_section(overview: &str) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str(overview.trim_end());
    section.push_str("\n\n");

    section
}

/// Generate one section per palace.
fn generate_palaces_section(palaces: &[PalaceReport]) -> String {
    let mut section = String::new();

    section.push_str("## Palaces\n\n");

    for palace in palaces {
        section.push_str(&format!(
            "### {}. {} {{#{}}}\n\n",
            palace.index + 1,
            palace.name,
            palace_anchor(palace)
        ));

        if !palace.is_successful() {
            section.push_str("> ⚠️ The model could not be reached for this palace.\n\n");
        }

        section.push_str(palace.analysis.trim_end());
        section.push_str("\n\n---\n\n");
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "*Report generated by ziwei-analyst*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
