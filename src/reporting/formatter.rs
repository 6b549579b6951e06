use std::fmt::Write;

use crate::models::comparison::{ComparisonResult, SeverityDisagreement};
use crate::models::finding::{Finding, Severity};
use crate::models::report::{RunReport, RunStatus};
use crate::utils::formatting::{format_duration, format_percent};
use crate::utils::truncation::truncate_chars;

const TABLE_CELL_LENGTH: usize = 80;
const SEVERITIES: [Severity; 4] = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low];

fn location_text(finding: &Finding) -> String {
    finding
        .location
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "(no location)".to_string())
}

/// Markdown table cells cannot hold pipes or newlines.
fn cell(text: &str) -> String {
    truncate_chars(&text.replace('|', "\\|").replace('\n', " "), TABLE_CELL_LENGTH)
}

pub fn format_finding_markdown(finding: &Finding) -> String {
    let sources: Vec<&str> = finding.contributing_sources.iter().map(|s| s.as_str()).collect();
    let dimensions: Vec<&str> = finding.dimensions.iter().map(String::as_str).collect();
    format!(
        "### {} ({})\n\n**Severity:** {}\n**Confidence:** {}\n**Sources:** {}\n**Dimensions:** {}\n\n{}\n",
        location_text(finding),
        finding.category,
        finding.severity,
        finding.confidence,
        sources.join(", "),
        dimensions.join(", "),
        finding.description,
    )
}

pub fn format_severity_summary(findings: &[Finding]) -> String {
    let mut out = String::from("| Severity | Count |\n|---|---|\n");
    for severity in SEVERITIES {
        let count = findings.iter().filter(|f| f.severity == severity).count();
        let _ = writeln!(out, "| {} | {} |", severity, count);
    }
    let _ = writeln!(out, "| **Total** | **{}** |", findings.len());
    out
}

pub fn format_run_report(report: &RunReport) -> String {
    let mut out = format!("# Review: {}\n\n", report.source_label);
    let _ = writeln!(out, "- Scope: `{}`", report.scope);
    let _ = writeln!(out, "- Status: {}", status_text(report.status));
    let _ = writeln!(out, "- Duration: {}", format_duration(report.duration_ms()));
    let _ = writeln!(out, "- Run: {}\n", report.run_id);
    out.push_str(&format_severity_summary(&report.findings));

    if !report.dimension_failures.is_empty() {
        out.push_str("\n## Failed dimensions\n\n");
        for failure in &report.dimension_failures {
            let _ = writeln!(out, "- **{}** ({}): {}", failure.dimension, failure.kind, failure.message);
        }
    }

    out.push_str("\n## Findings\n\n");
    if report.findings.is_empty() {
        out.push_str("No findings.\n");
    }
    for finding in &report.findings {
        out.push_str(&format_finding_markdown(finding));
        out.push_str("\n---\n\n");
    }
    out
}

fn status_text(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Succeeded => "succeeded",
        RunStatus::Partial => "partial (some dimensions failed)",
        RunStatus::Failed => "failed",
    }
}

fn disagreement_row(d: &SeverityDisagreement) -> String {
    let ratings: Vec<String> = d.ratings.iter().map(|(s, r)| format!("{}: {}", s, r)).collect();
    let outcome = match (&d.resolved, &d.resolved_by) {
        (Some(severity), Some(by)) => format!("{} (by {})", severity, by),
        _ => format!(
            "needs review ({})",
            d.arbitration_error.as_deref().unwrap_or("unresolved")
        ),
    };
    format!(
        "| {} | {} | {} | {} |\n",
        cell(&location_text(&d.finding)),
        cell(&d.finding.description),
        ratings.join(", "),
        cell(&outcome)
    )
}

pub fn format_comparison(result: &ComparisonResult) -> String {
    let labels: Vec<&str> = result.sources.iter().map(|s| s.as_str()).collect();
    let mut out = String::from("# Cross-run comparison\n\n");
    let _ = writeln!(out, "- Sources: {}", labels.join(", "));
    let _ = writeln!(out, "- Overlapping findings: {}", result.overlapping.len());
    let _ = writeln!(out, "- Unique findings: {}", result.unique_count());
    let _ = writeln!(out, "- Agreement: {}", format_percent(result.agreement_ratio()));
    let _ = writeln!(out, "- Severity disagreements: {}\n", result.severity_disagreements.len());

    if !result.severity_disagreements.is_empty() {
        out.push_str("## Severity disagreements\n\n| Location | Finding | Ratings | Outcome |\n|---|---|---|---|\n");
        for d in &result.severity_disagreements {
            out.push_str(&disagreement_row(d));
        }
        out.push('\n');
    }

    out.push_str("## Overlapping\n\n");
    out.push_str(&format_severity_summary(&result.overlapping));
    out.push('\n');
    for finding in &result.overlapping {
        out.push_str(&format_finding_markdown(finding));
        out.push_str("\n---\n\n");
    }

    for (source, findings) in &result.unique_to {
        let _ = writeln!(out, "## Only {} ({})\n", source, findings.len());
        for finding in findings {
            out.push_str(&format_finding_markdown(finding));
            out.push_str("\n---\n\n");
        }
    }
    out
}
