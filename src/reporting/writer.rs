use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use super::formatter::{format_comparison, format_run_report};
use crate::audit::utils::atomic_write;
use crate::errors::ReviewError;
use crate::isolation::context::sanitize_label;
use crate::models::comparison::ComparisonResult;
use crate::models::report::RunReport;
use crate::pipeline::review::ReviewOutcome;

/// Lays out a session's deliverables:
///
/// ```text
/// <output>/<session_id>/
///   session.json
///   runs/<label>.json
///   runs/<label>.md
///   ...
///   comparison.json
///   comparison.md
/// ```
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.output_dir.join(session_id)
    }

    /// Returns the session directory.
    pub async fn write_session(&self, outcome: &ReviewOutcome) -> Result<PathBuf, ReviewError> {
        let dir = self.session_dir(&outcome.session_id);
        let runs_dir = dir.join("runs");
        tokio::fs::create_dir_all(&runs_dir).await?;

        let reports = outcome.runs.reports();
        for (report, stem) in reports.iter().zip(report_stems(&reports)) {
            write_run_report(&runs_dir, &stem, report).await?;
        }
        atomic_write(&dir.join("session.json"), &serde_json::to_string_pretty(outcome)?).await?;
        write_comparison(&dir, &outcome.comparison).await?;

        info!(dir = %dir.display(), runs = outcome.runs.len(), "Reports written");
        Ok(dir)
    }
}

/// File stems for a set of run reports. Labels that sanitize to the same
/// stem get the first eight characters of their run id appended, so no
/// report overwrites another.
pub fn report_stems(reports: &[&RunReport]) -> Vec<String> {
    let base: Vec<String> = reports.iter().map(|r| sanitize_label(r.source_label.as_str())).collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for stem in &base {
        *counts.entry(stem.as_str()).or_default() += 1;
    }

    let mut taken: HashMap<String, usize> = HashMap::new();
    let mut stems = Vec::with_capacity(base.len());
    for (report, stem) in reports.iter().zip(&base) {
        let mut candidate = if counts[stem.as_str()] > 1 {
            let run: String = sanitize_label(&report.run_id).chars().take(8).collect();
            format!("{}-{}", stem, run)
        } else {
            stem.clone()
        };
        let seen = taken.entry(candidate.clone()).or_default();
        *seen += 1;
        if *seen > 1 {
            candidate = format!("{}-{}", candidate, seen);
        }
        stems.push(candidate);
    }
    stems
}

pub async fn write_run_report(dir: &Path, stem: &str, report: &RunReport) -> Result<(), ReviewError> {
    atomic_write(&dir.join(format!("{}.json", stem)), &serde_json::to_string_pretty(report)?).await?;
    atomic_write(&dir.join(format!("{}.md", stem)), &format_run_report(report)).await?;
    Ok(())
}

pub async fn write_comparison(dir: &Path, result: &ComparisonResult) -> Result<(), ReviewError> {
    tokio::fs::create_dir_all(dir).await?;
    atomic_write(&dir.join("comparison.json"), &serde_json::to_string_pretty(result)?).await?;
    atomic_write(&dir.join("comparison.md"), &format_comparison(result)).await?;
    Ok(())
}

/// Load a run report previously written as JSON.
pub async fn read_run_report(path: &Path) -> Result<RunReport, ReviewError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        ReviewError::Config(format!("Cannot read report {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&content)?)
}
