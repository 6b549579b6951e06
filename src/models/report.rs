use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::{Finding, Severity, SourceId};
use crate::errors::{EngineError, EngineErrorKind};
use crate::pipeline::state::RunPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every dimension produced output.
    Succeeded,
    /// The run never completed.
    Failed,
    /// The run completed but at least one dimension failed.
    Partial,
}

/// A dimension worker failure, attached to the report that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFailure {
    pub dimension: String,
    pub kind: EngineErrorKind,
    pub message: String,
}

impl DimensionFailure {
    pub fn new(dimension: &str, error: &EngineError) -> Self {
        Self {
            dimension: dimension.to_string(),
            kind: error.kind,
            message: error.message.clone(),
        }
    }
}

/// The result of one full analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub source_label: SourceId,
    pub scope: String,
    pub findings: Vec<Finding>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Isolation context the run executed in.
    pub context_id: String,
    #[serde(default)]
    pub dimension_failures: Vec<DimensionFailure>,
}

impl RunReport {
    /// Returns a map of severity level to the count of findings at that severity.
    pub fn finding_counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn total_findings(&self) -> usize {
        self.findings.len()
    }

    pub fn duration_ms(&self) -> u64 {
        self.completed_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .unsigned_abs()
    }

    /// Whether the report can take part in a comparison.
    pub fn is_comparable(&self) -> bool {
        self.status != RunStatus::Failed
    }
}

/// A run that reached `Failed`, with its terminal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub label: SourceId,
    /// Phase the run was in when it failed.
    pub phase: RunPhase,
    pub error_type: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding::{Confidence, Location};
    use std::collections::BTreeSet;

    fn finding(severity: Severity) -> Finding {
        Finding {
            location: Some(Location::new("src/lib.rs", 10)),
            severity,
            category: "defects".to_string(),
            description: "off by one".to_string(),
            confidence: Confidence::Likely,
            contributing_sources: BTreeSet::new(),
            dimensions: BTreeSet::new(),
        }
    }

    #[test]
    fn test_finding_counts() {
        let now = Utc::now();
        let report = RunReport {
            run_id: "r1".into(),
            source_label: SourceId::new("opus"),
            scope: "src".into(),
            findings: vec![finding(Severity::High), finding(Severity::High), finding(Severity::Low)],
            started_at: now,
            completed_at: now,
            status: RunStatus::Succeeded,
            context_id: "ctx".into(),
            dimension_failures: Vec::new(),
        };
        let counts = report.finding_counts();
        assert_eq!(counts.get(&Severity::High), Some(&2));
        assert_eq!(counts.get(&Severity::Low), Some(&1));
        assert_eq!(report.total_findings(), 3);
        assert!(report.is_comparable());
    }

    #[test]
    fn test_dimension_failure_from_engine_error() {
        let failure = DimensionFailure::new("comment-accuracy", &EngineError::crash("exit 1"));
        assert_eq!(failure.kind, EngineErrorKind::Crash);
        assert_eq!(failure.message, "exit 1");
    }
}
