use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::finding::{Finding, Severity, SourceId};

/// A finding the compared sources rated differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityDisagreement {
    pub finding: Finding,
    /// Every source's original rating, preserved for audit.
    pub ratings: BTreeMap<SourceId, Severity>,
    pub resolved: Option<Severity>,
    pub resolved_by: Option<SourceId>,
    /// Set when arbitration failed and a human has to decide.
    pub needs_review: bool,
    pub arbitration_error: Option<String>,
}

impl SeverityDisagreement {
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Derived view over two or more run reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Sources whose reports took part, in canonical order.
    pub sources: Vec<SourceId>,
    pub overlapping: Vec<Finding>,
    pub unique_to: BTreeMap<SourceId, Vec<Finding>>,
    pub severity_disagreements: Vec<SeverityDisagreement>,
}

impl ComparisonResult {
    pub fn unique_count(&self) -> usize {
        self.unique_to.values().map(Vec::len).sum()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &SeverityDisagreement> {
        self.severity_disagreements.iter().filter(|d| d.needs_review)
    }

    /// Share of all distinct findings that more than one source reported.
    pub fn agreement_ratio(&self) -> f64 {
        let total = self.overlapping.len() + self.unique_count();
        if total == 0 {
            return 0.0;
        }
        self.overlapping.len() as f64 / total as f64
    }
}
