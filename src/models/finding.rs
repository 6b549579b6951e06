use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Severity level for a finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    /// Critical = 0, High = 1, Medium = 2, Low = 3.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Parse a free-form severity word. Accepts the four levels plus a few
    /// common synonyms used by review tooling.
    pub fn parse(raw: &str) -> Option<Self> {
        let word = raw
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .split(|c: char| !c.is_alphanumeric())
            .next()?
            .to_lowercase();
        match word.as_str() {
            "critical" | "blocker" | "p0" => Some(Severity::Critical),
            "high" | "major" | "important" | "p1" => Some(Severity::High),
            "medium" | "moderate" | "p2" => Some(Severity::Medium),
            "low" | "minor" | "trivial" | "nit" | "p3" => Some(Severity::Low),
            _ => None,
        }
    }

    /// The more severe of two ratings.
    pub fn max(self, other: Severity) -> Severity {
        if other.rank() < self.rank() { other } else { self }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How sure the producing source is that the finding is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Definite,
    Likely,
    Potential,
    Stylistic,
}

impl Confidence {
    /// Definite = 0 … Stylistic = 3.
    pub fn rank(&self) -> u8 {
        match self {
            Confidence::Definite => 0,
            Confidence::Likely => 1,
            Confidence::Potential => 2,
            Confidence::Stylistic => 3,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let word = raw
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .split(|c: char| !c.is_alphanumeric())
            .next()?
            .to_lowercase();
        match word.as_str() {
            "definite" | "certain" | "confirmed" | "high" => Some(Confidence::Definite),
            "likely" | "probable" | "medium" => Some(Confidence::Likely),
            "potential" | "possible" | "low" | "speculative" => Some(Confidence::Potential),
            "stylistic" | "style" | "nit" | "cosmetic" => Some(Confidence::Stylistic),
            _ => None,
        }
    }

    pub fn max(self, other: Confidence) -> Confidence {
        if other.rank() < self.rank() { other } else { self }
    }

    /// The weaker of two confidences.
    pub fn min(self, other: Confidence) -> Confidence {
        if other.rank() > self.rank() { other } else { self }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Definite => "definite",
            Confidence::Likely => "likely",
            Confidence::Potential => "potential",
            Confidence::Stylistic => "stylistic",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a finding producer: a dimension worker or a full run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A source together with what it was asked to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub focus: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// File or other addressable unit.
    pub unit: String,
    /// Line (or equivalent) inside the unit.
    pub position: u32,
}

impl Location {
    pub fn new(unit: impl Into<String>, position: u32) -> Self {
        Self { unit: unit.into(), position }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.unit, self.position)
    }
}

/// Normalized defect class. Two findings only merge when their classes agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryClass {
    Architecture,
    Defect,
    ErrorHandling,
    TypeDesign,
    TestCoverage,
    CommentAccuracy,
    Other(String),
}

impl CategoryClass {
    pub fn from_category(category: &str) -> Self {
        let normalized = category
            .to_lowercase()
            .replace(|c: char| !c.is_alphanumeric(), " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let has = |needles: &[&str]| needles.iter().any(|n| normalized.contains(n));

        if has(&["coverage", "missing test", "untested", "test gap", "tests"]) {
            CategoryClass::TestCoverage
        } else if has(&["comment", "doc", "stale"]) {
            CategoryClass::CommentAccuracy
        } else if has(&["error handling", "error", "silent failure", "exception", "panic"]) {
            CategoryClass::ErrorHandling
        } else if has(&["type", "invariant", "encapsulation"]) {
            CategoryClass::TypeDesign
        } else if has(&["architecture", "design", "coupling", "layering", "structure"]) {
            CategoryClass::Architecture
        } else if has(&["bug", "defect", "logic", "correctness", "race", "leak", "crash"]) {
            CategoryClass::Defect
        } else {
            CategoryClass::Other(normalized)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CategoryClass::Architecture => "architecture",
            CategoryClass::Defect => "defect",
            CategoryClass::ErrorHandling => "error-handling",
            CategoryClass::TypeDesign => "type-design",
            CategoryClass::TestCoverage => "test-coverage",
            CategoryClass::CommentAccuracy => "comment-accuracy",
            CategoryClass::Other(s) => s,
        }
    }
}

/// A single normalized, located, severity-rated observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// `None` when the producer gave no parseable location.
    pub location: Option<Location>,
    pub severity: Severity,
    pub category: String,
    pub description: String,
    pub confidence: Confidence,
    pub contributing_sources: BTreeSet<SourceId>,
    /// Dimension focuses that observed this issue.
    #[serde(default)]
    pub dimensions: BTreeSet<String>,
}

impl Finding {
    pub fn class(&self) -> CategoryClass {
        CategoryClass::from_category(&self.category)
    }

    pub fn is_located(&self) -> bool {
        self.location.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_ordering() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::High.rank() < Severity::Medium.rank());
        assert!(Severity::Medium.rank() < Severity::Low.rank());
    }

    #[test]
    fn test_severity_parse_tolerates_markup() {
        assert_eq!(Severity::parse("**HIGH**"), Some(Severity::High));
        assert_eq!(Severity::parse(" critical (security)"), Some(Severity::Critical));
        assert_eq!(Severity::parse("minor"), Some(Severity::Low));
        assert_eq!(Severity::parse("unknown"), None);
        assert_eq!(Severity::parse(""), None);
    }

    #[test]
    fn test_severity_max() {
        assert_eq!(Severity::Medium.max(Severity::High), Severity::High);
        assert_eq!(Severity::Critical.max(Severity::Low), Severity::Critical);
    }

    #[test]
    fn test_confidence_min_max() {
        assert_eq!(Confidence::Likely.max(Confidence::Definite), Confidence::Definite);
        assert_eq!(Confidence::Likely.min(Confidence::Potential), Confidence::Potential);
        assert_eq!(Confidence::Stylistic.min(Confidence::Potential), Confidence::Stylistic);
    }

    #[test]
    fn test_category_class_synonyms() {
        assert_eq!(CategoryClass::from_category("coverage"), CategoryClass::TestCoverage);
        assert_eq!(CategoryClass::from_category("Missing test"), CategoryClass::TestCoverage);
        assert_eq!(CategoryClass::from_category("stale comment"), CategoryClass::CommentAccuracy);
        assert_eq!(CategoryClass::from_category("Error-Handling"), CategoryClass::ErrorHandling);
        assert_eq!(CategoryClass::from_category("logic bug"), CategoryClass::Defect);
        assert_eq!(CategoryClass::from_category("type design"), CategoryClass::TypeDesign);
        assert_eq!(
            CategoryClass::from_category("Performance!"),
            CategoryClass::Other("performance".to_string())
        );
    }

    #[test]
    fn test_source_id_serializes_transparently() {
        let id = SourceId::new("opus");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"opus\"");
    }

    #[test]
    fn test_severity_serialization_roundtrip() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let parsed: Severity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Severity::Critical);
    }
}
