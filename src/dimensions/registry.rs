use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::models::finding::{CategoryClass, Source, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DimensionName {
    Architecture,
    Defects,
    ErrorHandling,
    TypeDesign,
    TestCoverage,
    CommentAccuracy,
}

impl DimensionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Defects => "defects",
            Self::ErrorHandling => "error-handling",
            Self::TypeDesign => "type-design",
            Self::TestCoverage => "test-coverage",
            Self::CommentAccuracy => "comment-accuracy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        DIMENSIONS.iter().map(|d| d.name).find(|n| n.as_str() == raw.trim())
    }
}

impl std::fmt::Display for DimensionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Dimension {
    pub name: DimensionName,
    pub display_name: &'static str,
    pub instructions: &'static str,
    /// Class of finding this dimension specializes in.
    pub focus_class: CategoryClass,
    /// How wide the dimension casts its net; lower is narrower. Used to
    /// break severity ties between sources that are not specialists.
    pub breadth: u8,
}

impl Dimension {
    /// Full directive sent to an engine for this dimension.
    pub fn directive(&self) -> String {
        format!("Focus: {}\n\n{}\n\n{}", self.name, self.instructions, OUTPUT_FORMAT)
    }

    /// The dimension as a finding source within run `label`.
    pub fn source(&self, label: &SourceId) -> Source {
        Source {
            id: SourceId::new(format!("{}/{}", label, self.name)),
            focus: self.name.as_str().to_string(),
        }
    }
}

pub const OUTPUT_FORMAT: &str = "\
Report each finding as a block of labeled fields:
Location: <path>:<line>
Severity: critical | high | medium | low
Category: <short category>
Confidence: definite | likely | potential | stylistic
Description: <what is wrong and why it matters>
Separate findings with a line containing only ---.
If there is nothing to report, answer NO FINDINGS.";

pub static DIMENSIONS: LazyLock<Vec<Dimension>> = LazyLock::new(|| vec![
    Dimension {
        name: DimensionName::Architecture,
        display_name: "Architecture",
        instructions: "Review module boundaries, layering and coupling. Flag components that know too much about each other, misplaced responsibilities and abstractions that leak.",
        focus_class: CategoryClass::Architecture,
        breadth: 3,
    },
    Dimension {
        name: DimensionName::Defects,
        display_name: "Defects",
        instructions: "Look for logic bugs: off-by-one errors, wrong conditions, races, resource leaks, incorrect state handling and any code that does not do what it claims.",
        focus_class: CategoryClass::Defect,
        breadth: 2,
    },
    Dimension {
        name: DimensionName::ErrorHandling,
        display_name: "Error handling",
        instructions: "Find silent failures: swallowed errors, overly broad catches, fallbacks that hide problems, missing propagation and error messages that lose context.",
        focus_class: CategoryClass::ErrorHandling,
        breadth: 1,
    },
    Dimension {
        name: DimensionName::TypeDesign,
        display_name: "Type design",
        instructions: "Evaluate how well types express and enforce their invariants: encapsulation, illegal states that are representable, stringly typed data and missing validation at construction.",
        focus_class: CategoryClass::TypeDesign,
        breadth: 1,
    },
    Dimension {
        name: DimensionName::TestCoverage,
        display_name: "Test coverage",
        instructions: "Identify behavior that no test exercises: untested branches, missing edge cases and error paths, and tests that assert nothing meaningful.",
        focus_class: CategoryClass::TestCoverage,
        breadth: 1,
    },
    Dimension {
        name: DimensionName::CommentAccuracy,
        display_name: "Comment accuracy",
        instructions: "Check comments and documentation against the code. Flag stale, misleading or wrong comments and docs that describe behavior the code no longer has.",
        focus_class: CategoryClass::CommentAccuracy,
        breadth: 0,
    },
]);

pub fn get_dimension(name: DimensionName) -> Option<&'static Dimension> {
    DIMENSIONS.iter().find(|d| d.name == name)
}

/// Resolve a configured subset, keeping registry order. An empty subset
/// selects every dimension.
pub fn select(names: &[DimensionName]) -> Vec<&'static Dimension> {
    DIMENSIONS
        .iter()
        .filter(|d| names.is_empty() || names.contains(&d.name))
        .collect()
}

/// Resolve a dimension from its focus string.
pub fn by_focus(focus: &str) -> Option<&'static Dimension> {
    DimensionName::parse(focus).and_then(get_dimension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_six_dimensions() {
        assert_eq!(DIMENSIONS.len(), 6);
        let names: Vec<&str> = DIMENSIONS.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            ["architecture", "defects", "error-handling", "type-design", "test-coverage", "comment-accuracy"]
        );
    }

    #[test]
    fn test_focus_class_matches_name() {
        for d in DIMENSIONS.iter() {
            assert_eq!(CategoryClass::from_category(d.name.as_str()), d.focus_class, "{}", d.name);
        }
    }

    #[test]
    fn test_select_preserves_registry_order() {
        let picked = select(&[DimensionName::TestCoverage, DimensionName::Defects]);
        let names: Vec<_> = picked.iter().map(|d| d.name).collect();
        assert_eq!(names, vec![DimensionName::Defects, DimensionName::TestCoverage]);
        assert_eq!(select(&[]).len(), 6);
    }

    #[test]
    fn test_directive_carries_focus_and_format() {
        let d = get_dimension(DimensionName::ErrorHandling).unwrap();
        let directive = d.directive();
        assert!(directive.starts_with("Focus: error-handling\n"));
        assert!(directive.contains("Severity: critical | high | medium | low"));
    }

    #[test]
    fn test_parse_and_source_id() {
        assert_eq!(DimensionName::parse("type-design"), Some(DimensionName::TypeDesign));
        assert_eq!(DimensionName::parse("security"), None);
        let d = by_focus("defects").unwrap();
        assert_eq!(d.source(&SourceId::new("opus")).id.as_str(), "opus/defects");
    }
}
