use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::engine::AnalysisEngine;
use crate::errors::ReviewError;
use crate::isolation::IsolationProvider;
use crate::models::finding::{Finding, Severity, SourceId};

static SEVERITY_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:[-*]\s+)?(?:\*\*)?\s*severity\s*(?:\*\*)?\s*:\s*(?:\*\*)?\s*([a-z0-9]+)").unwrap()
});

/// Designated authority that settles severity disagreements.
#[async_trait]
pub trait Arbitrator: Send + Sync {
    /// Pick one of `ratings`' severities for `finding`.
    async fn arbitrate(
        &self,
        finding: &Finding,
        ratings: &BTreeMap<SourceId, Severity>,
    ) -> Result<Severity, ReviewError>;

    /// Recorded as `resolved_by` on every decision.
    fn identity(&self) -> &SourceId;
}

/// Asks an analysis engine, inside its own isolation context, to choose.
pub struct EngineArbitrator {
    label: SourceId,
    engine: Arc<dyn AnalysisEngine>,
    provider: Arc<dyn IsolationProvider>,
    scope: String,
    timeout: Duration,
}

impl EngineArbitrator {
    pub fn new(
        label: SourceId,
        engine: Arc<dyn AnalysisEngine>,
        provider: Arc<dyn IsolationProvider>,
        scope: &str,
        timeout: Duration,
    ) -> Self {
        Self { label, engine, provider, scope: scope.to_string(), timeout }
    }
}

/// Directive asking for a single verdict among the disputed ratings.
pub fn arbitration_directive(finding: &Finding, ratings: &BTreeMap<SourceId, Severity>) -> String {
    let location = finding
        .location
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "(no location)".to_string());
    let mut text = format!(
        "Severity arbitration.\n\nIndependent reviewers disagree on the severity of this finding.\n\nLocation: {}\nCategory: {}\nDescription: {}\n\nRatings:\n",
        location, finding.category, finding.description
    );
    for (source, severity) in ratings {
        text.push_str(&format!("- {}: {}\n", source, severity));
    }
    let options: Vec<&str> = distinct(ratings).iter().map(|s| s.as_str()).collect();
    text.push_str(&format!(
        "\nInspect the code and decide which rating is right. Answer with exactly one line:\nSeverity: <{}>\n",
        options.join(" | ")
    ));
    text
}

/// Disputed ratings, most severe first.
pub fn distinct(ratings: &BTreeMap<SourceId, Severity>) -> Vec<Severity> {
    let mut out: Vec<Severity> = Vec::new();
    for severity in ratings.values() {
        if !out.contains(severity) {
            out.push(*severity);
        }
    }
    out.sort_by_key(|s| s.rank());
    out
}

/// Read a `Severity:` verdict, falling back to a bare severity word.
pub fn parse_verdict(answer: &str) -> Option<Severity> {
    SEVERITY_ANSWER_RE
        .captures_iter(answer)
        .filter_map(|c| Severity::parse(&c[1]))
        .last()
        .or_else(|| Severity::parse(answer.trim()).filter(|_| answer.trim().split_whitespace().count() == 1))
}

#[async_trait]
impl Arbitrator for EngineArbitrator {
    async fn arbitrate(
        &self,
        finding: &Finding,
        ratings: &BTreeMap<SourceId, Severity>,
    ) -> Result<Severity, ReviewError> {
        let directive = arbitration_directive(finding, ratings);
        let arbiter_label = SourceId::new(format!("{}-arbiter", self.label));
        let context = self
            .provider
            .acquire(&arbiter_label)
            .await
            .map_err(|e| ReviewError::Arbitration(format!("No context for arbitrator: {}", e)))?;

        let answer = tokio::time::timeout(self.timeout, self.engine.invoke(&context, &self.scope, &directive)).await;
        self.provider.release(&context).await;

        let answer = match answer {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(ReviewError::Arbitration(e.to_string())),
            Err(_) => {
                return Err(ReviewError::Arbitration(format!(
                    "arbitrator gave no answer within {}s",
                    self.timeout.as_secs()
                )))
            }
        };
        debug!(arbitrator = %self.label, answer_len = answer.len(), "Arbitrator answered");

        let choice = parse_verdict(&answer)
            .ok_or_else(|| ReviewError::Arbitration("answer contains no severity verdict".into()))?;
        if !ratings.values().any(|s| *s == choice) {
            return Err(ReviewError::Arbitration(format!(
                "verdict '{}' is not one of the disputed ratings",
                choice
            )));
        }
        Ok(choice)
    }

    fn identity(&self) -> &SourceId {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;
    use crate::isolation::ScratchProvider;
    use crate::models::finding::{Confidence, Location};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn finding() -> Finding {
        Finding {
            location: Some(Location::new("src/io.rs", 88)),
            severity: Severity::Medium,
            category: "error handling".into(),
            description: "error swallowed".into(),
            confidence: Confidence::Likely,
            contributing_sources: BTreeSet::new(),
            dimensions: BTreeSet::new(),
        }
    }

    fn ratings() -> BTreeMap<SourceId, Severity> {
        BTreeMap::from([(SourceId::new("x"), Severity::Medium), (SourceId::new("y"), Severity::High)])
    }

    fn arbitrator(dir: &TempDir, engine: StubEngine) -> EngineArbitrator {
        EngineArbitrator::new(
            SourceId::new("z"),
            Arc::new(engine),
            Arc::new(ScratchProvider::new(dir.path())),
            "src",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_directive_lists_ratings_and_options() {
        let text = arbitration_directive(&finding(), &ratings());
        assert!(text.contains("Location: src/io.rs:88"));
        assert!(text.contains("- x: medium\n- y: high\n"));
        assert!(text.contains("Severity: <high | medium>"));
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("Reasoning...\n**Severity:** High"), Some(Severity::High));
        assert_eq!(parse_verdict("medium"), Some(Severity::Medium));
        assert_eq!(parse_verdict("I think it is medium or high"), None);
    }

    #[tokio::test]
    async fn test_engine_verdict_among_ratings() {
        let dir = TempDir::new().unwrap();
        let arb = arbitrator(&dir, StubEngine::new("z").respond("Severity arbitration", "Severity: high"));
        assert_eq!(arb.arbitrate(&finding(), &ratings()).await.unwrap(), Severity::High);
        assert_eq!(arb.identity().as_str(), "z");
    }

    #[tokio::test]
    async fn test_verdict_outside_ratings_is_rejected() {
        let dir = TempDir::new().unwrap();
        let arb = arbitrator(&dir, StubEngine::new("z").respond("Severity arbitration", "Severity: critical"));
        let err = arb.arbitrate(&finding(), &ratings()).await.unwrap_err();
        assert!(matches!(err, ReviewError::Arbitration(_)));
    }

    #[tokio::test]
    async fn test_engine_failure_is_arbitration_error() {
        let dir = TempDir::new().unwrap();
        let arb = arbitrator(
            &dir,
            StubEngine::new("z").fail("Severity arbitration", crate::errors::EngineError::crash("down")),
        );
        let err = arb.arbitrate(&finding(), &ratings()).await.unwrap_err();
        assert!(err.to_string().contains("down"));
    }
}
