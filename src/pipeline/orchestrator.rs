use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use super::events::EventSender;
use super::run::{execute_run, RunOutcome, RunSpec, Teardown};
use super::state::{RunLimits, RunPhase};
use crate::dimensions::Dimension;
use crate::engine::AnalysisEngine;
use crate::errors::ReviewError;
use crate::isolation::IsolationProvider;
use crate::models::finding::SourceId;
use crate::models::report::{RunFailure, RunReport};

/// Engines addressable by run label.
pub type EngineCatalog = BTreeMap<SourceId, Arc<dyn AnalysisEngine>>;

/// Every launched label mapped to its outcome, in launch order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSet {
    entries: Vec<(SourceId, RunOutcome)>,
}

impl RunSet {
    pub fn get(&self, label: &SourceId) -> Option<&RunOutcome> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, o)| o)
    }

    pub fn labels(&self) -> impl Iterator<Item = &SourceId> {
        self.entries.iter().map(|(l, _)| l)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SourceId, RunOutcome)> {
        self.entries.iter()
    }

    pub fn reports(&self) -> Vec<&RunReport> {
        self.entries.iter().filter_map(|(_, o)| o.report()).collect()
    }

    pub fn failures(&self) -> Vec<&RunFailure> {
        self.entries.iter().filter_map(|(_, o)| o.failure()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_failed(&self) -> bool {
        !self.entries.is_empty() && self.reports().is_empty()
    }
}

impl FromIterator<(SourceId, RunOutcome)> for RunSet {
    fn from_iter<T: IntoIterator<Item = (SourceId, RunOutcome)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// Launches independent runs of the same scope concurrently.
pub struct RunOrchestrator {
    engines: EngineCatalog,
    provider: Arc<dyn IsolationProvider>,
    dimensions: Vec<&'static Dimension>,
    scope: String,
    limits: RunLimits,
    event_tx: Option<EventSender>,
    teardown: Teardown,
}

impl RunOrchestrator {
    pub fn new(
        engines: EngineCatalog,
        provider: Arc<dyn IsolationProvider>,
        dimensions: Vec<&'static Dimension>,
        scope: &str,
    ) -> Self {
        Self {
            engines,
            provider,
            dimensions,
            scope: scope.to_string(),
            limits: RunLimits::default(),
            event_tx: None,
            teardown: Teardown::default(),
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_event_channel(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Share a teardown tracker, so a caller can wait for context cleanup
    /// after the reports are delivered.
    pub fn with_teardown(mut self, teardown: Teardown) -> Self {
        self.teardown = teardown;
        self
    }

    /// Run every label to completion or failure. Errors only for an invalid
    /// label list; a failing run never affects its siblings.
    pub async fn launch_runs(&self, labels: &[SourceId]) -> Result<RunSet, ReviewError> {
        if labels.is_empty() {
            return Err(ReviewError::Config("At least one source label is required".into()));
        }
        let mut seen = HashSet::new();
        for label in labels {
            if !seen.insert(label) {
                return Err(ReviewError::Config(format!("Duplicate source label '{}'", label)));
            }
        }

        let spec = Arc::new(RunSpec {
            provider: self.provider.clone(),
            dimensions: self.dimensions.clone(),
            scope: self.scope.clone(),
            limits: self.limits.clone(),
            event_tx: self.event_tx.clone(),
            teardown: self.teardown.clone(),
        });

        info!(
            runs = labels.len(),
            dimensions = self.dimensions.len(),
            scope = %self.scope,
            provider = self.provider.provider_name(),
            "Launching runs"
        );

        let handles: Vec<_> = labels
            .iter()
            .map(|label| {
                let label = label.clone();
                let engine = self.engines.get(&label).cloned();
                let spec = spec.clone();
                tokio::spawn(async move { execute_run(label, engine, spec).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        let runs: RunSet = labels
            .iter()
            .zip(results)
            .map(|(label, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    error!(label = %label, error = %e, "Run task panicked");
                    RunOutcome::Failed(RunFailure {
                        label: label.clone(),
                        phase: RunPhase::Running,
                        error_type: "InternalError".into(),
                        message: format!("run task panicked: {}", e),
                    })
                });
                (label.clone(), outcome)
            })
            .collect();

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::registry::{select, DimensionName};
    use crate::engine::StubEngine;
    use crate::isolation::ScratchProvider;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir) -> RunOrchestrator {
        let mut engines = EngineCatalog::new();
        engines.insert(SourceId::new("b"), Arc::new(StubEngine::new("b")));
        engines.insert(SourceId::new("a"), Arc::new(StubEngine::new("a")));
        RunOrchestrator::new(
            engines,
            Arc::new(ScratchProvider::new(dir.path())),
            select(&[DimensionName::Defects]),
            "src",
        )
    }

    #[tokio::test]
    async fn test_rejects_empty_and_duplicate_labels() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        assert!(matches!(orch.launch_runs(&[]).await, Err(ReviewError::Config(_))));
        let dup = [SourceId::new("a"), SourceId::new("a")];
        assert!(matches!(orch.launch_runs(&dup).await, Err(ReviewError::Config(_))));
    }

    #[tokio::test]
    async fn test_preserves_label_order_and_fails_unknown_label() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let labels = [SourceId::new("b"), SourceId::new("zz"), SourceId::new("a")];

        let set = orch.launch_runs(&labels).await.unwrap();
        let order: Vec<&str> = set.labels().map(|l| l.as_str()).collect();
        assert_eq!(order, vec!["b", "zz", "a"]);
        assert_eq!(set.reports().len(), 2);
        let failure = set.get(&SourceId::new("zz")).unwrap().failure().unwrap();
        assert_eq!(failure.error_type, "ConfigError");
        assert!(!set.all_failed());
    }
}
