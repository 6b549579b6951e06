use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::{emit, EventSender, RunEvent};
use super::state::{RunLimits, RunPhase, RunTracker};
use crate::dimensions::{Dimension, DimensionRunner};
use crate::engine::AnalysisEngine;
use crate::errors::{RetryConfig, ReviewError};
use crate::isolation::{IsolationContext, IsolationProvider};
use crate::merge::deduplicate;
use crate::models::finding::SourceId;
use crate::models::report::{DimensionFailure, RunFailure, RunReport, RunStatus};
use crate::normalize::normalize;

/// How a single run ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunReport),
    Failed(RunFailure),
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Context releases running in the background.
///
/// A run hands its context here as soon as its engine work is done, so
/// report delivery never waits on teardown. [`Teardown::wait`] lets the
/// process finish cleanup before it exits.
#[derive(Clone, Default)]
pub struct Teardown {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Teardown {
    pub(crate) async fn release(&self, provider: Arc<dyn IsolationProvider>, context: IsolationContext) {
        let handle = tokio::spawn(async move {
            provider.release(&context).await;
            debug!(context_id = %context.context_id, label = %context.label, "Context released");
        });
        self.pending.lock().await.push(handle);
    }

    /// Wait for every release handed over so far.
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.pending.lock().await);
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Context release task panicked");
            }
        }
    }
}

/// Read-only inputs shared by every run of a session.
pub(crate) struct RunSpec {
    pub provider: Arc<dyn IsolationProvider>,
    pub dimensions: Vec<&'static Dimension>,
    pub scope: String,
    pub limits: RunLimits,
    pub event_tx: Option<EventSender>,
    pub teardown: Teardown,
}

/// Drive one run to `Completed` or `Failed`. Never returns an error: every
/// failure becomes a [`RunFailure`] attached to the label.
pub(crate) async fn execute_run(
    label: SourceId,
    engine: Option<Arc<dyn AnalysisEngine>>,
    spec: Arc<RunSpec>,
) -> RunOutcome {
    let mut tracker = RunTracker::new(label.clone());
    emit(&spec.event_tx, RunEvent::RunStarted { label: label.clone(), dimensions: spec.dimensions.len() });

    match drive(&mut tracker, engine, &spec).await {
        Ok(report) => {
            info!(
                label = %label,
                status = ?report.status,
                findings = report.total_findings(),
                duration_ms = report.duration_ms(),
                "Run completed"
            );
            emit(&spec.event_tx, RunEvent::RunCompleted {
                label,
                findings: report.total_findings(),
                duration_ms: report.duration_ms(),
            });
            RunOutcome::Completed(report)
        }
        Err(e) => {
            let phase = tracker.fail(&e).unwrap_or(tracker.phase);
            let classification = e.classify();
            warn!(label = %label, phase = %phase, error_type = classification.error_type, error = %e, "Run failed");
            emit(&spec.event_tx, RunEvent::RunFailed { label: label.clone(), phase, error: e.to_string() });
            RunOutcome::Failed(RunFailure {
                label,
                phase,
                error_type: classification.error_type.to_string(),
                message: e.to_string(),
            })
        }
    }
}

fn advance(tracker: &mut RunTracker, next: RunPhase, tx: &Option<EventSender>) -> Result<(), ReviewError> {
    tracker.advance(next)?;
    emit(tx, RunEvent::PhaseChanged { label: tracker.label.clone(), phase: next });
    Ok(())
}

async fn drive(
    tracker: &mut RunTracker,
    engine: Option<Arc<dyn AnalysisEngine>>,
    spec: &RunSpec,
) -> Result<RunReport, ReviewError> {
    let label = tracker.label.clone();
    let engine = engine
        .ok_or_else(|| ReviewError::Config(format!("No engine configured for source '{}'", label)))?;
    let started_at = Utc::now();

    advance(tracker, RunPhase::Provisioning, &spec.event_tx)?;
    let context = spec.provider.acquire(&label).await?;

    let runner = DimensionRunner::new(engine, spec.dimensions.clone(), spec.limits.engine_timeout)
        .with_retry(RetryConfig { max_retries: spec.limits.max_retries })
        .with_event_channel(spec.event_tx.clone());

    let context_id = context.context_id.clone();
    let outcomes = match advance(tracker, RunPhase::Running, &spec.event_tx) {
        Ok(()) => runner.run(&context, &spec.scope).await,
        Err(e) => {
            spec.teardown.release(spec.provider.clone(), context).await;
            return Err(e);
        }
    };
    spec.teardown.release(spec.provider.clone(), context).await;

    advance(tracker, RunPhase::Normalizing, &spec.event_tx)?;
    let mut findings = Vec::new();
    let mut dimension_failures = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(raw) => findings.extend(normalize(raw, &outcome.dimension.source(&label))),
            Err(e) => dimension_failures.push(DimensionFailure::new(outcome.dimension.name.as_str(), e)),
        }
    }

    advance(tracker, RunPhase::Merging, &spec.event_tx)?;
    let raw_count = findings.len();
    let findings = deduplicate(findings, &spec.dimensions, spec.limits.position_tolerance);
    tracing::debug!(label = %label, raw = raw_count, merged = findings.len(), "Deduplicated run findings");

    advance(tracker, RunPhase::Completed, &spec.event_tx)?;
    let status = if dimension_failures.is_empty() { RunStatus::Succeeded } else { RunStatus::Partial };

    Ok(RunReport {
        run_id: uuid::Uuid::new_v4().to_string(),
        source_label: label,
        scope: spec.scope.clone(),
        findings,
        started_at,
        completed_at: Utc::now(),
        status,
        context_id,
        dimension_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::registry::select;
    use crate::engine::StubEngine;
    use crate::errors::EngineError;
    use crate::isolation::ScratchProvider;
    use tempfile::TempDir;

    fn spec(dir: &TempDir) -> Arc<RunSpec> {
        Arc::new(RunSpec {
            provider: Arc::new(ScratchProvider::new(dir.path())),
            dimensions: select(&[]),
            scope: "src".into(),
            limits: RunLimits { max_retries: 0, ..RunLimits::default() },
            event_tx: None,
            teardown: Teardown::default(),
        })
    }

    #[tokio::test]
    async fn test_run_completes_and_releases_context() {
        let dir = TempDir::new().unwrap();
        let spec = spec(&dir);
        let engine: Arc<dyn AnalysisEngine> = Arc::new(
            StubEngine::new("opus")
                .respond("Focus: defects", "Location: src/a.rs:3\nSeverity: high\nDescription: bad bound"),
        );

        let outcome = execute_run(SourceId::new("opus"), Some(engine), spec.clone()).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].category, "defects");
        spec.teardown.wait().await;
        assert_eq!(spec.provider.active_count(), 0);
    }

    #[tokio::test]
    async fn test_crashed_dimension_yields_partial() {
        let dir = TempDir::new().unwrap();
        let engine: Arc<dyn AnalysisEngine> = Arc::new(
            StubEngine::new("opus")
                .fail("Focus: comment-accuracy", EngineError::crash("segfault"))
                .otherwise(crate::engine::StubResponse::Text("Location: a.rs:1\nSeverity: low\nDescription: x".into())),
        );

        let outcome = execute_run(SourceId::new("opus"), Some(engine), spec(&dir)).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.dimension_failures.len(), 1);
        assert_eq!(report.dimension_failures[0].dimension, "comment-accuracy");
        let dims: std::collections::BTreeSet<_> = report.findings.iter().flat_map(|f| f.dimensions.iter().cloned()).collect();
        assert_eq!(dims.len(), 5);
        assert!(!dims.contains("comment-accuracy"));
    }

    #[tokio::test]
    async fn test_missing_engine_fails_in_pending() {
        let dir = TempDir::new().unwrap();
        let outcome = execute_run(SourceId::new("ghost"), None, spec(&dir)).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.phase, RunPhase::Pending);
        assert_eq!(failure.error_type, "ConfigError");
    }

    #[tokio::test]
    async fn test_provisioning_failure_recorded_with_phase() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let spec = Arc::new(RunSpec {
            provider: Arc::new(ScratchProvider::new(&blocker)),
            dimensions: select(&[]),
            scope: "src".into(),
            limits: RunLimits::default(),
            event_tx: None,
            teardown: Teardown::default(),
        });

        let outcome = execute_run(SourceId::new("opus"), Some(Arc::new(StubEngine::new("opus")) as Arc<dyn AnalysisEngine>), spec).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.phase, RunPhase::Provisioning);
        assert_eq!(failure.error_type, "ProvisioningError");
    }

    struct SlowRelease(ScratchProvider);

    #[async_trait::async_trait]
    impl IsolationProvider for SlowRelease {
        async fn acquire(&self, label: &SourceId) -> Result<IsolationContext, ReviewError> {
            self.0.acquire(label).await
        }

        async fn release(&self, context: &IsolationContext) {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            self.0.release(context).await;
        }

        fn active_count(&self) -> usize {
            self.0.active_count()
        }

        fn provider_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_report_does_not_wait_for_release() {
        let dir = TempDir::new().unwrap();
        let spec = Arc::new(RunSpec {
            provider: Arc::new(SlowRelease(ScratchProvider::new(dir.path()))),
            dimensions: select(&[]),
            scope: "src".into(),
            limits: RunLimits { max_retries: 0, ..RunLimits::default() },
            event_tx: None,
            teardown: Teardown::default(),
        });

        let started = std::time::Instant::now();
        let outcome = execute_run(SourceId::new("opus"), Some(Arc::new(StubEngine::new("opus")) as Arc<dyn AnalysisEngine>), spec.clone()).await;
        assert!(outcome.report().is_some());
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(spec.provider.active_count(), 1);

        spec.teardown.wait().await;
        assert_eq!(spec.provider.active_count(), 0);
    }
}
