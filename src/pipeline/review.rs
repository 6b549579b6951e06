use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::events::EventSender;
use super::orchestrator::{EngineCatalog, RunOrchestrator, RunSet};
use super::run::{RunOutcome, Teardown};
use super::state::RunLimits;
use crate::audit::{AuditEvent, AuditLog};
use crate::compare::{Arbitrator, Comparator, EngineArbitrator};
use crate::config::{validate_conflicts, ReviewConfig};
use crate::dimensions::registry::select;
use crate::dimensions::Dimension;
use crate::engine::create_engine;
use crate::errors::ReviewError;
use crate::isolation::{create_provider, IsolationProvider};
use crate::models::comparison::ComparisonResult;
use crate::models::finding::SourceId;

/// Everything one review session produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub session_id: String,
    pub scope: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub runs: RunSet,
    pub comparison: ComparisonResult,
}

/// One invocation of the pipeline: N independent runs of the same scope,
/// then a comparison of whatever completed.
pub struct ReviewSession {
    session_id: String,
    scope: String,
    labels: Vec<SourceId>,
    engines: EngineCatalog,
    provider: Arc<dyn IsolationProvider>,
    dimensions: Vec<&'static Dimension>,
    limits: RunLimits,
    arbitrator: Option<SourceId>,
    event_tx: Option<EventSender>,
    audit: Option<Arc<AuditLog>>,
    teardown: Teardown,
}

impl ReviewSession {
    pub fn new(
        labels: Vec<SourceId>,
        engines: EngineCatalog,
        provider: Arc<dyn IsolationProvider>,
        dimensions: Vec<&'static Dimension>,
        scope: &str,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            labels,
            engines,
            provider,
            dimensions,
            limits: RunLimits::default(),
            arbitrator: None,
            event_tx: None,
            audit: None,
            teardown: Teardown::default(),
        }
    }

    /// Build a session from a validated configuration.
    pub fn from_config(config: &ReviewConfig) -> Result<Self, ReviewError> {
        validate_conflicts(config)?;
        let limits = config.run_limits();

        let mut wanted: BTreeSet<&str> = config.sources.iter().map(String::as_str).collect();
        if let Some(arbitrator) = &config.arbitrator {
            wanted.insert(arbitrator.as_str());
        }
        let mut engines = EngineCatalog::new();
        for id in wanted {
            let engine_config = config
                .engine(id)
                .ok_or_else(|| ReviewError::Config(format!("No engine configured for '{}'", id)))?;
            engines.insert(SourceId::new(id), create_engine(engine_config, limits.engine_timeout)?);
        }

        let session = Self::new(
            config.source_labels(),
            engines,
            create_provider(&config.isolation()),
            select(&config.dimension_names()?),
            config.scope(),
        )
        .with_limits(limits)
        .with_arbitrator(config.arbitrator.as_deref().map(SourceId::new));
        Ok(session)
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_arbitrator(mut self, label: Option<SourceId>) -> Self {
        self.arbitrator = label;
        self
    }

    pub fn with_event_channel(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn labels(&self) -> &[SourceId] {
        &self.labels
    }

    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    /// Context releases started by this session's runs.
    pub fn teardown(&self) -> Teardown {
        self.teardown.clone()
    }

    fn arbitrator(&self) -> Result<Option<Arc<dyn Arbitrator>>, ReviewError> {
        let Some(label) = &self.arbitrator else { return Ok(None) };
        let engine = self
            .engines
            .get(label)
            .cloned()
            .ok_or_else(|| ReviewError::Config(format!("No engine configured for arbitrator '{}'", label)))?;
        let arbitrator: Arc<dyn Arbitrator> = Arc::new(EngineArbitrator::new(
            label.clone(),
            engine,
            self.provider.clone(),
            &self.scope,
            self.limits.engine_timeout,
        ));
        Ok(Some(arbitrator))
    }

    async fn audit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&event).await {
                warn!(error = %e, "Failed to write audit event");
            }
        }
    }

    /// Errors with [`ReviewError::AllRunsFailed`] when no run completed.
    pub async fn execute(&self) -> Result<ReviewOutcome, ReviewError> {
        let started_at = Utc::now();
        let arbitrator = self.arbitrator()?;
        info!(
            session_id = %self.session_id,
            scope = %self.scope,
            sources = self.labels.len(),
            arbitrator = ?self.arbitrator.as_ref().map(|a| a.as_str()),
            "Review session started"
        );
        self.audit(AuditEvent::SessionStarted {
            session_id: self.session_id.clone(),
            scope: self.scope.clone(),
            sources: self.labels.clone(),
        })
        .await;

        let mut orchestrator = RunOrchestrator::new(
            self.engines.clone(),
            self.provider.clone(),
            self.dimensions.clone(),
            &self.scope,
        )
        .with_limits(self.limits.clone())
        .with_teardown(self.teardown.clone());
        if let Some(tx) = &self.event_tx {
            orchestrator = orchestrator.with_event_channel(tx.clone());
        }
        let runs = orchestrator.launch_runs(&self.labels).await?;
        self.audit_runs(&runs).await;

        if runs.all_failed() {
            self.audit(AuditEvent::SessionCompleted {
                completed_runs: 0,
                failed_runs: runs.len(),
                overlapping: 0,
                disagreements: 0,
            })
            .await;
            let failures = runs.failures().into_iter().cloned().collect();
            return Err(ReviewError::AllRunsFailed(failures));
        }

        let reports: Vec<_> = runs.reports().into_iter().cloned().collect();
        let comparison = Comparator::new(arbitrator)
            .with_tolerance(self.limits.position_tolerance)
            .with_event_channel(self.event_tx.clone())
            .compare(&reports)
            .await?;

        for d in &comparison.severity_disagreements {
            self.audit(AuditEvent::ArbitrationDecision {
                finding: d
                    .finding
                    .location
                    .as_ref()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| d.finding.description.clone()),
                ratings: d.ratings.iter().map(|(s, r)| (s.clone(), *r)).collect(),
                resolved: d.resolved,
                arbitrator: d
                    .resolved_by
                    .clone()
                    .or_else(|| self.arbitrator.clone())
                    .unwrap_or_else(|| SourceId::new("none")),
                error: d.arbitration_error.clone(),
            })
            .await;
        }

        self.audit(AuditEvent::SessionCompleted {
            completed_runs: reports.len(),
            failed_runs: runs.failures().len(),
            overlapping: comparison.overlapping.len(),
            disagreements: comparison.severity_disagreements.len(),
        })
        .await;
        info!(
            session_id = %self.session_id,
            completed = reports.len(),
            failed = runs.failures().len(),
            overlapping = comparison.overlapping.len(),
            disagreements = comparison.severity_disagreements.len(),
            "Review session complete"
        );

        Ok(ReviewOutcome {
            session_id: self.session_id.clone(),
            scope: self.scope.clone(),
            started_at,
            completed_at: Utc::now(),
            runs,
            comparison,
        })
    }

    async fn audit_runs(&self, runs: &RunSet) {
        for (label, outcome) in runs.iter() {
            match outcome {
                RunOutcome::Completed(report) => {
                    for failure in &report.dimension_failures {
                        self.audit(AuditEvent::DimensionFailed {
                            label: label.clone(),
                            dimension: failure.dimension.clone(),
                            kind: failure.kind,
                            message: failure.message.clone(),
                        })
                        .await;
                    }
                    self.audit(AuditEvent::RunCompleted {
                        label: label.clone(),
                        status: report.status,
                        findings: report.total_findings(),
                        duration_ms: report.duration_ms(),
                    })
                    .await;
                }
                RunOutcome::Failed(failure) => {
                    self.audit(AuditEvent::RunFailed {
                        label: label.clone(),
                        phase: failure.phase,
                        error_type: failure.error_type.clone(),
                        message: failure.message.clone(),
                    })
                    .await;
                }
            }
        }
    }
}
