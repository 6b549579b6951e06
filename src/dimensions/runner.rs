use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::registry::Dimension;
use crate::engine::AnalysisEngine;
use crate::errors::{with_retry, EngineError, RetryConfig, ReviewError};
use crate::isolation::IsolationContext;
use crate::pipeline::events::{emit, EventSender, RunEvent};

/// Result of one dimension worker.
#[derive(Debug)]
pub struct DimensionOutcome {
    pub dimension: &'static Dimension,
    pub result: Result<String, EngineError>,
    pub duration_ms: u64,
}

impl DimensionOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fans one engine out over a set of dimensions inside a single context.
pub struct DimensionRunner {
    engine: Arc<dyn AnalysisEngine>,
    dimensions: Vec<&'static Dimension>,
    timeout: Duration,
    retry: RetryConfig,
    event_tx: Option<EventSender>,
}

impl DimensionRunner {
    pub fn new(engine: Arc<dyn AnalysisEngine>, dimensions: Vec<&'static Dimension>, timeout: Duration) -> Self {
        Self {
            engine,
            dimensions,
            timeout,
            retry: RetryConfig::default(),
            event_tx: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_event_channel(mut self, tx: Option<EventSender>) -> Self {
        self.event_tx = tx;
        self
    }

    pub fn dimensions(&self) -> &[&'static Dimension] {
        &self.dimensions
    }

    /// Run every dimension concurrently and wait for all of them. Outcomes
    /// come back in the order the dimensions were given.
    pub async fn run(&self, context: &IsolationContext, scope: &str) -> Vec<DimensionOutcome> {
        let handles: Vec<_> = self
            .dimensions
            .iter()
            .map(|&dimension| {
                let engine = self.engine.clone();
                let context = context.clone();
                let scope = scope.to_string();
                let timeout = self.timeout;
                let retry = self.retry.clone();

                tokio::spawn(async move {
                    let start = Instant::now();
                    let result = invoke_bounded(engine, &context, &scope, dimension, timeout, &retry).await;
                    (result, start.elapsed().as_millis() as u64)
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (dimension, joined) in self.dimensions.iter().copied().zip(results) {
            let (result, duration_ms) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(label = %context.label, dimension = %dimension.name, error = %e, "Dimension task panicked");
                    (Err(EngineError::crash(format!("worker panicked: {}", e))), 0)
                }
            };

            match &result {
                Ok(_) => {
                    debug!(label = %context.label, dimension = %dimension.name, duration_ms, "Dimension completed");
                    emit(&self.event_tx, RunEvent::DimensionCompleted {
                        label: context.label.clone(),
                        dimension: dimension.name.to_string(),
                        duration_ms,
                    });
                }
                Err(e) => {
                    info!(label = %context.label, dimension = %dimension.name, kind = %e.kind, error = %e.message, "Dimension failed, continuing run");
                    emit(&self.event_tx, RunEvent::DimensionFailed {
                        label: context.label.clone(),
                        dimension: dimension.name.to_string(),
                        kind: e.kind,
                        error: e.message.clone(),
                    });
                }
            }
            outcomes.push(DimensionOutcome { dimension, result, duration_ms });
        }
        outcomes
    }
}

async fn invoke_bounded(
    engine: Arc<dyn AnalysisEngine>,
    context: &IsolationContext,
    scope: &str,
    dimension: &'static Dimension,
    timeout: Duration,
    retry: &RetryConfig,
) -> Result<String, EngineError> {
    let directive = dimension.directive();
    let operation = format!("{}/{}", context.label, dimension.name);

    let result = with_retry(&operation, retry, || {
        let engine = engine.clone();
        let directive = directive.as_str();
        async move {
            match tokio::time::timeout(timeout, engine.invoke(context, scope, directive)).await {
                Ok(result) => result.map_err(ReviewError::Engine),
                Err(_) => Err(ReviewError::Engine(EngineError::timeout(format!(
                    "no answer within {}s",
                    timeout.as_secs()
                )))),
            }
        }
    })
    .await;

    result.map_err(|e| match e {
        ReviewError::Engine(inner) => inner,
        other => EngineError::crash(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::registry::{select, DimensionName};
    use crate::engine::StubEngine;
    use crate::errors::EngineErrorKind;
    use crate::models::finding::SourceId;
    use std::path::PathBuf;

    fn ctx() -> IsolationContext {
        IsolationContext {
            context_id: "ctx".into(),
            label: SourceId::new("opus"),
            storage: PathBuf::from("/nonexistent"),
            state_namespace: PathBuf::from("/nonexistent"),
        }
    }

    #[tokio::test]
    async fn test_one_invocation_per_dimension_in_order() {
        let engine = Arc::new(StubEngine::new("stub").respond("Focus: defects", "Description: bug"));
        let runner = DimensionRunner::new(engine.clone(), select(&[]), Duration::from_secs(5));

        let outcomes = runner.run(&ctx(), "src").await;
        assert_eq!(outcomes.len(), 6);
        assert_eq!(engine.invocations(), 6);
        assert_eq!(outcomes[1].dimension.name, DimensionName::Defects);
        assert_eq!(outcomes[1].result.as_ref().unwrap(), "Description: bug");
        assert!(outcomes.iter().all(|o| o.succeeded()));
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let engine = Arc::new(
            StubEngine::new("stub").fail("Focus: comment-accuracy", EngineError::malformed("garbage")),
        );
        let runner = DimensionRunner::new(engine, select(&[]), Duration::from_secs(5))
            .with_retry(RetryConfig { max_retries: 0 });

        let outcomes = runner.run(&ctx(), "src").await;
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.succeeded()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].dimension.name, DimensionName::CommentAccuracy);
        assert_eq!(outcomes.iter().filter(|o| o.succeeded()).count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_engine_times_out_without_retry() {
        let engine = Arc::new(StubEngine::new("stub").hang("Focus: architecture"));
        let runner = DimensionRunner::new(
            engine.clone(),
            select(&[DimensionName::Architecture, DimensionName::Defects]),
            Duration::from_secs(30),
        )
        .with_retry(RetryConfig { max_retries: 3 });

        let outcomes = runner.run(&ctx(), "src").await;
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Timeout);
        assert!(outcomes[1].succeeded());
        assert_eq!(engine.invocations(), 2);
    }

    #[tokio::test]
    async fn test_events_reported_per_dimension() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = Arc::new(StubEngine::new("stub").fail("Focus: defects", EngineError::timeout("slow")));
        let runner = DimensionRunner::new(engine, select(&[DimensionName::Defects, DimensionName::TypeDesign]), Duration::from_secs(5))
            .with_event_channel(Some(tx));

        runner.run(&ctx(), "src").await;
        let mut failed = 0;
        let mut completed = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                RunEvent::DimensionFailed { .. } => failed += 1,
                RunEvent::DimensionCompleted { .. } => completed += 1,
                _ => {}
            }
        }
        assert_eq!((failed, completed), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dimensions_run_in_parallel() {
        let engine = Arc::new(StubEngine::new("stub").with_latency(Duration::from_secs(10)));
        let runner = DimensionRunner::new(engine.clone(), select(&[]), Duration::from_secs(60));

        let started = tokio::time::Instant::now();
        let outcomes = runner.run(&ctx(), "src").await;
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert_eq!(engine.invocations(), 6);
        assert!(started.elapsed() < Duration::from_secs(20));
    }
}
