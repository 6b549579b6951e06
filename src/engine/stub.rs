use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::adapter::{require_output, AnalysisEngine};
use crate::errors::EngineError;
use crate::isolation::IsolationContext;

/// Scripted reply of a [`StubEngine`].
#[derive(Debug, Clone)]
pub enum StubResponse {
    Text(String),
    Fail(EngineError),
    /// Never answers; only useful against a bounded caller.
    Hang,
}

/// Deterministic engine for tests and dry runs.
///
/// Replies are matched by substring against the directive, first rule wins,
/// so a rule keyed on `"Focus: test-coverage"` answers only that dimension.
pub struct StubEngine {
    name: String,
    rules: Vec<(String, StubResponse)>,
    fallback: StubResponse,
    latency: Option<Duration>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<String>>,
}

impl StubEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            fallback: StubResponse::Text("NO FINDINGS".to_string()),
            latency: None,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, needle: &str, text: impl Into<String>) -> Self {
        self.rules.push((needle.to_string(), StubResponse::Text(text.into())));
        self
    }

    pub fn fail(mut self, needle: &str, error: EngineError) -> Self {
        self.rules.push((needle.to_string(), StubResponse::Fail(error)));
        self
    }

    pub fn hang(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), StubResponse::Hang));
        self
    }

    pub fn otherwise(mut self, response: StubResponse) -> Self {
        self.fallback = response;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn invocations(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Context ids this engine was invoked in, in call order.
    pub fn seen_contexts(&self) -> Vec<String> {
        self.contexts.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AnalysisEngine for StubEngine {
    async fn invoke(
        &self,
        context: &IsolationContext,
        _scope: &str,
        directive: &str,
    ) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.contexts.lock() {
            seen.push(context.context_id.clone());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = self
            .rules
            .iter()
            .find(|(needle, _)| directive.contains(needle.as_str()))
            .map(|(_, r)| r)
            .unwrap_or(&self.fallback);

        match response {
            StubResponse::Text(text) => require_output(text.clone(), &self.name),
            StubResponse::Fail(e) => Err(e.clone()),
            StubResponse::Hang => std::future::pending().await,
        }
    }

    fn engine_name(&self) -> &str {
        &self.name
    }
}
