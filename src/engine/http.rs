use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::adapter::{render_prompt, require_output, AnalysisEngine};
use super::scope::ScopeReader;
use crate::errors::EngineError;
use crate::isolation::IsolationContext;
use crate::utils::truncation::truncate_error;

const SYSTEM_PROMPT: &str = "You are a meticulous code reviewer. Report only concrete findings in the requested format.";

/// Engine backed by an OpenAI-compatible chat completions endpoint.
pub struct HttpEngine {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    scope_reader: ScopeReader,
}

impl HttpEngine {
    pub fn new(name: &str, base_url: Option<&str>, model: Option<&str>, api_key: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            client: Client::new(),
            base_url: base_url
                .unwrap_or("http://localhost:11434/v1")
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or("qwen2.5-coder:7b").to_string(),
            api_key,
            scope_reader: ScopeReader::default(),
        }
    }

    /// Client-side request deadline. The dimension runner enforces its own
    /// bound on top of this.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder().timeout(timeout).build().unwrap_or_else(|_| Client::new());
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AnalysisEngine for HttpEngine {
    async fn invoke(
        &self,
        context: &IsolationContext,
        scope: &str,
        directive: &str,
    ) -> Result<String, EngineError> {
        let reader = self.scope_reader.clone();
        let root = context.storage.clone();
        let target = scope.to_string();
        let source = tokio::task::spawn_blocking(move || reader.read(&root, &target))
            .await
            .map_err(|e| EngineError::crash(format!("Scope reader task failed: {}", e)))??;
        let prompt = format!("{}\n\n{}", render_prompt(directive, scope), source);

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": 4096,
        });

        debug!(engine = %self.name, model = %self.model, context_id = %context.context_id, "Sending completion request");
        let mut request = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::timeout(format!("{} request timed out", self.name))
            } else {
                EngineError::crash(format!("{} request failed: {}", self.name, e))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::crash(format!(
                "{} returned {}: {}",
                self.name,
                status,
                truncate_error(&text)
            )));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::malformed(format!("Unparseable response body: {}", e)))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngineError::malformed("Response has no message content"))?;
        require_output(content.to_string(), &self.name)
    }

    fn engine_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineErrorKind;
    use crate::models::finding::SourceId;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_and_trailing_slash() {
        let engine = HttpEngine::new("local", Some("http://host:8080/v1/"), None, None);
        assert_eq!(engine.base_url, "http://host:8080/v1");
        assert_eq!(engine.model_name(), "qwen2.5-coder:7b");
        assert_eq!(engine.engine_name(), "local");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_crash() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn x() {}").unwrap();
        let ctx = IsolationContext {
            context_id: "ctx".into(),
            label: SourceId::new("local"),
            storage: dir.path().to_path_buf(),
            state_namespace: dir.path().to_path_buf(),
        };
        // port 9 (discard) is never served locally
        let engine = HttpEngine::new("local", Some("http://127.0.0.1:9/v1"), None, None)
            .with_request_timeout(Duration::from_secs(5));

        let err = engine.invoke(&ctx, ".", "Focus: defects").await.unwrap_err();
        assert!(matches!(err.kind, EngineErrorKind::Crash | EngineErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_missing_scope_fails_before_request() {
        let dir = TempDir::new().unwrap();
        let ctx = IsolationContext {
            context_id: "ctx".into(),
            label: SourceId::new("local"),
            storage: dir.path().to_path_buf(),
            state_namespace: dir.path().to_path_buf(),
        };
        let engine = HttpEngine::new("local", Some("http://127.0.0.1:9/v1"), None, None);

        let err = engine.invoke(&ctx, "nope", "Focus: defects").await.unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Crash);
        assert!(err.message.contains("not found"));
    }
}
