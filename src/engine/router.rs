use std::sync::Arc;
use std::time::Duration;

use super::adapter::AnalysisEngine;
use super::command::CommandEngine;
use super::http::HttpEngine;
use super::stub::{StubEngine, StubResponse};
use crate::config::{EngineConfig, EngineKind};
use crate::errors::ReviewError;

/// Build the engine behind one configured id. `timeout` bounds HTTP requests
/// on top of the per-invocation bound the runner applies.
pub fn create_engine(config: &EngineConfig, timeout: Duration) -> Result<Arc<dyn AnalysisEngine>, ReviewError> {
    match &config.kind {
        EngineKind::Command { program, args, state_env, prompt_via } => {
            if program.trim().is_empty() {
                return Err(ReviewError::Config(format!("Engine '{}' has an empty program", config.id)));
            }
            Ok(Arc::new(
                CommandEngine::new(&config.id, program, args.clone())
                    .with_state_env(state_env.clone())
                    .with_prompt_via(*prompt_via),
            ))
        }
        EngineKind::Http { base_url, model, api_key_env } => {
            let api_key = match api_key_env {
                Some(var) => Some(std::env::var(var).map_err(|_| {
                    ReviewError::Config(format!("Engine '{}' expects an API key in ${}", config.id, var))
                })?),
                None => None,
            };
            Ok(Arc::new(
                HttpEngine::new(&config.id, base_url.as_deref(), model.as_deref(), api_key)
                    .with_request_timeout(timeout),
            ))
        }
        EngineKind::Stub { response } => {
            let fallback = StubResponse::Text(response.clone().unwrap_or_else(|| "NO FINDINGS".to_string()));
            Ok(Arc::new(StubEngine::new(&config.id).otherwise(fallback)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PromptVia;

    #[test]
    fn test_create_each_kind() {
        let command = EngineConfig {
            id: "opus".into(),
            kind: EngineKind::Command {
                program: "claude".into(),
                args: vec!["-p".into()],
                state_env: Some("CLAUDE_CONFIG_DIR".into()),
                prompt_via: PromptVia::Arg,
            },
        };
        assert_eq!(create_engine(&command, Duration::from_secs(5)).unwrap().engine_name(), "opus");

        let http = EngineConfig {
            id: "local".into(),
            kind: EngineKind::Http { base_url: None, model: None, api_key_env: None },
        };
        assert_eq!(create_engine(&http, Duration::from_secs(5)).unwrap().engine_name(), "local");

        let stub = EngineConfig { id: "dry".into(), kind: EngineKind::Stub { response: None } };
        assert_eq!(create_engine(&stub, Duration::from_secs(5)).unwrap().engine_name(), "dry");
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let http = EngineConfig {
            id: "remote".into(),
            kind: EngineKind::Http {
                base_url: Some("https://api.example.com/v1".into()),
                model: None,
                api_key_env: Some("CROSSREVIEW_TEST_KEY_THAT_IS_NEVER_SET".into()),
            },
        };
        assert!(matches!(create_engine(&http, Duration::from_secs(5)), Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_empty_program_rejected() {
        let command = EngineConfig {
            id: "bad".into(),
            kind: EngineKind::Command { program: " ".into(), args: Vec::new(), state_env: None, prompt_via: PromptVia::Arg },
        };
        assert!(create_engine(&command, Duration::from_secs(5)).is_err());
    }
}
