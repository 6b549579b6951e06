use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use super::schema::CONFIG_SCHEMA;
use super::types::ReviewConfig;
use crate::errors::ReviewError;

const MAX_CONFIG_BYTES: u64 = 1_048_576;
const MAX_POSITION_TOLERANCE: u32 = 50;

pub async fn parse_config(path: &Path) -> Result<ReviewConfig, ReviewError> {
    if !path.exists() {
        return Err(ReviewError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(ReviewError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse without conflict checks; those run after command-line overrides.
pub fn parse_config_str(content: &str) -> Result<ReviewConfig, ReviewError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    validate_schema(&yaml)?;
    let config: ReviewConfig = serde_yaml::from_value(yaml)?;
    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), ReviewError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| ReviewError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| ReviewError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        // Advisory: the typed parse and conflict checks are authoritative.
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Detect semantic conflicts in the (possibly overridden) configuration.
pub fn validate_conflicts(config: &ReviewConfig) -> Result<(), ReviewError> {
    let mut engine_ids = HashSet::new();
    for engine in &config.engines {
        if engine.id.trim().is_empty() {
            return Err(ReviewError::Config("Engine id must not be empty".into()));
        }
        if !engine_ids.insert(engine.id.as_str()) {
            return Err(ReviewError::Config(format!("Engine '{}' is defined twice", engine.id)));
        }
    }

    if config.sources.is_empty() {
        return Err(ReviewError::Config("At least one source is required".into()));
    }
    let mut seen = HashSet::new();
    for source in &config.sources {
        if source.trim().is_empty() {
            return Err(ReviewError::Config("Source labels must not be empty".into()));
        }
        if !seen.insert(source.as_str()) {
            return Err(ReviewError::Config(format!("Source '{}' is listed twice", source)));
        }
        if !engine_ids.contains(source.as_str()) {
            return Err(ReviewError::Config(format!("Source '{}' names no configured engine", source)));
        }
    }

    if let Some(arbitrator) = &config.arbitrator {
        if !engine_ids.contains(arbitrator.as_str()) {
            return Err(ReviewError::Config(format!(
                "Arbitrator '{}' names no configured engine",
                arbitrator
            )));
        }
    } else if config.sources.len() > 1 {
        warn!("No arbitrator configured; severity disagreements will be flagged for review");
    }

    config.dimension_names()?;

    if let Some(limits) = &config.limits {
        if limits.engine_timeout_secs == Some(0) {
            return Err(ReviewError::Config("engine_timeout_secs must be positive".into()));
        }
        if limits.position_tolerance.is_some_and(|t| t > MAX_POSITION_TOLERANCE) {
            return Err(ReviewError::Config(format!(
                "position_tolerance must be at most {}",
                MAX_POSITION_TOLERANCE
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineKind, IsolationKind};

    const SAMPLE: &str = r#"
scope: src/
sources: [opus, local]
arbitrator: judge
dimensions: [defects, test-coverage]
engines:
  - id: opus
    kind: command
    program: claude
    args: ["-p"]
  - id: local
    kind: http
    model: qwen2.5-coder:7b
  - id: judge
    kind: stub
    response: "Severity: high"
isolation:
  kind: scratch
  repo: .
limits:
  engine_timeout_secs: 120
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config_str(SAMPLE).unwrap();
        assert_eq!(config.scope(), "src/");
        assert_eq!(config.sources, vec!["opus".to_string(), "local".to_string()]);
        assert!(matches!(config.engine("local").unwrap().kind, EngineKind::Http { .. }));
        assert_eq!(config.isolation().kind, IsolationKind::Scratch);
        assert_eq!(config.dimension_names().unwrap().len(), 2);
        assert!(validate_conflicts(&config).is_ok());
    }

    #[test]
    fn test_unknown_engine_kind_is_rejected() {
        let yaml = "sources: [a]\nengines:\n  - id: a\n    kind: telepathy\n";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_conflicts() {
        let base = parse_config_str(SAMPLE).unwrap();

        let mut config = base.clone();
        config.sources.clear();
        assert!(validate_conflicts(&config).is_err());

        let mut config = base.clone();
        config.sources = vec!["opus".into(), "opus".into()];
        assert!(validate_conflicts(&config).is_err());

        let mut config = base.clone();
        config.sources.push("ghost".into());
        assert!(validate_conflicts(&config).is_err());

        let mut config = base.clone();
        config.arbitrator = Some("ghost".into());
        assert!(validate_conflicts(&config).is_err());

        let mut config = base.clone();
        config.engines.push(config.engines[0].clone());
        assert!(validate_conflicts(&config).is_err());

        let mut config = base.clone();
        config.dimensions.push("style".into());
        assert!(validate_conflicts(&config).is_err());

        let mut config = base;
        config.limits.as_mut().unwrap().engine_timeout_secs = Some(0);
        assert!(validate_conflicts(&config).is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = parse_config(Path::new("/nonexistent/crossreview.yaml")).await.unwrap_err();
        assert!(matches!(err, ReviewError::Config(_)));
    }
}
