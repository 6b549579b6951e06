use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::report::RunFailure;
use crate::pipeline::state::RunPhase;

/// How an analysis engine invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// The invocation exceeded its upper bound.
    Timeout,
    /// The engine process or transport failed.
    Crash,
    /// The engine answered with output that cannot be used at all.
    MalformedOutput,
}

impl EngineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Crash => "crash",
            Self::MalformedOutput => "malformed_output",
        }
    }
}

impl std::fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine {kind}: {message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self { kind: EngineErrorKind::Timeout, message: message.into() }
    }

    pub fn crash(message: impl Into<String>) -> Self {
        Self { kind: EngineErrorKind::Crash, message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self { kind: EngineErrorKind::MalformedOutput, message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Arbitration error: {0}")]
    Arbitration(String),

    #[error("All runs failed: {}", format_failures(.0))]
    AllRunsFailed(Vec<RunFailure>),

    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Git error: {0}")]
    Git(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_failures(failures: &[RunFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}: {})", f.label, f.error_type, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<git2::Error> for ReviewError {
    fn from(e: git2::Error) -> Self {
        ReviewError::Git(e.message().to_string())
    }
}
