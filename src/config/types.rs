use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dimensions::DimensionName;
use crate::engine::PromptVia;
use crate::errors::ReviewError;
use crate::models::finding::SourceId;
use crate::pipeline::state::RunLimits;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ReviewConfig {
    pub scope: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub arbitrator: Option<String>,
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub isolation: Option<IsolationConfig>,
    pub limits: Option<LimitsConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: EngineKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineKind {
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        state_env: Option<String>,
        #[serde(default)]
        prompt_via: PromptVia,
    },
    Http {
        base_url: Option<String>,
        model: Option<String>,
        api_key_env: Option<String>,
    },
    /// Canned answer for every directive; dry runs only.
    Stub {
        response: Option<String>,
    },
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Http { .. } => "http",
            Self::Stub { .. } => "stub",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IsolationKind {
    #[default]
    Worktree,
    Scratch,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IsolationConfig {
    #[serde(default)]
    pub kind: IsolationKind,
    /// Repository (worktree) or seed tree (scratch) the runs review.
    pub repo: Option<String>,
    pub base_dir: Option<String>,
}

impl IsolationConfig {
    pub fn repo_path(&self) -> PathBuf {
        PathBuf::from(self.repo.as_deref().unwrap_or("."))
    }

    pub fn base_path(&self) -> PathBuf {
        PathBuf::from(self.base_dir.as_deref().unwrap_or(".crossreview/contexts"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LimitsConfig {
    pub engine_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub position_tolerance: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct OutputConfig {
    pub directory: Option<String>,
}

impl ReviewConfig {
    pub fn engine(&self, id: &str) -> Option<&EngineConfig> {
        self.engines.iter().find(|e| e.id == id)
    }

    pub fn source_labels(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| SourceId::new(s.as_str())).collect()
    }

    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or(".")
    }

    pub fn run_limits(&self) -> RunLimits {
        let defaults = RunLimits::default();
        let Some(limits) = &self.limits else { return defaults };
        RunLimits {
            engine_timeout: limits
                .engine_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.engine_timeout),
            max_retries: limits.max_retries.unwrap_or(defaults.max_retries),
            position_tolerance: limits.position_tolerance.unwrap_or(defaults.position_tolerance),
        }
    }

    /// The configured dimension subset; empty means all of them.
    pub fn dimension_names(&self) -> Result<Vec<DimensionName>, ReviewError> {
        self.dimensions
            .iter()
            .map(|d| {
                DimensionName::parse(d).ok_or_else(|| ReviewError::Config(format!("Unknown dimension '{}'", d)))
            })
            .collect()
    }

    pub fn isolation(&self) -> IsolationConfig {
        self.isolation.clone().unwrap_or_default()
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(
            self.output
                .as_ref()
                .and_then(|o| o.directory.as_deref())
                .unwrap_or("./reviews"),
        )
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub scope: Option<String>,
    pub sources: Vec<String>,
    pub arbitrator: Option<String>,
    pub output: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ReviewConfig) {
        if let Some(scope) = &self.scope {
            config.scope = Some(scope.clone());
        }
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
        if let Some(arbitrator) = &self.arbitrator {
            config.arbitrator = Some(arbitrator.clone());
        }
        if let Some(output) = &self.output {
            config.output = Some(OutputConfig { directory: Some(output.clone()) });
        }
    }
}
