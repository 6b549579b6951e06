use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::adapter::{render_prompt, require_output, AnalysisEngine};
use crate::errors::EngineError;
use crate::isolation::IsolationContext;
use crate::utils::truncation::truncate_error;

/// How the prompt reaches the engine process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVia {
    #[default]
    Arg,
    Stdin,
}

/// Runs an external analysis CLI inside the context's working copy.
pub struct CommandEngine {
    name: String,
    program: String,
    args: Vec<String>,
    /// Environment variable pointed at the context's state namespace, so the
    /// engine keeps its sessions and caches private to the run.
    state_env: Option<String>,
    prompt_via: PromptVia,
}

impl CommandEngine {
    pub fn new(name: &str, program: &str, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args,
            state_env: None,
            prompt_via: PromptVia::Arg,
        }
    }

    pub fn with_state_env(mut self, var: Option<String>) -> Self {
        self.state_env = var;
        self
    }

    pub fn with_prompt_via(mut self, via: PromptVia) -> Self {
        self.prompt_via = via;
        self
    }

    fn build_command(&self, context: &IsolationContext, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&context.storage)
            .env("CROSSREVIEW_CONTEXT_ID", &context.context_id)
            .env("CROSSREVIEW_STATE_DIR", &context.state_namespace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // an expired invocation is dropped by the runner; take the child with it
            .kill_on_drop(true);
        if let Some(var) = &self.state_env {
            cmd.env(var, &context.state_namespace);
        }
        match self.prompt_via {
            PromptVia::Arg => {
                cmd.arg(prompt).stdin(Stdio::null());
            }
            PromptVia::Stdin => {
                cmd.stdin(Stdio::piped());
            }
        }
        cmd
    }
}

#[async_trait]
impl AnalysisEngine for CommandEngine {
    async fn invoke(
        &self,
        context: &IsolationContext,
        scope: &str,
        directive: &str,
    ) -> Result<String, EngineError> {
        let prompt = render_prompt(directive, scope);
        debug!(engine = %self.name, program = %self.program, context_id = %context.context_id, "Spawning engine");

        let mut child = self.build_command(context, &prompt).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::crash(format!("{} not found on PATH", self.program))
            } else {
                EngineError::crash(format!("Failed to run {}: {}", self.program, e))
            }
        })?;

        if self.prompt_via == PromptVia::Stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| EngineError::crash(format!("Failed to write prompt: {}", e)))?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::crash(format!("Failed to wait for {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::crash(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                truncate_error(stderr.trim())
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| EngineError::malformed(format!("{} wrote non-UTF-8 output", self.program)))?;
        require_output(stdout, &self.name)
    }

    fn engine_name(&self) -> &str {
        &self.name
    }
}
