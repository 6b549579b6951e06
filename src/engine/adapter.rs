use async_trait::async_trait;

use crate::errors::EngineError;
use crate::isolation::IsolationContext;

/// The sole I/O boundary to the opaque analysis capability.
///
/// Implementations receive the context the run executes in, the scope under
/// review and a focus directive, and return raw findings text. They never
/// see other workers' output.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn invoke(
        &self,
        context: &IsolationContext,
        scope: &str,
        directive: &str,
    ) -> Result<String, EngineError>;

    /// Engine name for logging
    fn engine_name(&self) -> &str;
}

/// Final prompt text sent to an engine.
pub fn render_prompt(directive: &str, scope: &str) -> String {
    format!(
        "{}\n\nScope: {}\nOnly report issues located inside this scope.",
        directive.trim_end(),
        scope
    )
}

/// Engines frequently answer with nothing useful at all; treat that as a
/// malformed response rather than "no findings".
pub fn require_output(raw: String, engine: &str) -> Result<String, EngineError> {
    if raw.trim().is_empty() {
        return Err(EngineError::malformed(format!("{} returned empty output", engine)));
    }
    Ok(raw)
}
