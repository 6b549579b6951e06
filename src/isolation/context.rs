use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ReviewError;
use crate::models::finding::SourceId;

/// A private execution environment for one run.
///
/// For two contexts that are acquired at the same time, `storage` and
/// `state_namespace` never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationContext {
    pub context_id: String,
    pub label: SourceId,
    /// Working copy the engine operates in.
    pub storage: PathBuf,
    /// Private directory for engine state (config, caches, sessions).
    pub state_namespace: PathBuf,
}

#[async_trait]
pub trait IsolationProvider: Send + Sync {
    /// Allocate a fresh context. Safe to call concurrently.
    async fn acquire(&self, label: &SourceId) -> Result<IsolationContext, ReviewError>;

    /// Tear a context down. Idempotent; never fails.
    async fn release(&self, context: &IsolationContext);

    /// Contexts acquired and not yet released.
    fn active_count(&self) -> usize;

    /// Provider name for logging
    fn provider_name(&self) -> &str;
}

/// Turn a free-form label into something safe for a path component or a
/// git branch name.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "run".to_string()
    } else {
        trimmed.chars().take(40).collect()
    }
}

/// First eight characters of a fresh v4 uuid plus the full id.
pub(crate) fn new_context_id() -> (String, String) {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let short = id[..8].to_string();
    (id, short)
}
