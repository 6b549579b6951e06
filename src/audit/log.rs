use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::errors::{EngineErrorKind, ReviewError};
use crate::models::finding::{Severity, SourceId};
use crate::models::report::RunStatus;
use crate::pipeline::state::RunPhase;

/// Everything worth keeping a durable trace of.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AuditEvent {
    SessionStarted {
        session_id: String,
        scope: String,
        sources: Vec<SourceId>,
    },
    RunCompleted {
        label: SourceId,
        status: RunStatus,
        findings: usize,
        duration_ms: u64,
    },
    RunFailed {
        label: SourceId,
        phase: RunPhase,
        error_type: String,
        message: String,
    },
    DimensionFailed {
        label: SourceId,
        dimension: String,
        kind: EngineErrorKind,
        message: String,
    },
    ArbitrationDecision {
        finding: String,
        ratings: Vec<(SourceId, Severity)>,
        resolved: Option<Severity>,
        arbitrator: SourceId,
        error: Option<String>,
    },
    SessionCompleted {
        completed_runs: usize,
        failed_runs: usize,
        overlapping: usize,
        disagreements: usize,
    },
}

/// Append-only JSON-lines audit trail (`audit.jsonl`).
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl AuditLog {
    pub async fn open(base_dir: &Path) -> Result<Self, ReviewError> {
        tokio::fs::create_dir_all(base_dir).await?;
        let path = base_dir.join("audit.jsonl");
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub async fn record(&self, event: &AuditEvent) -> Result<(), ReviewError> {
        let tagged = serde_json::to_value(event)?;
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": tagged["event"],
            "data": tagged["data"],
        });
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
