use tokio::sync::mpsc;

use crate::errors::EngineErrorKind;
use crate::models::finding::{Severity, SourceId};
use crate::pipeline::state::RunPhase;

/// Messages sent from running sessions to a display for real-time progress.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A run was launched
    RunStarted {
        label: SourceId,
        dimensions: usize,
    },
    /// A run moved to a new phase
    PhaseChanged {
        label: SourceId,
        phase: RunPhase,
    },
    /// A dimension worker produced output
    DimensionCompleted {
        label: SourceId,
        dimension: String,
        duration_ms: u64,
    },
    /// A dimension worker failed; the run carries on
    DimensionFailed {
        label: SourceId,
        dimension: String,
        kind: EngineErrorKind,
        error: String,
    },
    RunCompleted {
        label: SourceId,
        findings: usize,
        duration_ms: u64,
    },
    RunFailed {
        label: SourceId,
        phase: RunPhase,
        error: String,
    },
    /// An arbitrator settled (or failed to settle) a severity disagreement
    ArbitrationResolved {
        finding: String,
        resolved: Option<Severity>,
        arbitrator: SourceId,
    },
}

pub type EventSender = mpsc::UnboundedSender<RunEvent>;

/// Send an event if anyone is listening. A closed receiver is not an error.
pub fn emit(tx: &Option<EventSender>, event: RunEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listener_is_noop() {
        emit(&None, RunEvent::RunStarted { label: SourceId::new("a"), dimensions: 6 });
    }

    #[test]
    fn test_emit_to_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit(&Some(tx), RunEvent::RunStarted { label: SourceId::new("a"), dimensions: 6 });
    }

    #[tokio::test]
    async fn test_emit_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        emit(
            &Some(tx),
            RunEvent::PhaseChanged { label: SourceId::new("a"), phase: RunPhase::Running },
        );
        match rx.recv().await {
            Some(RunEvent::PhaseChanged { phase, .. }) => assert_eq!(phase, RunPhase::Running),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
