use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ReviewError;
use crate::models::finding::SourceId;

/// Lifecycle of a single run. Transitions only move forward; `Failed` is
/// reachable from any non-terminal phase and is terminal itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    Pending,
    Provisioning,
    Running,
    Normalizing,
    Merging,
    Completed,
    Failed,
}

impl RunPhase {
    fn order(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Provisioning => 1,
            Self::Running => 2,
            Self::Normalizing => 3,
            Self::Merging => 4,
            Self::Completed => 5,
            Self::Failed => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Completed => *self == Self::Merging,
            _ => next.order() == self.order() + 1,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Running => write!(f, "running"),
            Self::Normalizing => write!(f, "normalizing"),
            Self::Merging => write!(f, "merging"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub phase: RunPhase,
    pub at: DateTime<Utc>,
}

/// Tracks one run through its phases. Owned by the task executing the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTracker {
    pub label: SourceId,
    pub phase: RunPhase,
    pub history: Vec<PhaseTransition>,
    /// Set once the run entered `Failed`.
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
}

impl RunTracker {
    pub fn new(label: SourceId) -> Self {
        let now = Utc::now();
        Self {
            label,
            phase: RunPhase::Pending,
            history: vec![PhaseTransition { phase: RunPhase::Pending, at: now }],
            error: None,
            start_time: now,
        }
    }

    pub fn advance(&mut self, next: RunPhase) -> Result<(), ReviewError> {
        if !self.phase.can_advance_to(next) {
            return Err(ReviewError::InvalidTransition { from: self.phase, to: next });
        }
        self.phase = next;
        self.history.push(PhaseTransition { phase: next, at: Utc::now() });
        Ok(())
    }

    /// Move to `Failed`, remembering the phase the run failed in.
    pub fn fail(&mut self, error: &ReviewError) -> Result<RunPhase, ReviewError> {
        let failed_in = self.phase;
        self.advance(RunPhase::Failed)?;
        self.error = Some(error.to_string());
        Ok(failed_in)
    }
}

/// Limits shared read-only by every run of a session.
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Upper bound for a single engine invocation.
    pub engine_timeout: std::time::Duration,
    pub max_retries: u32,
    pub position_tolerance: u32,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            engine_timeout: std::time::Duration::from_secs(900),
            max_retries: 1,
            position_tolerance: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut tracker = RunTracker::new(SourceId::new("opus"));
        for phase in [
            RunPhase::Provisioning,
            RunPhase::Running,
            RunPhase::Normalizing,
            RunPhase::Merging,
            RunPhase::Completed,
        ] {
            tracker.advance(phase).unwrap();
        }
        assert_eq!(tracker.phase, RunPhase::Completed);
        assert_eq!(tracker.history.len(), 6);
    }

    #[test]
    fn test_skipping_a_phase_is_rejected() {
        let mut tracker = RunTracker::new(SourceId::new("opus"));
        let err = tracker.advance(RunPhase::Running).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::InvalidTransition { from: RunPhase::Pending, to: RunPhase::Running }
        ));
    }

    #[test]
    fn test_backwards_transition_is_rejected() {
        let mut tracker = RunTracker::new(SourceId::new("opus"));
        tracker.advance(RunPhase::Provisioning).unwrap();
        tracker.advance(RunPhase::Running).unwrap();
        assert!(tracker.advance(RunPhase::Provisioning).is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut tracker = RunTracker::new(SourceId::new("opus"));
        tracker.advance(RunPhase::Provisioning).unwrap();
        let failed_in = tracker
            .fail(&ReviewError::Provisioning("disk full".into()))
            .unwrap();
        assert_eq!(failed_in, RunPhase::Provisioning);
        assert_eq!(tracker.phase, RunPhase::Failed);
        assert!(tracker.error.as_deref().unwrap().contains("disk full"));
        assert!(tracker.advance(RunPhase::Running).is_err());
        assert!(tracker.advance(RunPhase::Failed).is_err());
    }

    #[test]
    fn test_completed_only_from_merging() {
        assert!(!RunPhase::Running.can_advance_to(RunPhase::Completed));
        assert!(RunPhase::Merging.can_advance_to(RunPhase::Completed));
        assert!(!RunPhase::Completed.can_advance_to(RunPhase::Failed));
    }
}
