//! Per-pair run state for re-evaluation runs.
//!
//! Transitions are owned exclusively by the convergence loop:
//! `Idle -> Triggering -> Polling -> {Succeeded | Failed | TimedOut}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of one re-evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Triggering,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl RunStatus {
    /// Active states hold the per-pair run slot.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Triggering | RunStatus::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::TimedOut
        )
    }
}

/// Mutable state of a single run for one (entity, scorecard) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub entity_tag: String,
    pub scorecard_tag: String,
    pub status: RunStatus,
    pub attempt: u32,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(entity_tag: impl Into<String>, scorecard_tag: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entity_tag: entity_tag.into(),
            scorecard_tag: scorecard_tag.into(),
            status: RunStatus::Idle,
            attempt: 0,
            last_error: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn record_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.transition(RunStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_terminal_partition() {
        assert!(RunStatus::Triggering.is_active());
        assert!(RunStatus::Polling.is_active());
        assert!(!RunStatus::Idle.is_active());

        for status in [RunStatus::Succeeded, RunStatus::Failed, RunStatus::TimedOut] {
            assert!(status.is_terminal());
            assert!(!status.is_active());
        }
    }

    #[test]
    fn test_run_state_transitions() {
        let mut state = RunState::new("service:payments-api", "prod-readiness");
        assert_eq!(state.status, RunStatus::Idle);

        state.transition(RunStatus::Triggering);
        state.transition(RunStatus::Polling);
        state.record_attempt(2);
        assert_eq!(state.attempt, 2);

        state.fail("upstream error 500: boom");
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.last_error.as_deref().unwrap().contains("500"));
    }
}
