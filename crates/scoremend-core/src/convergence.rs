//! Bounded re-evaluation convergence loop and the per-pair run guard.
//!
//! Drives a (scorecard, entity) pair from stale to freshly evaluated:
//! trigger a re-evaluation, then poll next-steps at a fixed interval until
//! the outstanding-rule count reaches zero or the attempt budget runs out.
//! Only absence of convergence is retried; hard transport/upstream errors
//! terminate the run as `Failed`. At most one run may be active per pair at
//! any instant, and terminal states always release the pair's slot, so an
//! exhausted attempt budget never blocks future runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ScoreApi;
use crate::domain::error::{Result, ScoremendError};
use crate::domain::model::{outstanding_rules, NextStepGroup};
use crate::domain::run::{RunState, RunStatus};

/// Poll bounds. Interval and attempt budget are policy, not protocol.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(1500),
        }
    }
}

// ---------------------------------------------------------------------------
// Run guard
// ---------------------------------------------------------------------------

/// Membership set of active (scorecard, entity) runs. Cloning shares the
/// underlying set; the orchestrator and the loop hold the same guard.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    active: Arc<Mutex<HashSet<(String, String)>>>,
}

/// RAII hold on one pair's run slot; released on drop.
#[derive(Debug)]
pub struct ActiveSlot {
    guard: RunGuard,
    key: (String, String),
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.guard
            .active
            .lock()
            .expect("active-run set lock poisoned")
            .remove(&self.key);
    }
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for a pair, failing fast if a run is already active.
    pub fn acquire(&self, scorecard_tag: &str, entity_tag: &str) -> Result<ActiveSlot> {
        let key = (scorecard_tag.to_string(), entity_tag.to_string());
        let mut active = self.active.lock().expect("active-run set lock poisoned");
        if !active.insert(key.clone()) {
            return Err(ScoremendError::ConcurrentRun {
                scorecard_tag: scorecard_tag.to_string(),
                entity_tag: entity_tag.to_string(),
            });
        }
        Ok(ActiveSlot {
            guard: self.clone(),
            key,
        })
    }

    pub fn is_active(&self, scorecard_tag: &str, entity_tag: &str) -> bool {
        self.active
            .lock()
            .expect("active-run set lock poisoned")
            .contains(&(scorecard_tag.to_string(), entity_tag.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Convergence loop
// ---------------------------------------------------------------------------

/// Final observed state of one re-evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct ConvergenceReport {
    pub run_id: Uuid,
    /// Terminal status: `Succeeded`, `Failed`, or `TimedOut`.
    pub status: RunStatus,
    /// Poll attempts performed.
    pub attempts: u32,
    /// Last observed next-steps groups; a timeout is not a data-loss event.
    pub final_next_steps: Vec<NextStepGroup>,
    pub last_error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Owns run-state transitions for (scorecard, entity) pairs.
pub struct ConvergenceLoop {
    guard: RunGuard,
}

impl ConvergenceLoop {
    pub fn new(guard: RunGuard) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Trigger a re-evaluation and poll until convergence or the attempt
    /// budget is exhausted. `ConcurrentRun` is the only error returned;
    /// failed and timed-out runs are reported in the result, not thrown.
    pub async fn run(
        &self,
        api: &dyn ScoreApi,
        scorecard_tag: &str,
        entity_tag: &str,
        policy: &PollPolicy,
    ) -> Result<ConvergenceReport> {
        let _slot = self.guard.acquire(scorecard_tag, entity_tag)?;
        let run_id = Uuid::new_v4();
        let mut state = RunState::new(entity_tag, scorecard_tag);

        state.transition(RunStatus::Triggering);
        info!(
            "Run {}: triggering evaluation of {} for {}",
            run_id, scorecard_tag, entity_tag
        );
        if let Err(e) = api.trigger_evaluation(scorecard_tag, entity_tag).await {
            warn!("Run {}: trigger failed: {}", run_id, e);
            state.fail(e.to_string());
            return Ok(report(run_id, state, Vec::new()));
        }

        state.transition(RunStatus::Polling);
        let mut last_groups: Vec<NextStepGroup> = Vec::new();

        for attempt in 1..=policy.max_attempts {
            state.record_attempt(attempt);
            match api.fetch_next_steps(scorecard_tag, entity_tag).await {
                Ok(groups) => {
                    let remaining = outstanding_rules(&groups);
                    last_groups = groups;
                    debug!(
                        "Run {}: poll {}/{}, {} rule(s) outstanding",
                        run_id, attempt, policy.max_attempts, remaining
                    );
                    if remaining == 0 {
                        state.transition(RunStatus::Succeeded);
                        info!("Run {}: converged after {} poll(s)", run_id, attempt);
                        return Ok(report(run_id, state, last_groups));
                    }
                }
                Err(e) => {
                    warn!("Run {}: poll {} failed: {}", run_id, attempt, e);
                    state.fail(e.to_string());
                    return Ok(report(run_id, state, last_groups));
                }
            }
            tokio::time::sleep(policy.interval).await;
        }

        // Attempt budget exhausted: one final fetch, then TimedOut
        // regardless of its result. The last observed state still reaches
        // the caller.
        if let Ok(groups) = api.fetch_next_steps(scorecard_tag, entity_tag).await {
            last_groups = groups;
        }
        state.transition(RunStatus::TimedOut);
        warn!(
            "Run {}: no convergence after {} attempt(s), {} rule(s) still outstanding",
            run_id,
            policy.max_attempts,
            outstanding_rules(&last_groups)
        );
        Ok(report(run_id, state, last_groups))
    }
}

fn report(run_id: Uuid, state: RunState, final_next_steps: Vec<NextStepGroup>) -> ConvergenceReport {
    ConvergenceReport {
        run_id,
        status: state.status,
        attempts: state.attempt,
        final_next_steps,
        last_error: state.last_error,
        finished_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_rejects_second_acquire() {
        let guard = RunGuard::new();
        let slot = guard
            .acquire("prod-readiness", "service:payments-api")
            .unwrap();
        assert!(guard.is_active("prod-readiness", "service:payments-api"));

        let err = guard
            .acquire("prod-readiness", "service:payments-api")
            .unwrap_err();
        assert!(matches!(err, ScoremendError::ConcurrentRun { .. }));

        // A different pair is unaffected.
        assert!(guard.acquire("prod-readiness", "service:other").is_ok());

        drop(slot);
        assert!(!guard.is_active("prod-readiness", "service:payments-api"));
        assert!(guard.acquire("prod-readiness", "service:payments-api").is_ok());
    }

    #[test]
    fn test_guard_clones_share_the_set() {
        let guard = RunGuard::new();
        let clone = guard.clone();
        let _slot = guard.acquire("sc", "e").unwrap();
        assert!(clone.is_active("sc", "e"));
        assert!(clone.acquire("sc", "e").is_err());
    }

    #[test]
    fn test_poll_policy_defaults() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.interval, Duration::from_millis(1500));
    }
}
