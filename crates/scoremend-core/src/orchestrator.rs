//! Top-level remediation orchestrator.
//!
//! The entry point a consumer uses to (a) aggregate an entity's scorecard
//! compliance and (b) act on a specific failing or outstanding rule. Inside
//! `remediate` the steps are strictly sequential: the action always runs
//! before the evaluation trigger, which always precedes polling. The only
//! mutable shared state is the active-run set held by the run guard.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::{ActionRegistry, RemediationAction};
use crate::client::ScoreApi;
use crate::convergence::{ConvergenceLoop, PollPolicy, RunGuard};
use crate::domain::error::{Result, ScoremendError};
use crate::domain::model::{EntityRef, EntityScore, NextStepGroup, ScorecardSummary};
use crate::domain::run::RunStatus;

/// Aggregated compliance state of one entity across its scorecards.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceView {
    /// Applicable scorecards, in the order returned by the remote API.
    pub scorecards: Vec<ScorecardSummary>,
    /// Scores keyed by scorecard tag; scorecards with no resolvable score
    /// are absent here and listed in `unscored`.
    pub scores: BTreeMap<String, EntityScore>,
    /// Scorecard tags with no resolvable score, in list order.
    pub unscored: Vec<String>,
}

impl ComplianceView {
    /// True when any resolved score has a failing rule.
    pub fn has_failures(&self) -> bool {
        self.scores.values().any(EntityScore::has_failures)
    }
}

/// Result of one remediation request.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationOutcome {
    pub run_id: Uuid,
    /// Terminal status of the convergence run.
    pub status: RunStatus,
    /// Last observed next-steps groups.
    pub final_next_steps: Vec<NextStepGroup>,
    /// Reference produced by a manual action, for presentation to a human.
    pub manual_reference: Option<String>,
    /// Ordered human-readable progress notices; advisory only.
    pub notices: Vec<String>,
    pub last_error: Option<String>,
}

/// Coordinates the score client, the action registry, and the convergence
/// loop for a single entity session.
pub struct RemediationOrchestrator {
    api: Arc<dyn ScoreApi>,
    registry: ActionRegistry,
    convergence: ConvergenceLoop,
    guard: RunGuard,
    policy: PollPolicy,
}

impl RemediationOrchestrator {
    pub fn new(api: Arc<dyn ScoreApi>, registry: ActionRegistry) -> Self {
        let guard = RunGuard::new();
        Self {
            api,
            registry,
            convergence: ConvergenceLoop::new(guard.clone()),
            guard,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Aggregate the entity's scorecards and their scores. Score fetches
    /// fan out concurrently; assembly follows scorecard list order, and a
    /// single failed or missing score never fails the whole view.
    pub async fn compliance_view(&self, entity: &EntityRef) -> Result<ComplianceView> {
        let scorecards = self.api.list_scorecards(&entity.tag).await?;
        debug!(
            "{} scorecard(s) apply to {}",
            scorecards.len(),
            entity.tag
        );

        let fetches = scorecards.iter().map(|sc| {
            let api = Arc::clone(&self.api);
            let scorecard_tag = sc.tag.clone();
            let entity_tag = entity.tag.clone();
            async move { api.fetch_score(&scorecard_tag, &entity_tag).await }
        });
        let results = future::join_all(fetches).await;

        let mut scores = BTreeMap::new();
        let mut unscored = Vec::new();
        for (sc, result) in scorecards.iter().zip(results) {
            match result {
                Ok(Some(score)) => {
                    scores.insert(sc.tag.clone(), score);
                }
                Ok(None) => {
                    unscored.push(sc.tag.clone());
                }
                Err(e) => {
                    warn!("Score fetch for {} failed, omitting: {}", sc.tag, e);
                    unscored.push(sc.tag.clone());
                }
            }
        }

        Ok(ComplianceView {
            scorecards,
            scores,
            unscored,
        })
    }

    /// Remediate one rule: run its registered action (if any), then trigger
    /// a re-evaluation and poll it to a terminal state. An automated
    /// action's failure aborts the call before any evaluation is triggered;
    /// a manual action only cues a human and does not block.
    pub async fn remediate(
        &self,
        rule_title: &str,
        scorecard_tag: &str,
        entity: &EntityRef,
    ) -> Result<RemediationOutcome> {
        if self.guard.is_active(scorecard_tag, &entity.tag) {
            return Err(ScoremendError::ConcurrentRun {
                scorecard_tag: scorecard_tag.to_string(),
                entity_tag: entity.tag.clone(),
            });
        }

        let mut notices = Vec::new();
        let mut manual_reference = None;

        match self.registry.lookup(scorecard_tag, rule_title) {
            Some(RemediationAction::Automated(action)) => {
                let action = Arc::clone(action);
                notices.push(format!("applying {}", action.describe()));
                info!("Remediating '{}': {}", rule_title, action.describe());
                // Re-evaluating against an unapplied fix is pointless, so a
                // failed action aborts before anything is triggered.
                action.apply().await?;
                notices.push("remediation applied".to_string());
            }
            Some(RemediationAction::Manual {
                reference,
                instructions,
            }) => {
                manual_reference = Some(reference.clone());
                notices.push(match instructions {
                    Some(text) => format!("manual step required: {text} ({reference})"),
                    None => format!("manual step required: {reference}"),
                });
            }
            None => {
                notices.push(format!(
                    "no remediation action registered for '{}'; re-evaluating as-is",
                    rule_title.trim()
                ));
            }
        }

        notices.push("triggering evaluation".to_string());
        notices.push("refreshing next steps".to_string());
        let report = self
            .convergence
            .run(self.api.as_ref(), scorecard_tag, &entity.tag, &self.policy)
            .await?;

        notices.push(match report.status {
            RunStatus::Succeeded => "done".to_string(),
            RunStatus::TimedOut => "timed out waiting for convergence".to_string(),
            _ => "evaluation failed".to_string(),
        });

        Ok(RemediationOutcome {
            run_id: report.run_id,
            status: report.status,
            final_next_steps: report.final_next_steps,
            manual_reference,
            notices,
            last_error: report.last_error,
        })
    }

    /// Plain re-evaluation: trigger, then a single score refresh. No
    /// convergence loop, so this never holds the pair's run slot.
    pub async fn re_evaluate(
        &self,
        scorecard_tag: &str,
        entity: &EntityRef,
    ) -> Result<Option<EntityScore>> {
        self.api
            .trigger_evaluation(scorecard_tag, &entity.tag)
            .await?;
        self.api.fetch_score(scorecard_tag, &entity.tag).await
    }
}
