//! End-to-end orchestrator behavior against the fake scorecard API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use scoremend_core::actions::{ActionRegistry, AutomatedAction};
use scoremend_core::convergence::PollPolicy;
use scoremend_core::domain::error::{Result, ScoremendError};
use scoremend_core::domain::model::{
    outstanding_rules, EntityRef, EntityScore, NextStepGroup, OverallScore, RuleResult,
    RuleStatus, RuleToComplete, ScorecardSummary,
};
use scoremend_core::domain::run::RunStatus;
use scoremend_core::fakes::FakeScoreApi;
use scoremend_core::orchestrator::RemediationOrchestrator;
use scoremend_core::ScoreApi;

struct RecordingAction {
    applied: Arc<AtomicUsize>,
}

#[async_trait]
impl AutomatedAction for RecordingAction {
    fn describe(&self) -> String {
        "branch protection for ftvc-org/sample-java-ab@main".to_string()
    }

    async fn apply(&self) -> Result<()> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RefusingAction;

#[async_trait]
impl AutomatedAction for RefusingAction {
    fn describe(&self) -> String {
        "branch protection".to_string()
    }

    async fn apply(&self) -> Result<()> {
        Err(ScoremendError::Action {
            cause: "provider returned 403".to_string(),
        })
    }
}

fn entity() -> EntityRef {
    EntityRef::new("service:payments-api").unwrap()
}

fn scorecard(tag: &str) -> ScorecardSummary {
    ScorecardSummary {
        tag: tag.to_string(),
        name: tag.to_string(),
        rules: Vec::new(),
    }
}

fn failing_score(scorecard_tag: &str, rule_title: &str) -> EntityScore {
    EntityScore {
        entity_tag: "service:payments-api".to_string(),
        scorecard_tag: scorecard_tag.to_string(),
        overall: OverallScore::default(),
        rules: vec![RuleResult {
            title: Some(rule_title.to_string()),
            status: RuleStatus::Fail,
            ..Default::default()
        }],
    }
}

fn outstanding(count: usize) -> Vec<NextStepGroup> {
    vec![NextStepGroup {
        rules_to_complete: (0..count)
            .map(|i| RuleToComplete {
                identifier: format!("rule-{i}"),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }]
}

#[tokio::test]
async fn test_view_with_zero_scorecards_is_empty_not_error() {
    let fake = Arc::new(FakeScoreApi::new());
    let orchestrator = RemediationOrchestrator::new(fake, ActionRegistry::new());

    let view = orchestrator.compliance_view(&entity()).await.unwrap();
    assert!(view.scorecards.is_empty());
    assert!(view.scores.is_empty());
    assert!(view.unscored.is_empty());
    assert!(!view.has_failures());
}

#[tokio::test]
async fn test_view_omits_unresolvable_scores_without_failing() {
    let fake = Arc::new(FakeScoreApi::new());
    fake.set_scorecards(vec![
        scorecard("prod-readiness"),
        scorecard("code-quality"),
        scorecard("ops-maturity"),
    ]);
    fake.insert_score(failing_score("prod-readiness", "Branch Protection"));
    fake.fail_score("code-quality");
    // ops-maturity simply has no score yet.

    let orchestrator = RemediationOrchestrator::new(fake, ActionRegistry::new());
    let view = orchestrator.compliance_view(&entity()).await.unwrap();

    assert_eq!(view.scorecards.len(), 3);
    assert_eq!(view.scores.len(), 1);
    assert!(view.scores.contains_key("prod-readiness"));
    // Unscored keeps scorecard list order.
    assert_eq!(view.unscored, vec!["code-quality", "ops-maturity"]);
    assert!(view.has_failures());
}

#[tokio::test(start_paused = true)]
async fn test_remediate_runs_action_then_converges() {
    let fake = Arc::new(FakeScoreApi::new());
    fake.set_scorecards(vec![scorecard("prod-readiness")]);
    fake.insert_score(failing_score("prod-readiness", "Branch Protection"));
    // First poll already observes zero outstanding rules.
    fake.push_next_steps(vec![NextStepGroup::default()]);

    let applied = Arc::new(AtomicUsize::new(0));
    let mut registry = ActionRegistry::new();
    registry.register_automated(
        "prod-readiness",
        "Branch Protection",
        Arc::new(RecordingAction {
            applied: Arc::clone(&applied),
        }),
    );

    let orchestrator = RemediationOrchestrator::new(fake.clone(),registry);
    let outcome = orchestrator
        .remediate("Branch Protection", "prod-readiness", &entity())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(applied.load(Ordering::SeqCst), 1);
    assert_eq!(fake.trigger_calls(), 1);
    assert_eq!(fake.next_steps_calls(), 1);
    assert_eq!(outstanding_rules(&outcome.final_next_steps), 0);
    assert!(outcome.manual_reference.is_none());

    // Progress notices arrive in order, from action to completion.
    assert!(outcome.notices.first().unwrap().starts_with("applying"));
    assert_eq!(outcome.notices.last().unwrap(), "done");
}

#[tokio::test]
async fn test_failed_action_aborts_before_any_trigger() {
    let fake = Arc::new(FakeScoreApi::new());
    let mut registry = ActionRegistry::new();
    registry.register_automated("prod-readiness", "Branch Protection", Arc::new(RefusingAction));

    let orchestrator = RemediationOrchestrator::new(fake.clone(),registry);
    let err = orchestrator
        .remediate("Branch Protection", "prod-readiness", &entity())
        .await
        .unwrap_err();

    assert!(matches!(err, ScoremendError::Action { .. }));
    // Re-evaluating against an unapplied fix is pointless.
    assert_eq!(fake.trigger_calls(), 0);
    assert_eq!(fake.next_steps_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_action_surfaces_reference_and_continues() {
    let fake = Arc::new(FakeScoreApi::new());
    fake.push_next_steps(Vec::new());

    let mut registry = ActionRegistry::new();
    registry.register_manual(
        "code-quality",
        "Add .fmk file",
        "https://runbooks.example.com/fmk",
        None,
    );

    let orchestrator = RemediationOrchestrator::new(fake.clone(),registry);
    let outcome = orchestrator
        .remediate("Add .fmk file", "code-quality", &entity())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(
        outcome.manual_reference.as_deref(),
        Some("https://runbooks.example.com/fmk")
    );
    // The manual cue does not block the evaluation.
    assert_eq!(fake.trigger_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_rule_still_reevaluates() {
    let fake = Arc::new(FakeScoreApi::new());
    fake.push_next_steps(Vec::new());

    let orchestrator = RemediationOrchestrator::new(fake.clone(), ActionRegistry::new());
    let outcome = orchestrator
        .remediate("Mystery Rule", "prod-readiness", &entity())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert!(outcome.notices[0].contains("no remediation action registered"));
    assert_eq!(fake.trigger_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_remediate_rejected_until_terminal() {
    let fake = Arc::new(FakeScoreApi::new());
    // Never converges.
    fake.push_next_steps(outstanding(1));

    let orchestrator = Arc::new(
        RemediationOrchestrator::new(fake.clone(), ActionRegistry::new()).with_policy(
            PollPolicy {
                max_attempts: 2,
                ..Default::default()
            },
        ),
    );

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .remediate("Branch Protection", "prod-readiness", &entity())
                .await
        })
    };
    tokio::task::yield_now().await;

    // Second call for the same pair fails immediately while the first is
    // still active.
    let err = orchestrator
        .remediate("Branch Protection", "prod-readiness", &entity())
        .await
        .unwrap_err();
    assert!(matches!(err, ScoremendError::ConcurrentRun { .. }));

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.status, RunStatus::TimedOut);
    assert_eq!(outstanding_rules(&outcome.final_next_steps), 1);

    // After the terminal state a new run is accepted.
    let outcome = orchestrator
        .remediate("Branch Protection", "prod-readiness", &entity())
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::TimedOut);
}

#[tokio::test]
async fn test_next_steps_reads_are_idempotent() {
    let fake = Arc::new(FakeScoreApi::new());
    fake.push_next_steps(outstanding(2));

    let first = fake.fetch_next_steps("prod-readiness", "service:payments-api").await.unwrap();
    let second = fake.fetch_next_steps("prod-readiness", "service:payments-api").await.unwrap();
    assert_eq!(outstanding_rules(&first), outstanding_rules(&second));
}

#[tokio::test]
async fn test_re_evaluate_triggers_and_refreshes() {
    let fake = Arc::new(FakeScoreApi::new());
    fake.insert_score(failing_score("prod-readiness", "Branch Protection"));

    let orchestrator = RemediationOrchestrator::new(fake.clone(), ActionRegistry::new());

    // Back-to-back triggers never surface an error (the client already
    // treats a remote 409 as success).
    let score = orchestrator.re_evaluate("prod-readiness", &entity()).await.unwrap();
    assert!(score.unwrap().has_failures());
    let score = orchestrator.re_evaluate("prod-readiness", &entity()).await.unwrap();
    assert!(score.is_some());
    assert_eq!(fake.trigger_calls(), 2);

    // A scorecard with no score yet refreshes to None, not an error.
    let none = orchestrator.re_evaluate("ops-maturity", &entity()).await.unwrap();
    assert!(none.is_none());
}
