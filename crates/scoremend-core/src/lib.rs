//! Scoremend Core Library
//!
//! Scorecard remediation orchestration: discovers the compliance scorecards
//! that apply to an entity, normalizes their rule-evaluation results,
//! dispatches rule-specific remediation actions, and drives asynchronous
//! re-evaluations to a terminal state through a bounded convergence loop.

pub mod actions;
pub mod client;
pub mod convergence;
pub mod domain;
pub mod fakes;
pub mod orchestrator;
pub mod telemetry;

pub use actions::{
    normalize_title, ActionRegistry, AutomatedAction, BranchProtectionAction, GithubConfig,
    RemediationAction,
};

pub use client::{HttpScoreClient, ScoreApi, ScoreApiConfig};

pub use convergence::{ActiveSlot, ConvergenceLoop, ConvergenceReport, PollPolicy, RunGuard};

pub use domain::{
    outstanding_rules, EntityRef, EntityScore, NextStepGroup, NextStepsView, OverallScore, Result,
    RuleDefinition, RuleResult, RuleStatus, RuleToComplete, RunState, RunStatus, ScoreLevel,
    ScorecardSummary, ScoremendError,
};

pub use orchestrator::{ComplianceView, RemediationOrchestrator, RemediationOutcome};

pub use telemetry::init_tracing;

/// Scoremend version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
