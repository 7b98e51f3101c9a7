//! Domain model, error taxonomy, and run-state types.

pub mod error;
pub mod model;
pub mod run;

pub use error::{Result, ScoremendError};
pub use model::{
    outstanding_rules, EntityRef, EntityScore, NextStepGroup, NextStepsView, OverallScore,
    RuleDefinition, RuleResult, RuleStatus, RuleToComplete, ScoreLevel, ScorecardSummary,
};
pub use run::{RunState, RunStatus};
