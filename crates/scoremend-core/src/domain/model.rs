//! Normalized scorecard domain model.
//!
//! The remote API exposes several historical wire shapes for the same
//! logical resources; everything in this module is the post-normalization
//! form. `ScorecardSummary.tag` and `EntityScore.scorecard_tag` are equal
//! for the same scorecard once normalized.

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, ScoremendError};

/// The entity currently selected in the host, passed explicitly into every
/// operation. Immutable for the duration of a session; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Stable unique identifier, e.g. `service:payments-api`.
    pub tag: String,
    pub kind: Option<String>,
    pub display_name: Option<String>,
}

impl EntityRef {
    /// Create an entity reference. The tag is required and must be non-blank.
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(ScoremendError::InvalidEntityTag(
                "entity tag must not be empty".to_string(),
            ));
        }
        Ok(Self {
            tag,
            kind: None,
            display_name: None,
        })
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Human-facing label: display name when present, tag otherwise.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.tag)
    }
}

/// One policy check within a scorecard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleDefinition {
    pub title: String,
    pub level: Option<String>,
    pub expression: Option<String>,
    pub weight: Option<f64>,
    pub failure_message: Option<String>,
}

/// A scorecard applicable to an entity, as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorecardSummary {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// Evaluation outcome of one rule against one entity. Closed enumeration:
/// unrecognized upstream strings normalize to `NotEvaluated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Pass,
    Fail,
    #[default]
    NotEvaluated,
}

impl RuleStatus {
    /// Case-insensitive parse; anything outside the closed set maps to
    /// `NotEvaluated`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASS" => RuleStatus::Pass,
            "FAIL" => RuleStatus::Fail,
            _ => RuleStatus::NotEvaluated,
        }
    }
}

/// One rule's evaluated result within an entity score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleResult {
    pub title: Option<String>,
    pub id: Option<String>,
    pub status: RuleStatus,
    pub level: Option<String>,
    pub failure_message: Option<String>,
}

/// Aggregate score for the whole scorecard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallScore {
    pub level: Option<String>,
    pub points: Option<f64>,
}

/// The evaluated score of one scorecard for one entity. Exactly one exists
/// per (entity, scorecard) pair; superseded in place on refetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityScore {
    pub entity_tag: String,
    pub scorecard_tag: String,
    #[serde(default)]
    pub overall: OverallScore,
    #[serde(default)]
    pub rules: Vec<RuleResult>,
}

impl EntityScore {
    pub fn failing_rules(&self) -> impl Iterator<Item = &RuleResult> {
        self.rules.iter().filter(|r| r.status == RuleStatus::Fail)
    }

    pub fn has_failures(&self) -> bool {
        self.failing_rules().next().is_some()
    }
}

/// A maturity level as reported by the next-steps endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreLevel {
    pub name: String,
    pub number: i64,
}

/// An outstanding rule blocking the next maturity level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleToComplete {
    pub identifier: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub expression: Option<String>,
}

impl RuleToComplete {
    /// Human-facing label, preferring the title over the identifier.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.identifier)
    }
}

/// Outstanding work to reach the next maturity level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextStepGroup {
    pub current_level: Option<ScoreLevel>,
    pub next_level: Option<ScoreLevel>,
    pub rules_to_complete: Vec<RuleToComplete>,
}

/// Total outstanding-rule count across all groups; the convergence signal.
pub fn outstanding_rules(groups: &[NextStepGroup]) -> usize {
    groups.iter().map(|g| g.rules_to_complete.len()).sum()
}

/// Flattened presentation view over a next-steps response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NextStepsView {
    pub rules_to_complete: Vec<RuleToComplete>,
    pub current_level: Option<ScoreLevel>,
    pub next_level: Option<ScoreLevel>,
}

impl NextStepsView {
    pub fn from_groups(groups: &[NextStepGroup]) -> Self {
        Self {
            rules_to_complete: groups
                .iter()
                .flat_map(|g| g.rules_to_complete.iter().cloned())
                .collect(),
            current_level: groups.first().and_then(|g| g.current_level.clone()),
            next_level: groups.first().and_then(|g| g.next_level.clone()),
        }
    }

    /// True when every level has been reached (no outstanding rules).
    pub fn completed(&self) -> bool {
        self.rules_to_complete.is_empty()
    }
}
