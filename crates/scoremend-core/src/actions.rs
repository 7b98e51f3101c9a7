//! Remediation action registry and shipped actions.
//!
//! Actions are registered under a composite key of scorecard tag plus
//! normalized rule title (the upstream API does not reliably supply stable
//! rule identifiers). A lookup miss is not an error: it means no automated
//! remediation exists for that rule, and it is logged so renamed rules do
//! not silently lose their actions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::error::{Result, ScoremendError};

/// Trim + ASCII-lowercase; the practical identity of a rule title.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_ascii_lowercase()
}

/// An automated remediation: an async side effect against an external system.
#[async_trait]
pub trait AutomatedAction: Send + Sync {
    /// Short human-readable description, used in progress notices and logs.
    fn describe(&self) -> String;

    /// Perform the side effect. Any failure surfaces as an action error.
    async fn apply(&self) -> Result<()>;
}

/// A remediation bound to one rule.
#[derive(Clone)]
pub enum RemediationAction {
    /// Performs an external side effect; may fail.
    Automated(Arc<dyn AutomatedAction>),
    /// Surfaces a reference (e.g. a runbook URL) for a human; never fails.
    Manual {
        reference: String,
        instructions: Option<String>,
    },
}

impl std::fmt::Debug for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationAction::Automated(action) => {
                f.debug_tuple("Automated").field(&action.describe()).finish()
            }
            RemediationAction::Manual { reference, .. } => {
                f.debug_tuple("Manual").field(reference).finish()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ActionKey {
    scorecard_tag: String,
    rule_title: String,
}

impl ActionKey {
    fn new(scorecard_tag: &str, rule_title: &str) -> Self {
        Self {
            scorecard_tag: scorecard_tag.trim().to_string(),
            rule_title: normalize_title(rule_title),
        }
    }
}

/// Maps (scorecard, rule title) to zero-or-one remediation action.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionKey, RemediationAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scorecard_tag: &str, rule_title: &str, action: RemediationAction) {
        self.actions
            .insert(ActionKey::new(scorecard_tag, rule_title), action);
    }

    pub fn register_automated(
        &mut self,
        scorecard_tag: &str,
        rule_title: &str,
        action: Arc<dyn AutomatedAction>,
    ) {
        self.register(scorecard_tag, rule_title, RemediationAction::Automated(action));
    }

    pub fn register_manual(
        &mut self,
        scorecard_tag: &str,
        rule_title: &str,
        reference: impl Into<String>,
        instructions: Option<String>,
    ) {
        self.register(
            scorecard_tag,
            rule_title,
            RemediationAction::Manual {
                reference: reference.into(),
                instructions,
            },
        );
    }

    /// Resolve a rule to its action. `None` means "no automated remediation
    /// exists for this rule" and is surfaced distinctly from failures.
    pub fn lookup(&self, scorecard_tag: &str, rule_title: &str) -> Option<&RemediationAction> {
        let action = self.actions.get(&ActionKey::new(scorecard_tag, rule_title));
        if action.is_none() {
            warn!(
                "No remediation action registered for rule '{}' on scorecard '{}'",
                rule_title.trim(),
                scorecard_tag
            );
        }
        action
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Branch protection action
// ---------------------------------------------------------------------------

/// Source-control provider configuration for the branch protection action.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API base URL, without a trailing slash.
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Bearer credential supplied by the host environment.
    pub token: Option<String>,
}

impl GithubConfig {
    pub fn new(owner: &str, repo: &str, branch: &str) -> Self {
        GithubConfig {
            api_base: std::env::var("SCOREMEND_GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// Enforces the fixed branch-protection policy on a repository branch.
pub struct BranchProtectionAction {
    config: GithubConfig,
    http: reqwest::Client,
}

impl BranchProtectionAction {
    pub fn new(config: GithubConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scoremend/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        BranchProtectionAction { config, http }
    }

    /// The policy body applied verbatim: one required approving review,
    /// stale reviews dismissed, linear history required, force pushes and
    /// deletions disallowed.
    pub fn protection_policy() -> serde_json::Value {
        json!({
            "enforce_admins": true,
            "required_pull_request_reviews": {
                "required_approving_review_count": 1,
                "dismiss_stale_reviews": true,
                "require_code_owner_reviews": false,
            },
            "required_conversation_resolution": true,
            "required_linear_history": true,
            "allow_force_pushes": false,
            "allow_deletions": false,
        })
    }
}

#[async_trait]
impl AutomatedAction for BranchProtectionAction {
    fn describe(&self) -> String {
        format!(
            "branch protection for {}/{}@{}",
            self.config.owner, self.config.repo, self.config.branch
        )
    }

    async fn apply(&self) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}/protection",
            self.config.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.config.owner),
            urlencoding::encode(&self.config.repo),
            urlencoding::encode(&self.config.branch)
        );

        info!("Applying {}", self.describe());

        let mut req = self
            .http
            .put(&url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&Self::protection_policy());
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token);
        }

        let res = req.send().await.map_err(|e| ScoremendError::Action {
            cause: format!("branch protection request failed: {e}"),
        })?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ScoremendError::Action {
                cause: format!("branch protection returned {status}: {body}"),
            });
        }

        Ok(())
    }
}
