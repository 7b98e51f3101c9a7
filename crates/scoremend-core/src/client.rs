//! Typed access to the scorecard API.
//!
//! `ScoreApi` is the async seam the orchestrator and the convergence loop
//! depend on; `HttpScoreClient` is the reqwest-backed implementation. The
//! remote API has historically exposed two response conventions for the same
//! logical resources, so every read goes through a normalization function
//! that collapses both shapes into the internal model. The client performs
//! no retries and keeps no cache.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::error::{Result, ScoremendError};
use crate::domain::model::{
    EntityScore, NextStepGroup, OverallScore, RuleResult, RuleStatus, ScorecardSummary,
};

/// Async interface to the scorecard service.
#[async_trait]
pub trait ScoreApi: Send + Sync {
    /// Scorecards whose applicability includes the entity, in remote order.
    async fn list_scorecards(&self, entity_tag: &str) -> Result<Vec<ScorecardSummary>>;

    /// Current evaluated score for (scorecard, entity); `None` when the
    /// scorecard has not been evaluated for the entity.
    async fn fetch_score(
        &self,
        scorecard_tag: &str,
        entity_tag: &str,
    ) -> Result<Option<EntityScore>>;

    /// Ask the remote to re-evaluate the entity now. A remote 409 means an
    /// evaluation is already in flight and counts as success.
    async fn trigger_evaluation(&self, scorecard_tag: &str, entity_tag: &str) -> Result<()>;

    /// Outstanding rules per maturity level. Reading has no side effects.
    async fn fetch_next_steps(
        &self,
        scorecard_tag: &str,
        entity_tag: &str,
    ) -> Result<Vec<NextStepGroup>>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scorecard API endpoint configuration.
#[derive(Debug, Clone)]
pub struct ScoreApiConfig {
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Bearer credential supplied by the host environment.
    pub token: Option<String>,
}

impl Default for ScoreApiConfig {
    fn default() -> Self {
        ScoreApiConfig {
            base_url: std::env::var("SCOREMEND_API_BASE")
                .unwrap_or_else(|_| "https://api.getcortexapp.com".to_string()),
            token: std::env::var("SCOREMEND_API_TOKEN").ok(),
        }
    }
}

impl ScoreApiConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str) -> Self {
        ScoreApiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Reqwest-backed `ScoreApi` implementation.
pub struct HttpScoreClient {
    config: ScoreApiConfig,
    http: reqwest::Client,
}

impl HttpScoreClient {
    pub fn new(config: ScoreApiConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scoremend/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        HttpScoreClient { config, http }
    }

    pub fn from_env() -> Self {
        Self::new(ScoreApiConfig::from_env())
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| ScoremendError::Network(e.to_string()))
    }
}

async fn read_body(res: reqwest::Response) -> String {
    res.text().await.unwrap_or_default()
}

#[async_trait]
impl ScoreApi for HttpScoreClient {
    async fn list_scorecards(&self, entity_tag: &str) -> Result<Vec<ScorecardSummary>> {
        let url = format!(
            "{}/api/v1/scorecards?entities={}&page=0&pageSize=1000",
            self.config.base_url,
            urlencoding::encode(entity_tag)
        );
        let res = self.get(&url).await?;
        if !res.status().is_success() {
            return Err(ScoremendError::Upstream {
                status: res.status().as_u16(),
                body: read_body(res).await,
            });
        }
        let body: Value = res
            .json()
            .await
            .map_err(|e| ScoremendError::Network(e.to_string()))?;
        Ok(normalize_scorecard_list(&body))
    }

    async fn fetch_score(
        &self,
        scorecard_tag: &str,
        entity_tag: &str,
    ) -> Result<Option<EntityScore>> {
        // Primary shape: per-entity scores resource.
        let primary = format!(
            "{}/api/v1/scorecards/{}/entity/{}/scores",
            self.config.base_url,
            urlencoding::encode(scorecard_tag),
            urlencoding::encode(entity_tag)
        );
        let res = self.get(&primary).await?;
        if res.status().is_success() {
            let body: Value = res
                .json()
                .await
                .map_err(|e| ScoremendError::Network(e.to_string()))?;
            return Ok(Some(normalize_entity_score(scorecard_tag, entity_tag, &body)));
        }
        debug!(
            "Primary score endpoint returned {} for {}/{}, trying fallback shape",
            res.status(),
            scorecard_tag,
            entity_tag
        );

        // Fallback shape: filtered collection, first element wins.
        let fallback = format!(
            "{}/api/v1/scorecards/{}/scores?entities={}",
            self.config.base_url,
            urlencoding::encode(scorecard_tag),
            urlencoding::encode(entity_tag)
        );
        let res = self.get(&fallback).await?;
        if res.status().is_success() {
            let body: Value = res
                .json()
                .await
                .map_err(|e| ScoremendError::Network(e.to_string()))?;
            if let Some(first) = extract_first_score(&body) {
                return Ok(Some(normalize_entity_score(scorecard_tag, entity_tag, first)));
            }
        }

        // Neither shape produced a score: the scorecard has not been
        // evaluated for this entity.
        Ok(None)
    }

    async fn trigger_evaluation(&self, scorecard_tag: &str, entity_tag: &str) -> Result<()> {
        let url = format!(
            "{}/api/v1/scorecards/{}/entity/{}/scores",
            self.config.base_url,
            urlencoding::encode(scorecard_tag),
            urlencoding::encode(entity_tag)
        );
        let res = self
            .authorize(self.http.post(&url))
            .send()
            .await
            .map_err(|e| ScoremendError::Network(e.to_string()))?;
        let status = res.status().as_u16();
        interpret_trigger_status(status, read_body(res).await)
    }

    async fn fetch_next_steps(
        &self,
        scorecard_tag: &str,
        entity_tag: &str,
    ) -> Result<Vec<NextStepGroup>> {
        let url = format!(
            "{}/api/v1/scorecards/{}/next-steps?entityTag={}",
            self.config.base_url,
            urlencoding::encode(scorecard_tag),
            urlencoding::encode(entity_tag)
        );
        let res = self.get(&url).await?;
        if !res.status().is_success() {
            return Err(ScoremendError::Upstream {
                status: res.status().as_u16(),
                body: read_body(res).await,
            });
        }
        let body: Value = res
            .json()
            .await
            .map_err(|e| ScoremendError::Network(e.to_string()))?;
        Ok(normalize_next_steps(&body))
    }
}

// ---------------------------------------------------------------------------
// Wire-shape normalization
// ---------------------------------------------------------------------------

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Normalize the list response: either `{ "scorecards": [...] }` or a bare
/// array. Entries without any usable identifier are dropped with a warning.
pub(crate) fn normalize_scorecard_list(body: &Value) -> Vec<ScorecardSummary> {
    let entries = body
        .get("scorecards")
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .cloned()
        .unwrap_or_default();

    entries
        .iter()
        .filter_map(|entry| {
            let Some(tag) = str_field(entry, &["tag", "id", "slug"]) else {
                warn!("Dropping scorecard entry with no tag, id, or slug");
                return None;
            };
            let name = str_field(entry, &["name"]).unwrap_or_else(|| tag.clone());
            let rules = entry
                .get("rules")
                .cloned()
                .map(|v| serde_json::from_value(v).unwrap_or_default())
                .unwrap_or_default();
            Some(ScorecardSummary { tag, name, rules })
        })
        .collect()
}

/// First element of the fallback collection shape: `{ "scores": [...] }` or a
/// bare array.
pub(crate) fn extract_first_score(body: &Value) -> Option<&Value> {
    body.get("scores")
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .and_then(|arr| arr.first())
}

/// Collapse either score payload shape into one `EntityScore`.
pub(crate) fn normalize_entity_score(
    scorecard_tag: &str,
    entity_tag: &str,
    payload: &Value,
) -> EntityScore {
    let raw_rules = payload
        .get("rules")
        .or_else(|| payload.get("ruleResults"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let rules = raw_rules
        .iter()
        .map(|r| RuleResult {
            title: str_field(r, &["title", "ruleTitle", "id"]),
            id: str_field(r, &["id", "ruleId"]),
            status: r
                .get("status")
                .or_else(|| r.get("result"))
                .and_then(Value::as_str)
                .map(RuleStatus::parse)
                .unwrap_or(RuleStatus::NotEvaluated),
            level: str_field(r, &["level"]),
            failure_message: str_field(r, &["failureMessage", "message"]),
        })
        .collect();

    let overall = match payload.get("overall") {
        Some(overall) => OverallScore {
            level: str_field(overall, &["level"]),
            points: overall.get("points").and_then(Value::as_f64),
        },
        None => OverallScore {
            level: str_field(payload, &["level"]),
            points: payload.get("points").and_then(Value::as_f64),
        },
    };

    EntityScore {
        entity_tag: entity_tag.to_string(),
        scorecard_tag: scorecard_tag.to_string(),
        overall,
        rules,
    }
}

/// 2xx and 409 are both success for the trigger POST: a 409 means an
/// evaluation is already running remotely, which is the desired end state.
pub(crate) fn interpret_trigger_status(status: u16, body: String) -> Result<()> {
    if status == 409 {
        debug!("Trigger returned 409; an evaluation is already in flight");
        return Ok(());
    }
    if (200..300).contains(&status) {
        return Ok(());
    }
    Err(ScoremendError::Upstream { status, body })
}

/// Normalize a next-steps body. A missing or malformed `nextSteps` field
/// yields an empty sequence rather than an error; level wrappers
/// `{ "level": { "name", "number" } }` flatten to `ScoreLevel`.
pub(crate) fn normalize_next_steps(body: &Value) -> Vec<NextStepGroup> {
    let Some(groups) = body.get("nextSteps").and_then(Value::as_array) else {
        return Vec::new();
    };

    groups
        .iter()
        .map(|group| NextStepGroup {
            current_level: flatten_level(group.get("currentLevel")),
            next_level: flatten_level(group.get("nextLevel")),
            rules_to_complete: group
                .get("rulesToComplete")
                .cloned()
                .map(|v| serde_json::from_value(v).unwrap_or_default())
                .unwrap_or_default(),
        })
        .collect()
}

fn flatten_level(wrapper: Option<&Value>) -> Option<crate::domain::model::ScoreLevel> {
    wrapper
        .and_then(|w| w.get("level"))
        .and_then(|level| serde_json::from_value(level.clone()).ok())
}
