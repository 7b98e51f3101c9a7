//! Domain-level error taxonomy for Scoremend.
//!
//! A convergence timeout is deliberately not an error variant: partial
//! progress is still useful to the caller, so it is reported as the
//! `TimedOut` terminal run status instead.

/// Scoremend domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ScoremendError {
    /// Transport failure with no usable response.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response from the scorecard API (409 on trigger excluded).
    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    /// A remediation action's side effect failed.
    #[error("remediation action failed: {cause}")]
    Action { cause: String },

    /// A run is already active for this (scorecard, entity) pair.
    #[error("a run is already active for {scorecard_tag}/{entity_tag}")]
    ConcurrentRun {
        scorecard_tag: String,
        entity_tag: String,
    },

    #[error("invalid entity tag: {0}")]
    InvalidEntityTag(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for Scoremend domain operations.
pub type Result<T> = std::result::Result<T, ScoremendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScoremendError::Upstream {
            status: 503,
            body: "service unavailable".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("service unavailable"));

        let err = ScoremendError::Action {
            cause: "branch protection PUT returned 403".to_string(),
        };
        assert!(err.to_string().contains("remediation action failed"));
    }

    #[test]
    fn test_concurrent_run_names_the_pair() {
        let err = ScoremendError::ConcurrentRun {
            scorecard_tag: "prod-readiness".to_string(),
            entity_tag: "service:payments-api".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("prod-readiness"));
        assert!(msg.contains("service:payments-api"));
    }
}
