//! Typed failure taxonomy for the engine.
//!
//! Per-call provider failures (`ProviderTimeout`, `ProviderRateLimited`,
//! `ProviderError`) are handled by the orchestrator's retry and the
//! registry's circuit breaker; they never propagate to callers as fatal
//! errors. Only `AllProvidersUnavailable` and `CorrelationInconsistency`
//! become operator-visible alerts; everything else is absorbed into
//! confidence degradation and structured logs.

use thiserror::Error;

/// All failure modes the engine distinguishes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Claim extraction was unavailable; the article proceeds to
    /// correlation only.
    #[error("claim extraction failed: {0}")]
    ExtractionFailed(String),

    /// A provider call exceeded its configured timeout.
    #[error("provider '{provider}' timed out")]
    ProviderTimeout { provider: String },

    /// A provider rejected the call due to rate limiting.
    #[error("provider '{provider}' rate limited the call")]
    ProviderRateLimited { provider: String },

    /// A provider call failed for any other reason.
    #[error("provider '{provider}' failed: {message}")]
    ProviderError { provider: String, message: String },

    /// Every enabled provider was unavailable for an article pass.
    #[error("all verification providers unavailable")]
    AllProvidersUnavailable,

    /// An article ended up claimed by two stories; resolved by the
    /// earlier-created story, the other join rolled back.
    #[error("article '{article_id}' claimed by stories '{kept}' and '{lost}'")]
    CorrelationInconsistency {
        article_id: String,
        kept: String,
        lost: String,
    },

    /// A verification pass was cancelled before finalization.
    #[error("verification pass cancelled")]
    Cancelled,

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    /// True for the per-call provider failures that the orchestrator
    /// absorbs as non-votes.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            EngineError::ProviderTimeout { .. }
                | EngineError::ProviderRateLimited { .. }
                | EngineError::ProviderError { .. }
        )
    }
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failures_classified() {
        let timeout = EngineError::ProviderTimeout {
            provider: "alpha".to_string(),
        };
        let limited = EngineError::ProviderRateLimited {
            provider: "alpha".to_string(),
        };
        let failed = EngineError::ProviderError {
            provider: "alpha".to_string(),
            message: "boom".to_string(),
        };
        assert!(timeout.is_provider_failure());
        assert!(limited.is_provider_failure());
        assert!(failed.is_provider_failure());
        assert!(!EngineError::AllProvidersUnavailable.is_provider_failure());
        assert!(!EngineError::Cancelled.is_provider_failure());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::ProviderTimeout {
            provider: "alpha".to_string(),
        };
        assert!(err.to_string().contains("alpha"));

        let err = EngineError::CorrelationInconsistency {
            article_id: "a1".to_string(),
            kept: "s1".to_string(),
            lost: "s2".to_string(),
        };
        assert!(err.to_string().contains("s1"));
        assert!(err.to_string().contains("s2"));
    }
}
