//! Engine configuration loaded from a YAML file.
//!
//! The configuration is re-read at the start of every pass rather than
//! cached for the process lifetime, so threshold or provider changes take
//! effect on the next run without a restart. Every field has a default so a
//! missing file or a partial file still yields a runnable engine.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{EngineError, EngineResult};

/// Configuration for a single verification provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Provider name; also the key used in verdicts and breaker state.
    pub name: String,
    /// HTTP endpoint for remote providers. Providers without an endpoint
    /// must be registered programmatically.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static reliability weight applied to this provider's votes.
    /// Independent of source credibility, which concerns article sources.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether the provider participates in fan-out at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Upper bound on claims extracted per article.
    #[serde(default = "default_max_claims")]
    pub max_claims: usize,
    /// Configured verification providers.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Concurrently processed provider calls / articles.
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,
    /// Base delay for the single timeout retry, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Cap on the retry delay, in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Rolling window length (call count) for provider error rates.
    #[serde(default = "default_breaker_window")]
    pub breaker_window: usize,
    /// Error rate within the window that trips a cool-down.
    #[serde(default = "default_breaker_error_rate")]
    pub breaker_error_rate: f64,
    /// Cool-down duration in seconds once tripped.
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
    /// Minhash similarity at or above which two articles are near-duplicates.
    #[serde(default = "default_near_duplicate_threshold")]
    pub near_duplicate_threshold: f64,
    /// Similarity at or above which an article joins an existing story.
    #[serde(default = "default_join_threshold")]
    pub join_threshold: f64,
    /// Scale applied to keyword-overlap similarity for non-duplicates.
    #[serde(default = "default_topical_weight")]
    pub topical_weight: f64,
    /// Trailing window, in hours, bounding the correlation candidate set.
    #[serde(default = "default_candidate_window_hours")]
    pub candidate_window_hours: i64,
    /// EMA decay factor for source credibility updates.
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Starting credibility score for never-seen sources.
    #[serde(default = "default_neutral_credibility")]
    pub neutral_credibility: f64,
    /// Below this confidence, a disagreeing result is flagged for review.
    #[serde(default = "default_review_confidence_floor")]
    pub review_confidence_floor: f64,
    /// Optional remote claim-extraction endpoint; the pattern extractor is
    /// used when unset.
    #[serde(default)]
    pub extractor_endpoint: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}
fn default_provider_timeout_ms() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}
fn default_max_claims() -> usize {
    10
}
fn default_worker_limit() -> usize {
    12
}
fn default_retry_base_delay_ms() -> u64 {
    250
}
fn default_retry_max_delay_ms() -> u64 {
    30_000
}
fn default_breaker_window() -> usize {
    20
}
fn default_breaker_error_rate() -> f64 {
    0.5
}
fn default_breaker_cooldown_secs() -> u64 {
    60
}
fn default_near_duplicate_threshold() -> f64 {
    0.9
}
fn default_join_threshold() -> f64 {
    0.7
}
fn default_topical_weight() -> f64 {
    0.8
}
fn default_candidate_window_hours() -> i64 {
    72
}
fn default_decay_factor() -> f64 {
    0.95
}
fn default_neutral_credibility() -> f64 {
    0.5
}
fn default_review_confidence_floor() -> f64 {
    0.4
}

impl Default for EngineConfig {
    fn default() -> Self {
        // serde_yaml on an empty mapping fills every field from its default
        serde_yaml::from_str("{}").expect("defaults are total")
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// Called at the start of every pass so edits take effect on the next
    /// run without restarting the process.
    #[instrument(level = "info", skip_all, fields(path = %path))]
    pub async fn load(path: &str) -> EngineResult<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_yaml::from_str::<EngineConfig>(&raw)
                .map_err(|e| EngineError::Config(format!("{path}: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(%path, "No config file; using defaults");
                EngineConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        info!(
            providers = config.providers.len(),
            worker_limit = config.worker_limit,
            join_threshold = config.join_threshold,
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Reject configurations that would break scoring invariants.
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [
            ("near_duplicate_threshold", self.near_duplicate_threshold),
            ("join_threshold", self.join_threshold),
            ("topical_weight", self.topical_weight),
            ("decay_factor", self.decay_factor),
            ("neutral_credibility", self.neutral_credibility),
            ("breaker_error_rate", self.breaker_error_rate),
            ("review_confidence_floor", self.review_confidence_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.max_claims == 0 {
            return Err(EngineError::Config("max_claims must be >= 1".to_string()));
        }
        if self.worker_limit == 0 {
            return Err(EngineError::Config("worker_limit must be >= 1".to_string()));
        }
        for provider in &self.providers {
            if provider.weight < 0.0 {
                return Err(EngineError::Config(format!(
                    "provider '{}' has negative weight",
                    provider.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_claims, 10);
        assert_eq!(config.worker_limit, 12);
        assert_eq!(config.near_duplicate_threshold, 0.9);
        assert_eq!(config.join_threshold, 0.7);
        assert_eq!(config.candidate_window_hours, 72);
        assert_eq!(config.decay_factor, 0.95);
        assert_eq!(config.neutral_credibility, 0.5);
        assert!(config.providers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
join_threshold: 0.75
providers:
  - name: alpha
    endpoint: "http://localhost:9001/verify"
  - name: beta
    weight: 2.0
    timeout_ms: 1500
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.join_threshold, 0.75);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].weight, 1.0);
        assert!(config.providers[0].enabled);
        assert_eq!(config.providers[1].weight, 2.0);
        assert_eq!(config.providers[1].timeout_ms, 1500);
        assert_eq!(config.max_claims, 10);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = EngineConfig::default();
        config.join_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.decay_factor = -0.1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.max_claims = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let config = EngineConfig::load("/nonexistent/verity.yaml").await.unwrap();
        assert_eq!(config.max_claims, 10);
    }
}
