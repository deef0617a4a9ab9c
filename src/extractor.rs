//! Claim extraction: article body text to an ordered list of checkable
//! factual claims.
//!
//! Two implementations of the [`ClaimExtraction`] capability:
//!
//! - [`PatternClaimExtractor`]: deterministic sentence segmentation plus
//!   factual-marker scoring. Always available, never fails on non-empty
//!   input, and produces an empty list (not an error) when no sentence
//!   looks checkable.
//! - [`RemoteClaimExtractor`]: delegates to an external model endpoint.
//!   A truncated JSON response is re-asked once before giving up; a
//!   transport failure yields `ExtractionFailed`, which marks the article
//!   as skipping verification while remaining eligible for correlation.
//!
//! Extraction need not be deterministic, but re-running on identical text
//! must produce a materially similar claim count; the pattern extractor is
//! fully deterministic, and tests hold the remote path to the same schema.

use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::Claim;
use crate::utils::{looks_truncated, truncate_for_log};

/// Capability: turn body text into at most `max_claims` ordered claims.
#[async_trait]
pub trait ClaimExtraction: Send + Sync {
    async fn extract(&self, body: &str, max_claims: usize) -> EngineResult<Vec<Claim>>;
}

/// Attribution verbs and quantity words that mark a sentence as checkable.
static FACTUAL_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(said|says|announced|reported|confirmed|according to|estimates?|million|billion|percent|killed|injured|elected|signed|raised|acquired|launched)\b",
    )
    .expect("static regex")
});

static CURRENCY_OR_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[$€£]\s?\d|\d").expect("static regex"));

/// Minimum sentence length, in bytes, to be considered a claim.
const MIN_CLAIM_LEN: usize = 20;

/// Deterministic, dependency-free claim extractor.
///
/// Splits the body into sentences and keeps those carrying factual
/// markers: numerals or currency amounts, attribution verbs, or a run of
/// capitalized words past the sentence start (named entities).
#[derive(Debug, Default)]
pub struct PatternClaimExtractor;

impl PatternClaimExtractor {
    fn sentences(body: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start = 0usize;
        for (i, c) in body.char_indices() {
            if matches!(c, '.' | '!' | '?') {
                let end = i + c.len_utf8();
                if end > start {
                    spans.push((start, end));
                }
                start = end;
            }
        }
        if start < body.len() {
            spans.push((start, body.len()));
        }
        spans
    }

    fn is_checkable(sentence: &str) -> bool {
        if CURRENCY_OR_NUMBER.is_match(sentence) || FACTUAL_MARKERS.is_match(sentence) {
            return true;
        }
        // Two or more capitalized words past the first token suggest named
        // entities worth checking.
        sentence
            .split_whitespace()
            .skip(1)
            .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
            .count()
            >= 2
    }
}

#[async_trait]
impl ClaimExtraction for PatternClaimExtractor {
    #[instrument(level = "debug", skip_all, fields(body_len = body.len()))]
    async fn extract(&self, body: &str, max_claims: usize) -> EngineResult<Vec<Claim>> {
        let claims: Vec<Claim> = Self::sentences(body)
            .into_iter()
            .filter_map(|(start, end)| {
                let raw = &body[start..end];
                let trimmed = raw.trim();
                if trimmed.len() < MIN_CLAIM_LEN || !Self::is_checkable(trimmed) {
                    return None;
                }
                let offset = raw.len() - raw.trim_start().len();
                Some(Claim {
                    text: trimmed.to_string(),
                    start: start + offset,
                    end: start + offset + trimmed.len(),
                })
            })
            .unique_by(|c| c.text.to_lowercase())
            .take(max_claims)
            .collect();

        debug!(count = claims.len(), "Extracted claims");
        Ok(claims)
    }
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    max_claims: usize,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    claims: Vec<String>,
}

/// Claim extractor backed by a remote model endpoint.
///
/// POSTs `{"text": ..., "max_claims": N}` and expects
/// `{"claims": ["...", ...]}`. Spans are recovered by locating each claim
/// in the body; claims the model paraphrased beyond recognition are
/// anchored at the body start.
#[derive(Debug)]
pub struct RemoteClaimExtractor {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteClaimExtractor {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn ask(&self, body: &str, max_claims: usize) -> EngineResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExtractRequest {
                text: body,
                max_claims,
            })
            .send()
            .await
            .map_err(|e| EngineError::ExtractionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::ExtractionFailed(format!(
                "extractor returned status {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| EngineError::ExtractionFailed(e.to_string()))
    }
}

#[async_trait]
impl ClaimExtraction for RemoteClaimExtractor {
    #[instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint))]
    async fn extract(&self, body: &str, max_claims: usize) -> EngineResult<Vec<Claim>> {
        let raw = self.ask(body, max_claims).await?;
        let mut parsed = serde_json::from_str::<ExtractResponse>(&raw);

        // If the parse failed due to EOF (truncation), re-ask ONCE
        if let Err(ref e) = parsed {
            if looks_truncated(e) {
                warn!(error = %e, "EOF while parsing extractor response; re-asking once");
                let raw2 = self.ask(body, max_claims).await?;
                parsed = serde_json::from_str::<ExtractResponse>(&raw2);
            }
        }

        let response = parsed.map_err(|e| {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&raw, 300),
                "Extractor returned non-conforming JSON"
            );
            EngineError::ExtractionFailed(format!("malformed extractor response: {e}"))
        })?;

        Ok(response
            .claims
            .into_iter()
            .unique_by(|t| t.to_lowercase())
            .take(max_claims)
            .map(|text| {
                let start = body.find(&text).unwrap_or(0);
                let end = (start + text.len()).min(body.len());
                Claim { text, start, end }
            })
            .sorted_by_key(|c| c.start)
            .collect())
    }
}
