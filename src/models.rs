//! Data models for articles, claims, verdicts, stories, and credibility.
//!
//! This module defines the core data structures used throughout the engine:
//! - [`Article`]: a crawler-delivered article record plus processing state
//! - [`Claim`]: a checkable factual assertion extracted from article text
//! - [`VerificationVerdict`]: one provider's judgment on one claim
//! - [`FactCheckResult`]: the reconciled, article-level verification outcome
//! - [`Fingerprint`]: compact content signature for similarity comparison
//! - [`Story`]: a cluster of articles covering the same real-world event
//! - [`SourceCredibility`]: running trust score for a news source
//!
//! Verdicts and results are append-only once created; a re-run of
//! verification produces a new [`FactCheckResult`] with a higher `pass`
//! number rather than mutating history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A news article as delivered by the crawler, with engine-side state.
///
/// The identity fields (`id`, `source`, `url`, timestamps) are owned by the
/// crawler and never change. The engine fills in `claims` and `fingerprint`
/// during processing and advances `state`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Article {
    /// Stable unique identifier assigned by the crawler.
    pub id: String,
    /// Identity of the news source (outlet) that published the article.
    pub source: String,
    /// The URL the article was retrieved from.
    pub url: String,
    /// Headline, when the crawler extracted one.
    #[serde(default)]
    pub title: Option<String>,
    /// Raw article body text.
    pub body: String,
    /// Publication timestamp reported by the source.
    pub published_at: DateTime<Utc>,
    /// Timestamp at which the crawler retrieved the article.
    pub retrieved_at: DateTime<Utc>,
    /// Engine-side processing state.
    #[serde(default)]
    pub state: ProcessingState,
    /// Claims extracted from the body, ordered by span start.
    #[serde(default)]
    pub claims: Vec<Claim>,
    /// Content fingerprint, computed once at ingestion.
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
}

impl Article {
    /// Extract the outlet tag (domain before the TLD) from the article URL.
    /// For example: "https://lite.cnn.com/article" -> "cnn"
    pub fn source_tag(&self) -> Option<String> {
        if let Ok(parsed) = url::Url::parse(&self.url) {
            if let Some(host) = parsed.host_str() {
                let parts: Vec<&str> = host.split('.').collect();
                // Handle cases like "lite.cnn.com" -> "cnn" or "cnn.com" -> "cnn"
                if parts.len() >= 2 {
                    return Some(parts[parts.len() - 2].to_string());
                }
            }
        }
        None
    }
}

/// Engine-side processing state of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Not yet processed.
    #[default]
    Pending,
    /// Claims extracted; verification may proceed.
    ClaimsExtracted,
    /// Claim extraction failed; article skips verification but still
    /// participates in correlation.
    ExtractionFailed,
    /// Verification finalized; re-delivery of the same id is a no-op.
    Finalized,
}

/// A short natural-language factual assertion plus its character span in the
/// source text. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Claim {
    /// The assertion text.
    pub text: String,
    /// Byte offset of the claim's start in the article body.
    pub start: usize,
    /// Byte offset one past the claim's end in the article body.
    pub end: usize,
}

/// A verification label assigned to a claim or an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictLabel {
    /// The claim is backed by the provider's evidence.
    Supported,
    /// The provider's evidence contradicts the claim.
    Contradicted,
    /// The provider could not decide either way.
    Unverifiable,
}

impl std::fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictLabel::Supported => write!(f, "supported"),
            VerdictLabel::Contradicted => write!(f, "contradicted"),
            VerdictLabel::Unverifiable => write!(f, "unverifiable"),
        }
    }
}

/// One provider's judgment on one claim. Created per provider call, never
/// mutated, and retained on the result for audit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationVerdict {
    /// Index of the claim in the article's claim list.
    pub claim_index: usize,
    /// Name of the provider that produced this verdict.
    pub provider: String,
    /// The provider's label for the claim.
    pub label: VerdictLabel,
    /// The provider's raw confidence in [0, 1].
    pub confidence: f64,
    /// Wall-clock latency of the provider call in milliseconds.
    pub latency_ms: u64,
    /// True when the provider call failed; failed calls are recorded for
    /// audit but count as non-votes during reconciliation.
    pub error: bool,
}

/// Per-claim aggregate after reconciling all provider verdicts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaimCheck {
    /// Index of the claim in the article's claim list.
    pub claim_index: usize,
    /// Reconciled label for the claim.
    pub label: VerdictLabel,
    /// Reconciled confidence in [0, 1].
    pub confidence: f64,
    /// True when providers produced conflicting labels for this claim.
    pub disagreement: bool,
}

/// Five-step human-facing rating derived from label and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallRating {
    True,
    MostlyTrue,
    Mixed,
    MostlyFalse,
    False,
    /// No rating possible (unverifiable without disagreement).
    Unrated,
}

impl OverallRating {
    /// Derive the rating from an article-level label, confidence, and
    /// disagreement flag. Deterministic: the same inputs always yield the
    /// same rating.
    pub fn derive(label: VerdictLabel, confidence: f64, disagreement: bool) -> Self {
        match label {
            VerdictLabel::Supported if confidence >= 0.8 => OverallRating::True,
            VerdictLabel::Supported => OverallRating::MostlyTrue,
            VerdictLabel::Contradicted if confidence >= 0.8 => OverallRating::False,
            VerdictLabel::Contradicted => OverallRating::MostlyFalse,
            VerdictLabel::Unverifiable if disagreement => OverallRating::Mixed,
            VerdictLabel::Unverifiable => OverallRating::Unrated,
        }
    }
}

/// The reconciled, article-level verification outcome.
///
/// One result is created per verification pass. A forced re-run appends a
/// new result with an incremented `pass`; prior results are retained.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FactCheckResult {
    /// Id of the article this result belongs to.
    pub article_id: String,
    /// Article-level reconciled label.
    pub label: VerdictLabel,
    /// Article-level confidence in [0, 1].
    pub confidence: f64,
    /// Human-facing rating derived from label and confidence.
    pub overall_rating: OverallRating,
    /// Per-claim aggregates.
    pub claims: Vec<ClaimCheck>,
    /// All contributing (and failed) provider verdicts, for audit.
    pub verdicts: Vec<VerificationVerdict>,
    /// True when any claim saw conflicting provider labels.
    pub disagreement: bool,
    /// True when the result was produced with no provider available.
    pub degraded: bool,
    /// Set when disagreement is present and confidence is below the
    /// configured review floor.
    pub needs_human_review: bool,
    /// Monotone pass counter; starts at 1, incremented on forced re-runs.
    pub pass: u32,
    /// Wall-clock duration of the verification pass in milliseconds.
    pub processing_ms: u64,
    /// Timestamp at which the pass completed.
    pub checked_at: DateTime<Utc>,
}

/// Compact content signature of an article, computed once at ingestion.
///
/// `minhash` is a fixed-width signature over shingled text used for cheap
/// near-duplicate estimation; `keywords` is a topical term signature used
/// for non-duplicate similarity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Fingerprint {
    /// Minhash signature slots (one minimum per salted hash function).
    pub minhash: Vec<u64>,
    /// Top terms by frequency, stopwords removed, most frequent first.
    pub keywords: Vec<String>,
}

/// One entry in a story's timeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimelineEntry {
    /// Id of the member article.
    pub article_id: String,
    /// Publication timestamp (primary timeline order).
    pub published_at: DateTime<Utc>,
    /// Ingestion timestamp (tie-break on exact publication ties).
    pub ingested_at: DateTime<Utc>,
    /// Claims this article introduced that no earlier timeline entry carried.
    pub claim_delta: Vec<String>,
}

/// A cluster of articles believed to cover the same real-world event.
///
/// Stories grow as new articles join; membership never shrinks except by
/// explicit administrative merge/split, which is out of scope here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Story {
    /// Stable story identifier.
    pub id: String,
    /// Creation timestamp; used as the deterministic tie-break when an
    /// article is claimed by two stories.
    pub created_at: DateTime<Utc>,
    /// Member article ids, in join order.
    pub article_ids: Vec<String>,
    /// Timeline ordered by publication timestamp.
    pub timeline: Vec<TimelineEntry>,
    /// Credibility-weighted consensus label across member results.
    pub consensus_label: Option<VerdictLabel>,
    /// Credibility-weighted consensus confidence in [0, 1].
    pub consensus_confidence: f64,
    /// Shared topical terms across member fingerprints.
    pub keywords: Vec<String>,
}

/// Running trust score for a news source.
///
/// Updated incrementally with an exponential moving average so recent
/// behavior dominates without keeping unbounded history. Invariant: `score`
/// stays in [0, 1].
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SourceCredibility {
    /// Agreement-with-consensus score in [0, 1].
    pub score: f64,
    /// Number of observations folded into the score.
    pub samples: u64,
}

impl SourceCredibility {
    /// A source never seen before: neutral score, zero samples.
    pub fn neutral(default_score: f64) -> Self {
        Self {
            score: default_score.clamp(0.0, 1.0),
            samples: 0,
        }
    }

    /// Fold one agreement observation into the score.
    ///
    /// `agreed` is whether the source's verdict matched story consensus;
    /// `decay` is the EMA decay factor (weight kept by the old score).
    pub fn observe(&mut self, agreed: bool, decay: f64) {
        let target = if agreed { 1.0 } else { 0.0 };
        let decay = decay.clamp(0.0, 1.0);
        self.score = (decay * self.score + (1.0 - decay) * target).clamp(0.0, 1.0);
        self.samples += 1;
    }
}

/// Kind of operator-visible alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Every enabled provider was unavailable for an article pass.
    AllProvidersUnavailable,
    /// An article was claimed by two stories; the later-created story's
    /// join was rolled back.
    CorrelationInconsistency,
}

/// An operational alert, persisted for the operator.
///
/// Only the two conditions in [`AlertKind`] surface as alerts; all other
/// failures are absorbed into confidence degradation and logs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineAlert {
    pub kind: AlertKind,
    pub article_id: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}
