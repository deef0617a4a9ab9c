//! Verification orchestrator: fan-out, retry, and verdict reconciliation.
//!
//! For one article the orchestrator fans every claim out to every enabled
//! provider concurrently, bounded by the worker limit, then reconciles the
//! collected verdicts into a single [`FactCheckResult`]:
//!
//! 1. Per claim, providers vote with their configured static weights; a
//!    supported/contradicted tie resolves to `unverifiable` with the
//!    disagreement flag set.
//! 2. Claim confidence is the weighted mean of contributing confidences,
//!    scaled by `1 - normalized variance` when labels conflict; unanimous
//!    verdicts take no penalty, keeping aggregation monotonic.
//! 3. Article label and confidence aggregate across claims weighted by
//!    claim confidence, so well-attested claims dominate.
//!
//! Retry policy lives here, not in the adapter: a timeout is retried once
//! with jittered backoff; a rate limit is never retried in-pass (the
//! breaker already started its cool-down). Failed calls become audit
//! verdicts with the error flag set and count as non-votes.
//!
//! A pass may be cancelled mid-flight: spawned provider calls run to
//! completion detached, their verdicts are discarded, and no result is
//! finalized.

use chrono::Utc;
use rand::{Rng, rng};
use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Article, Claim, ClaimCheck, FactCheckResult, OverallRating, VerdictLabel, VerificationVerdict,
};
use crate::providers::{ProviderRegistry, RegisteredProvider};

/// Cooperative cancellation handle for a verification pass.
#[derive(Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; in-flight provider calls finish detached.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut notified = pin!(self.notify.notified());
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Verify one article: fan out, reconcile, and build the result.
///
/// `pass` is the monotone pass number recorded on the result. When every
/// provider is unavailable (none enabled, or all calls failed) the result
/// is `unverifiable` with confidence 0 and the `degraded` flag set; the
/// caller surfaces that as an operational alert. Returns
/// [`EngineError::Cancelled`] when the flag fires before finalization.
#[instrument(level = "info", skip_all, fields(article_id = %article.id, claims = article.claims.len()))]
pub async fn verify_article(
    article: &Article,
    registry: &ProviderRegistry,
    config: &EngineConfig,
    pass: u32,
    cancel: &CancelFlag,
) -> EngineResult<FactCheckResult> {
    let t0 = Instant::now();
    let providers = registry.enabled().await;

    if article.claims.is_empty() {
        // No checkable statement is not an error; nothing to verify.
        return Ok(finalize(article, Vec::new(), Vec::new(), false, pass, t0, config));
    }

    if providers.is_empty() {
        error!(
            article_id = %article.id,
            "All verification providers unavailable; producing degraded result"
        );
        return Ok(finalize(article, Vec::new(), Vec::new(), true, pass, t0, config));
    }

    let verdicts = collect_verdicts(&article.claims, &providers, config, cancel).await?;

    let weights: HashMap<String, f64> = providers
        .iter()
        .map(|p| (p.name.clone(), p.weight))
        .collect();

    let claim_checks: Vec<ClaimCheck> = (0..article.claims.len())
        .map(|index| {
            let for_claim: Vec<&VerificationVerdict> =
                verdicts.iter().filter(|v| v.claim_index == index).collect();
            reconcile_claim(index, &for_claim, &weights)
        })
        .collect();

    // Every call failing is indistinguishable, for the operator, from no
    // provider being reachable at all.
    let degraded = verdicts.iter().all(|v| v.error);
    if degraded {
        error!(
            article_id = %article.id,
            calls = verdicts.len(),
            "Every provider call failed; producing degraded result"
        );
    }

    Ok(finalize(article, claim_checks, verdicts, degraded, pass, t0, config))
}

/// Fan claims out to providers, bounded by the worker limit.
///
/// Each (claim, provider) call is an independent spawned task so that a
/// cancelled pass can stop waiting while calls drain on their own.
async fn collect_verdicts(
    claims: &[Claim],
    providers: &[Arc<RegisteredProvider>],
    config: &EngineConfig,
    cancel: &CancelFlag,
) -> EngineResult<Vec<VerificationVerdict>> {
    let semaphore = Arc::new(Semaphore::new(config.worker_limit.max(1)));
    let mut handles = Vec::with_capacity(claims.len() * providers.len());

    for (claim_index, claim) in claims.iter().enumerate() {
        for provider in providers {
            let provider = Arc::clone(provider);
            let claim = claim.clone();
            let semaphore = Arc::clone(&semaphore);
            let retry_base = Duration::from_millis(config.retry_base_delay_ms);
            let retry_max = Duration::from_millis(config.retry_max_delay_ms);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                call_with_retry(&provider, claim_index, &claim, retry_base, retry_max).await
            }));
        }
    }

    let mut verdicts = Vec::with_capacity(handles.len());
    for handle in handles {
        tokio::select! {
            joined = handle => match joined {
                Ok(verdict) => verdicts.push(verdict),
                Err(e) => warn!(error = %e, "Provider task panicked; treating as non-vote"),
            },
            _ = cancel.cancelled() => {
                info!("Verification pass cancelled; discarding in-flight verdicts");
                return Err(EngineError::Cancelled);
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    Ok(verdicts)
}

/// One provider call with the orchestrator's retry policy applied.
///
/// Timeouts get a single jittered-backoff retry; rate limits and other
/// errors do not. Failures always come back as audit verdicts with the
/// error flag set.
async fn call_with_retry(
    provider: &RegisteredProvider,
    claim_index: usize,
    claim: &Claim,
    retry_base: Duration,
    retry_max: Duration,
) -> VerificationVerdict {
    let t0 = Instant::now();
    let first = provider.call(claim_index, claim).await;

    let outcome = match first {
        Err(EngineError::ProviderTimeout { .. }) => {
            // backoff calc
            let mut delay = retry_base;
            if delay > retry_max {
                delay = retry_max;
            }
            let jitter_ms: u64 = rng().random_range(0..=250);
            let delay = delay + Duration::from_millis(jitter_ms);
            warn!(
                provider = %provider.name,
                claim_index,
                ?delay,
                "Provider timed out; retrying once after backoff"
            );
            sleep(delay).await;
            provider.call(claim_index, claim).await
        }
        other => other,
    };

    outcome.unwrap_or_else(|e| {
        warn!(provider = %provider.name, claim_index, error = %e, "Recording failed call as non-vote");
        VerificationVerdict {
            claim_index,
            provider: provider.name.clone(),
            label: VerdictLabel::Unverifiable,
            confidence: 0.0,
            latency_ms: t0.elapsed().as_millis() as u64,
            error: true,
        }
    })
}

/// Reconcile all verdicts for one claim into a [`ClaimCheck`].
fn reconcile_claim(
    claim_index: usize,
    verdicts: &[&VerificationVerdict],
    weights: &HashMap<String, f64>,
) -> ClaimCheck {
    let successful: Vec<&&VerificationVerdict> = verdicts.iter().filter(|v| !v.error).collect();
    if successful.is_empty() {
        return ClaimCheck {
            claim_index,
            label: VerdictLabel::Unverifiable,
            confidence: 0.0,
            disagreement: false,
        };
    }

    let weight_of = |v: &VerificationVerdict| weights.get(&v.provider).copied().unwrap_or(1.0);

    let mut label_weight: HashMap<VerdictLabel, f64> = HashMap::new();
    for v in &successful {
        *label_weight.entry(v.label).or_insert(0.0) += weight_of(v);
    }

    let supported = label_weight.get(&VerdictLabel::Supported).copied().unwrap_or(0.0);
    let contradicted = label_weight
        .get(&VerdictLabel::Contradicted)
        .copied()
        .unwrap_or(0.0);
    let unverifiable = label_weight
        .get(&VerdictLabel::Unverifiable)
        .copied()
        .unwrap_or(0.0);

    let conflict = supported > 0.0 && contradicted > 0.0;
    let tied = conflict && (supported - contradicted).abs() < 1e-9;

    let label = if tied {
        VerdictLabel::Unverifiable
    } else if supported > contradicted && supported >= unverifiable {
        VerdictLabel::Supported
    } else if contradicted > supported && contradicted >= unverifiable {
        VerdictLabel::Contradicted
    } else {
        VerdictLabel::Unverifiable
    };

    let total_weight: f64 = successful.iter().map(|v| weight_of(v)).sum();
    let mean = successful
        .iter()
        .map(|v| weight_of(v) * v.confidence)
        .sum::<f64>()
        / total_weight;

    let confidence = if conflict {
        // Max possible variance is 0.25 (confidences at 0 and 1).
        let confidences: Vec<f64> = successful.iter().map(|v| v.confidence).collect();
        let raw_mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
        let variance = confidences
            .iter()
            .map(|c| (c - raw_mean).powi(2))
            .sum::<f64>()
            / confidences.len() as f64;
        let normalized = (variance / 0.25).min(1.0);
        mean * (1.0 - normalized)
    } else {
        mean
    };

    ClaimCheck {
        claim_index,
        label,
        confidence: confidence.clamp(0.0, 1.0),
        disagreement: conflict,
    }
}

/// Aggregate claim checks into the article-level result.
fn finalize(
    article: &Article,
    claims: Vec<ClaimCheck>,
    verdicts: Vec<VerificationVerdict>,
    degraded: bool,
    pass: u32,
    t0: Instant,
    config: &EngineConfig,
) -> FactCheckResult {
    let mut label_weight: HashMap<VerdictLabel, f64> = HashMap::new();
    for check in &claims {
        *label_weight.entry(check.label).or_insert(0.0) += check.confidence;
    }

    let supported = label_weight.get(&VerdictLabel::Supported).copied().unwrap_or(0.0);
    let contradicted = label_weight
        .get(&VerdictLabel::Contradicted)
        .copied()
        .unwrap_or(0.0);

    let disagreement = claims.iter().any(|c| c.disagreement);
    let tied = supported > 0.0 && (supported - contradicted).abs() < 1e-9;

    let label = if degraded || claims.is_empty() || tied {
        VerdictLabel::Unverifiable
    } else if supported > contradicted {
        VerdictLabel::Supported
    } else if contradicted > supported {
        VerdictLabel::Contradicted
    } else {
        VerdictLabel::Unverifiable
    };

    // Confidence-weighted mean of claim confidences: strong claims dominate.
    let total: f64 = claims.iter().map(|c| c.confidence).sum();
    let confidence = if total > 0.0 && !degraded {
        (claims.iter().map(|c| c.confidence * c.confidence).sum::<f64>() / total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let result = FactCheckResult {
        article_id: article.id.clone(),
        label,
        confidence,
        overall_rating: OverallRating::derive(label, confidence, disagreement),
        claims,
        verdicts,
        disagreement,
        degraded,
        needs_human_review: disagreement && confidence < config.review_confidence_floor,
        pass,
        processing_ms: t0.elapsed().as_millis() as u64,
        checked_at: Utc::now(),
    };
    info!(
        article_id = %result.article_id,
        label = %result.label,
        confidence = result.confidence,
        disagreement = result.disagreement,
        degraded = result.degraded,
        pass = result.pass,
        "Verification pass finalized"
    );
    result
}
