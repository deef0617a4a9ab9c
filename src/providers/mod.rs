//! Verification providers: capability trait, registry, and circuit breaking.
//!
//! A provider is anything that can judge a single claim. The registry holds
//! the active set as process-wide state with explicit add/remove operations;
//! fan-out always goes through [`ProviderRegistry::enabled`], which consults
//! each provider's breaker, never ad hoc dispatch.
//!
//! The call adapter ([`RegisteredProvider::call`]) bounds every call with a
//! per-provider timeout, measures latency, and feeds a rolling error-rate
//! window. A provider exceeding the configured error rate within the window
//! is put in cool-down and excluded from fan-out until the cool-down
//! expires. The adapter never retries; retry policy belongs to the
//! orchestrator.

pub mod http;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{Claim, VerdictLabel, VerificationVerdict};

/// Capability implemented by every verification provider: judge one claim.
///
/// Implementations return a raw label and confidence; the adapter layers
/// timeout, latency measurement, and breaker accounting on top.
#[async_trait]
pub trait VerifyClaim: Send + Sync {
    async fn verify(&self, claim: &Claim) -> EngineResult<(VerdictLabel, f64)>;
}

/// Availability state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Participating in fan-out.
    Enabled,
    /// Temporarily excluded; re-enabled when the cool-down expires.
    CoolingDown,
    /// Administratively removed from fan-out until re-enabled.
    Disabled,
}

#[derive(Debug)]
enum BreakerInner {
    Enabled,
    CoolingDown { until: Instant },
    Disabled,
}

/// Rolling error-rate breaker for one provider.
///
/// Tracks the outcome of the last `window` calls; when the window is full
/// and the error rate reaches the threshold, the provider cools down for
/// `cooldown`. Cool-downs expire lazily on the next availability check.
#[derive(Debug)]
pub struct ProviderBreaker {
    state: Mutex<BreakerInner>,
    outcomes: Mutex<VecDeque<bool>>,
    window: usize,
    error_rate_threshold: f64,
    cooldown: Duration,
}

impl ProviderBreaker {
    pub fn new(window: usize, error_rate_threshold: f64, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerInner::Enabled),
            outcomes: Mutex::new(VecDeque::with_capacity(window)),
            window: window.max(1),
            error_rate_threshold,
            cooldown,
        }
    }

    /// Current state, transitioning expired cool-downs back to enabled.
    pub fn state(&self) -> BreakerState {
        let mut state = self.state.lock().unwrap();
        if let BreakerInner::CoolingDown { until } = *state {
            if Instant::now() >= until {
                *state = BreakerInner::Enabled;
            }
        }
        match *state {
            BreakerInner::Enabled => BreakerState::Enabled,
            BreakerInner::CoolingDown { .. } => BreakerState::CoolingDown,
            BreakerInner::Disabled => BreakerState::Disabled,
        }
    }

    /// Whether the provider may participate in fan-out right now.
    pub fn available(&self) -> bool {
        self.state() == BreakerState::Enabled
    }

    /// Record one call outcome into the rolling window, tripping a
    /// cool-down when the windowed error rate reaches the threshold.
    pub fn record(&self, error: bool) {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() == self.window {
            outcomes.pop_front();
        }
        outcomes.push_back(error);

        if outcomes.len() == self.window {
            let errors = outcomes.iter().filter(|e| **e).count();
            let rate = errors as f64 / outcomes.len() as f64;
            if rate >= self.error_rate_threshold {
                outcomes.clear();
                drop(outcomes);
                self.trip();
            }
        }
    }

    /// Start a cool-down immediately (rate limits trip without waiting for
    /// the window to fill).
    pub fn trip(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, BreakerInner::Disabled) {
            return;
        }
        *state = BreakerInner::CoolingDown {
            until: Instant::now() + self.cooldown,
        };
    }

    /// Administratively remove the provider from fan-out.
    pub fn disable(&self) {
        *self.state.lock().unwrap() = BreakerInner::Disabled;
    }

    /// Re-enable an administratively disabled provider.
    pub fn enable(&self) {
        *self.state.lock().unwrap() = BreakerInner::Enabled;
    }
}

/// A provider plus its adapter state: weight, timeout, and breaker.
pub struct RegisteredProvider {
    pub name: String,
    pub weight: f64,
    pub timeout: Duration,
    /// True when the provider came from the configuration file; managed
    /// providers are dropped when they disappear from it, programmatic
    /// registrations are not.
    managed: bool,
    breaker: ProviderBreaker,
    inner: Arc<dyn VerifyClaim>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("timeout", &self.timeout)
            .field("state", &self.breaker.state())
            .finish()
    }
}

impl RegisteredProvider {
    /// Current breaker state.
    pub fn state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Call the provider on one claim, bounded by the per-call timeout.
    ///
    /// On success returns an audit verdict with measured latency; on
    /// failure returns the typed provider error after recording it into
    /// the breaker. Rate limits trip an immediate cool-down. No retry
    /// happens here.
    pub async fn call(&self, claim_index: usize, claim: &Claim) -> EngineResult<VerificationVerdict> {
        let t0 = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.inner.verify(claim)).await;
        let latency_ms = t0.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok((label, confidence))) => {
                self.breaker.record(false);
                Ok(VerificationVerdict {
                    claim_index,
                    provider: self.name.clone(),
                    label,
                    confidence: confidence.clamp(0.0, 1.0),
                    latency_ms,
                    error: false,
                })
            }
            Ok(Err(EngineError::ProviderRateLimited { .. })) => {
                self.breaker.record(true);
                self.breaker.trip();
                warn!(provider = %self.name, latency_ms, "Provider rate limited; cooling down");
                Err(EngineError::ProviderRateLimited {
                    provider: self.name.clone(),
                })
            }
            Ok(Err(e)) => {
                self.breaker.record(true);
                warn!(provider = %self.name, latency_ms, error = %e, "Provider call failed");
                Err(EngineError::ProviderError {
                    provider: self.name.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                self.breaker.record(true);
                warn!(provider = %self.name, latency_ms, "Provider call timed out");
                Err(EngineError::ProviderTimeout {
                    provider: self.name.clone(),
                })
            }
        }
    }
}

/// Process-wide registry of verification providers.
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<RegisteredProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
        }
    }

    /// Add a provider to the active set programmatically. Survives config
    /// reloads; remove it with [`ProviderRegistry::remove`].
    pub async fn register(
        &self,
        name: &str,
        weight: f64,
        timeout: Duration,
        config: &EngineConfig,
        inner: Arc<dyn VerifyClaim>,
    ) {
        self.register_inner(name, weight, timeout, config, inner, false)
            .await;
    }

    async fn register_inner(
        &self,
        name: &str,
        weight: f64,
        timeout: Duration,
        config: &EngineConfig,
        inner: Arc<dyn VerifyClaim>,
        managed: bool,
    ) {
        let provider = Arc::new(RegisteredProvider {
            name: name.to_string(),
            weight,
            timeout,
            managed,
            breaker: ProviderBreaker::new(
                config.breaker_window,
                config.breaker_error_rate,
                Duration::from_secs(config.breaker_cooldown_secs),
            ),
            inner,
        });
        let mut providers = self.providers.write().await;
        providers.retain(|p| p.name != provider.name);
        info!(provider = %provider.name, weight, managed, "Registered verification provider");
        providers.push(provider);
    }

    /// Remove a provider from the active set. Returns whether it existed.
    pub async fn remove(&self, name: &str) -> bool {
        let mut providers = self.providers.write().await;
        let before = providers.len();
        providers.retain(|p| p.name != name);
        let removed = providers.len() != before;
        if removed {
            info!(provider = %name, "Removed verification provider");
        }
        removed
    }

    /// Reconcile the registry with freshly loaded configuration.
    ///
    /// Weights and timeouts follow the config; config-managed providers
    /// that disappeared from it are removed; HTTP providers that appeared
    /// are registered. Programmatically registered providers are left
    /// alone unless a config entry names them. Breaker state of unchanged
    /// providers is preserved, so a cool-down outlives a config reload.
    pub async fn sync_config(&self, config: &EngineConfig) {
        let configured: Vec<_> = config
            .providers
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .collect();

        {
            let mut providers = self.providers.write().await;
            providers.retain(|p| {
                let keep = !p.managed || configured.iter().any(|c| c.name == p.name);
                if !keep {
                    info!(provider = %p.name, "Provider dropped from configuration");
                }
                keep
            });
        }

        for entry in configured {
            let existing = {
                let providers = self.providers.read().await;
                providers.iter().find(|p| p.name == entry.name).cloned()
            };
            match existing {
                Some(current)
                    if current.weight == entry.weight
                        && current.timeout == Duration::from_millis(entry.timeout_ms) =>
                {
                    debug!(provider = %entry.name, "Provider unchanged");
                }
                Some(current) => {
                    // Re-register with fresh weight/timeout but keep the inner
                    // capability; breaker restarts only for changed providers.
                    let inner = Arc::clone(&current.inner);
                    self.register_inner(
                        &entry.name,
                        entry.weight,
                        Duration::from_millis(entry.timeout_ms),
                        config,
                        inner,
                        current.managed,
                    )
                    .await;
                }
                None => {
                    if let Some(endpoint) = &entry.endpoint {
                        self.register_inner(
                            &entry.name,
                            entry.weight,
                            Duration::from_millis(entry.timeout_ms),
                            config,
                            Arc::new(http::HttpProvider::new(&entry.name, endpoint)),
                            true,
                        )
                        .await;
                    } else {
                        warn!(
                            provider = %entry.name,
                            "Configured provider has no endpoint and is not registered programmatically; skipping"
                        );
                    }
                }
            }
        }
    }

    /// Providers currently eligible for fan-out (breaker permitting).
    pub async fn enabled(&self) -> Vec<Arc<RegisteredProvider>> {
        let providers = self.providers.read().await;
        providers.iter().filter(|p| p.breaker.available()).cloned().collect()
    }

    /// All registered providers, regardless of breaker state.
    pub async fn all(&self) -> Vec<Arc<RegisteredProvider>> {
        self.providers.read().await.clone()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted providers for orchestrator and registry tests.

    use super::*;

    /// Always returns the same label and confidence.
    pub struct StaticProvider {
        pub label: VerdictLabel,
        pub confidence: f64,
    }

    #[async_trait]
    impl VerifyClaim for StaticProvider {
        async fn verify(&self, _claim: &Claim) -> EngineResult<(VerdictLabel, f64)> {
            Ok((self.label, self.confidence))
        }
    }

    /// Sleeps longer than any test timeout, forcing `ProviderTimeout`.
    pub struct HangingProvider;

    #[async_trait]
    impl VerifyClaim for HangingProvider {
        async fn verify(&self, _claim: &Claim) -> EngineResult<(VerdictLabel, f64)> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("test timeout should fire first")
        }
    }

    /// Always fails with a rate-limit error.
    pub struct RateLimitedProvider;

    #[async_trait]
    impl VerifyClaim for RateLimitedProvider {
        async fn verify(&self, _claim: &Claim) -> EngineResult<(VerdictLabel, f64)> {
            Err(EngineError::ProviderRateLimited {
                provider: "rate-limited".to_string(),
            })
        }
    }

    pub fn claim(text: &str) -> Claim {
        Claim {
            text: text.to_string(),
            start: 0,
            end: text.len(),
        }
    }
}
