//! HTTP JSON verification provider.
//!
//! Speaks a minimal request/response shape so any external verifier can sit
//! behind it: POST `{"claim": "..."}`, receive
//! `{"label": "supported" | "contradicted" | "unverifiable", "confidence": 0.9}`.
//! The wire shape is the adapter boundary: nothing upstream of the
//! [`VerifyClaim`] capability knows a given verifier is HTTP at all.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::VerifyClaim;
use crate::error::{EngineError, EngineResult};
use crate::models::{Claim, VerdictLabel};

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    claim: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    label: VerdictLabel,
    confidence: f64,
}

/// A verification provider reached over HTTP.
#[derive(Debug)]
pub struct HttpProvider {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VerifyClaim for HttpProvider {
    #[instrument(level = "debug", skip_all, fields(provider = %self.name))]
    async fn verify(&self, claim: &Claim) -> EngineResult<(VerdictLabel, f64)> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&VerifyRequest { claim: &claim.text })
            .send()
            .await
            .map_err(|e| classify_transport(&self.name, e))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(EngineError::ProviderRateLimited {
                provider: self.name.clone(),
            }),
            status if !status.is_success() => Err(EngineError::ProviderError {
                provider: self.name.clone(),
                message: format!("unexpected status {status}"),
            }),
            _ => {
                let parsed: VerifyResponse =
                    response.json().await.map_err(|e| EngineError::ProviderError {
                        provider: self.name.clone(),
                        message: format!("malformed response: {e}"),
                    })?;
                debug!(label = %parsed.label, confidence = parsed.confidence, "Provider verdict");
                Ok((parsed.label, parsed.confidence))
            }
        }
    }
}

fn classify_transport(provider: &str, e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::ProviderTimeout {
            provider: provider.to_string(),
        }
    } else {
        EngineError::ProviderError {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}
