//! Engine facade: wires extraction, verification, correlation, the ledger,
//! and the store behind the interface the API layer consumes.
//!
//! Articles arrive at-least-once; the engine tolerates duplicate delivery
//! idempotently: re-processing an already-finalized article is a no-op
//! unless explicitly forced, and a forced re-run appends a new result
//! rather than overwriting history.
//!
//! Configuration is re-read from disk at the start of every pass, and the
//! provider registry is reconciled against it, so provider or threshold
//! changes take effect on the next pass without a restart. The two
//! pipelines (verification, correlation) stay independently triggerable
//! through [`Engine::verify_now`] and [`Engine::recorrelate`]; the ingest
//! path runs verification first so the join can weigh a fresh result into
//! story consensus.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::correlation::{JoinOutcome, MemberRecord, StoryIndex, correlate_article};
use crate::error::{EngineError, EngineResult};
use crate::extractor::{ClaimExtraction, PatternClaimExtractor, RemoteClaimExtractor};
use crate::ledger::CredibilityLedger;
use crate::models::{
    AlertKind, Article, EngineAlert, FactCheckResult, ProcessingState, Story,
};
use crate::providers::ProviderRegistry;
use crate::similarity::fingerprint;
use crate::store::EngineStore;
use crate::verification::{CancelFlag, verify_article};

/// Outcome of ingesting one article.
#[derive(Debug)]
pub struct IngestOutcome {
    pub article_id: String,
    /// True when the article was already finalized and not forced.
    pub skipped: bool,
    /// The fresh verification result, when one was produced.
    pub result: Option<FactCheckResult>,
    /// The story joined or created during correlation.
    pub join: Option<JoinOutcome>,
}

/// The fact-checking and correlation engine.
pub struct Engine {
    config_path: String,
    store: EngineStore,
    registry: ProviderRegistry,
    ledger: CredibilityLedger,
    stories: StoryIndex,
    seen: RwLock<HashSet<String>>,
    /// Articles delivered this process lifetime, for re-triggers by id.
    articles: RwLock<std::collections::HashMap<String, Article>>,
}

impl Engine {
    /// Open the engine against a config file and data directory, resuming
    /// persisted story and ledger state.
    #[instrument(level = "info", skip_all, fields(config_path = %config_path, data_dir = %data_dir))]
    pub async fn open(config_path: &str, data_dir: &str) -> EngineResult<Self> {
        let config = EngineConfig::load(config_path).await?;
        let store = EngineStore::new(data_dir);
        store.ensure_layout().await?;

        let stories = StoryIndex::from_snapshot(store.load_stories().await?);
        let ledger =
            CredibilityLedger::from_snapshot(config.neutral_credibility, store.load_ledger().await?);
        let seen = store.load_seen().await?;

        let registry = ProviderRegistry::new();
        registry.sync_config(&config).await;

        info!(
            stories = stories.story_count().await,
            finalized = seen.len(),
            "Engine state resumed"
        );

        Ok(Self {
            config_path: config_path.to_string(),
            store,
            registry,
            ledger,
            stories,
            seen: RwLock::new(seen),
            articles: RwLock::new(std::collections::HashMap::new()),
        })
    }

    /// The provider registry, for programmatic provider registration.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Ingest one crawler-delivered article: extract claims, verify, and
    /// correlate. Duplicate delivery of a finalized id is a no-op unless
    /// `force` is set.
    pub async fn ingest(&self, article: Article, force: bool) -> EngineResult<IngestOutcome> {
        self.ingest_with_cancel(article, force, &CancelFlag::new())
            .await
    }

    /// [`Engine::ingest`] with an external cancellation flag. A cancelled
    /// pass finalizes nothing; in-flight provider calls drain detached.
    #[instrument(level = "info", skip_all, fields(article_id = %article.id, force))]
    pub async fn ingest_with_cancel(
        &self,
        mut article: Article,
        force: bool,
        cancel: &CancelFlag,
    ) -> EngineResult<IngestOutcome> {
        // Fresh configuration every pass.
        let config = EngineConfig::load(&self.config_path).await?;
        self.registry.sync_config(&config).await;

        if !force && self.seen.read().await.contains(&article.id) {
            info!(article_id = %article.id, "Article already finalized; skipping");
            return Ok(IngestOutcome {
                article_id: article.id,
                skipped: true,
                result: None,
                join: None,
            });
        }

        // Crawler records occasionally omit the source identity; fall back
        // to the outlet tag from the URL so the ledger still has a key.
        if article.source.is_empty() {
            if let Some(tag) = article.source_tag() {
                article.source = tag;
            }
        }

        // Fingerprint once at ingestion; never recomputed.
        if article.fingerprint.is_none() {
            article.fingerprint = Some(fingerprint(&article.body));
        }

        self.extract_claims(&mut article, &config).await;

        let result = match article.state {
            ProcessingState::ExtractionFailed => None,
            _ => Some(self.run_verification(&article, &config, cancel).await?),
        };

        let join = self.run_correlation(&article, result.as_ref(), &config).await?;

        {
            let mut seen = self.seen.write().await;
            seen.insert(article.id.clone());
            self.store.save_seen(&seen).await?;
        }
        article.state = if article.state == ProcessingState::ExtractionFailed {
            ProcessingState::ExtractionFailed
        } else {
            ProcessingState::Finalized
        };
        let article_id = article.id.clone();
        self.articles.write().await.insert(article_id.clone(), article);

        self.store.save_stories(&self.stories.snapshot().await).await?;
        self.store.save_ledger(&self.ledger.snapshot().await).await?;

        Ok(IngestOutcome {
            article_id,
            skipped: false,
            result,
            join: Some(join),
        })
    }

    /// Extract claims unless the crawler already attached some.
    ///
    /// Extraction failure is not fatal: the article is marked accordingly
    /// and continues to correlation, which needs only the fingerprint.
    async fn extract_claims(&self, article: &mut Article, config: &EngineConfig) {
        if !article.claims.is_empty() {
            article.state = ProcessingState::ClaimsExtracted;
            return;
        }
        let extractor: Arc<dyn ClaimExtraction> = match &config.extractor_endpoint {
            Some(endpoint) => Arc::new(RemoteClaimExtractor::new(endpoint)),
            None => Arc::new(PatternClaimExtractor),
        };
        match extractor.extract(&article.body, config.max_claims).await {
            Ok(claims) => {
                info!(article_id = %article.id, count = claims.len(), "Extracted claims");
                article.claims = claims;
                article.state = ProcessingState::ClaimsExtracted;
            }
            Err(e) => {
                warn!(
                    article_id = %article.id,
                    error = %e,
                    "Claim extraction failed; article proceeds to correlation only"
                );
                article.state = ProcessingState::ExtractionFailed;
            }
        }
    }

    /// One verification pass: fan out, reconcile, persist, and raise the
    /// degraded alert when every provider was unavailable.
    async fn run_verification(
        &self,
        article: &Article,
        config: &EngineConfig,
        cancel: &CancelFlag,
    ) -> EngineResult<FactCheckResult> {
        let pass = self.store.result_history(&article.id).await?.len() as u32 + 1;
        let result = verify_article(article, &self.registry, config, pass, cancel).await?;
        self.store.append_result(&result).await?;

        if result.degraded {
            let alert = EngineAlert {
                kind: AlertKind::AllProvidersUnavailable,
                article_id: article.id.clone(),
                detail: "article verified with no provider available".to_string(),
                raised_at: result.checked_at,
            };
            error!(article_id = %article.id, "AllProvidersUnavailable alert raised");
            self.store.append_alert(&alert).await?;
        }
        Ok(result)
    }

    /// One correlation pass: join a story, persist any inconsistency alert.
    async fn run_correlation(
        &self,
        article: &Article,
        result: Option<&FactCheckResult>,
        config: &EngineConfig,
    ) -> EngineResult<JoinOutcome> {
        let fingerprint = article
            .fingerprint
            .clone()
            .unwrap_or_else(|| fingerprint(&article.body));
        let member = MemberRecord::new(article, fingerprint, result);
        let join = correlate_article(&self.stories, member, &self.ledger, config).await?;
        if let Some(alert) = &join.alert {
            error!(
                article_id = %article.id,
                detail = %alert.detail,
                "CorrelationInconsistency alert raised"
            );
            self.store.append_alert(alert).await?;
        }
        Ok(join)
    }

    /// Trigger: verify an already-delivered article now.
    ///
    /// A non-forced call on a finalized article is a no-op returning the
    /// stored result; `force` appends a fresh pass.
    pub async fn verify_now(
        &self,
        article_id: &str,
        force: bool,
    ) -> EngineResult<Option<FactCheckResult>> {
        if !force {
            if let Some(existing) = self.store.latest_result(article_id).await? {
                return Ok(Some(existing));
            }
        }
        let article = {
            let articles = self.articles.read().await;
            articles.get(article_id).cloned()
        };
        let Some(article) = article else {
            return Ok(None);
        };
        if article.state == ProcessingState::ExtractionFailed {
            return Err(EngineError::ExtractionFailed(format!(
                "article '{article_id}' has no extractable claims"
            )));
        }
        let config = EngineConfig::load(&self.config_path).await?;
        self.registry.sync_config(&config).await;
        let result = self
            .run_verification(&article, &config, &CancelFlag::new())
            .await?;
        Ok(Some(result))
    }

    /// Trigger: recompute correlation for an already-delivered article.
    /// A no-op for articles already in a story.
    pub async fn recorrelate(&self, article_id: &str) -> EngineResult<Option<JoinOutcome>> {
        let article = {
            let articles = self.articles.read().await;
            articles.get(article_id).cloned()
        };
        let Some(article) = article else {
            return Ok(None);
        };
        let config = EngineConfig::load(&self.config_path).await?;
        let result = self.store.latest_result(article_id).await?;
        let join = self
            .run_correlation(&article, result.as_ref(), &config)
            .await?;
        self.store.save_stories(&self.stories.snapshot().await).await?;
        Ok(Some(join))
    }

    /// Latest verification result for an article.
    pub async fn latest_result(&self, article_id: &str) -> EngineResult<Option<FactCheckResult>> {
        self.store.latest_result(article_id).await
    }

    /// Full verification history for an article, oldest first.
    pub async fn result_history(&self, article_id: &str) -> EngineResult<Vec<FactCheckResult>> {
        self.store.result_history(article_id).await
    }

    /// Story by id.
    pub async fn story(&self, story_id: &str) -> Option<Story> {
        self.stories.story(story_id).await
    }

    /// Story containing the given article.
    pub async fn story_for_article(&self, article_id: &str) -> Option<Story> {
        self.stories.story_for_article(article_id).await
    }

    /// All operational alerts raised so far.
    pub async fn alerts(&self) -> EngineResult<Vec<EngineAlert>> {
        self.store.alerts().await
    }

    /// Number of stories currently tracked.
    pub async fn story_count(&self) -> usize {
        self.stories.story_count().await
    }
}
