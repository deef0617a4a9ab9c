//! # Verity News
//!
//! A fact-checking and correlation engine for crawled news articles. It
//! extracts checkable claims from article text, fans them out to multiple
//! independent verification providers, reconciles disagreeing judgments
//! into one confidence score, clusters articles across sources into
//! stories with per-story timelines, and scores source credibility from
//! historical agreement with consensus.
//!
//! ## Features
//!
//! - Claim extraction (deterministic pattern-based, or a remote model
//!   endpoint when configured)
//! - Parallel provider fan-out with per-call timeouts, single-retry
//!   backoff, and per-provider circuit breaking
//! - Weighted-vote reconciliation with a disagreement penalty
//! - Minhash/keyword fingerprints for near-duplicate and topical
//!   similarity over a bounded trailing candidate window
//! - Story clustering with publication-ordered timelines and
//!   credibility-weighted consensus
//! - Append-only result history, story and ledger snapshots, and a
//!   persistent alert log for operator-visible conditions
//!
//! ## Usage
//!
//! ```sh
//! verity_news -i ./articles.json -d ./data
//! ```
//!
//! ## Architecture
//!
//! Two pipelines per article, sharing only the credibility ledger and the
//! article/story records:
//! 1. **Verification**: claims → provider fan-out → reconciled result
//! 2. **Correlation**: fingerprint → candidate comparison → story join,
//!    consensus recomputation, and source credibility update

use clap::Parser;
use futures::stream::{self, StreamExt};
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod correlation;
mod engine;
mod error;
mod extractor;
mod ledger;
mod models;
mod providers;
mod similarity;
mod store;
mod utils;
mod verification;

use cli::Cli;
use config::EngineConfig;
use engine::Engine;
use models::Article;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("verity_news starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.input, ?args.data_dir, ?args.config, args.force, "Parsed CLI arguments");

    // ---- Load the batch of crawler article records ----
    let raw = tokio::fs::read_to_string(&args.input).await.map_err(|e| {
        error!(path = %args.input, error = %e, "Failed to read input file");
        e
    })?;
    let articles: Vec<Article> = serde_json::from_str(&raw)?;
    info!(count = articles.len(), "Articles to process");

    // ---- Open the engine (resumes persisted state) ----
    let engine = Engine::open(&args.config, &args.data_dir).await?;

    // Worker limit comes from the same config the engine re-reads per pass.
    let worker_limit = EngineConfig::load(&args.config).await?.worker_limit;
    info!(worker_limit, "Starting parallel article processing");

    let total_articles = articles.len();
    let outcomes: Vec<Option<engine::IngestOutcome>> = stream::iter(articles)
        .map(|article| {
            let engine = &engine;
            let force = args.force;
            async move {
                let article_id = article.id.clone();
                match engine.ingest(article, force).await {
                    Ok(outcome) => {
                        debug!(
                            article_id = %outcome.article_id,
                            skipped = outcome.skipped,
                            "Processed article"
                        );
                        Some(outcome)
                    }
                    Err(e) => {
                        error!(article_id = %article_id, error = %e, "Ingest failed; skipping article");
                        None
                    }
                }
            }
        })
        .buffer_unordered(worker_limit)
        .collect()
        .await;

    let processed: Vec<&engine::IngestOutcome> = outcomes.iter().flatten().collect();
    let skipped = processed.iter().filter(|o| o.skipped).count();
    let verified = processed.iter().filter(|o| o.result.is_some()).count();
    let degraded = processed
        .iter()
        .filter(|o| o.result.as_ref().is_some_and(|r| r.degraded))
        .count();
    let failed = total_articles - processed.len();

    info!(
        total = total_articles,
        verified,
        skipped,
        degraded,
        failed,
        "Completed parallel article processing"
    );

    let alerts = engine.alerts().await?;
    if !alerts.is_empty() {
        error!(count = alerts.len(), "Operational alerts raised; inspect alerts.jsonl");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        stories = engine.story_count().await,
        "Execution complete"
    );

    Ok(())
}
