//! Process-wide credibility ledger for news sources.
//!
//! A thread-safe map from source identity to [`SourceCredibility`], shared
//! by both pipelines. Each source's score sits behind its own mutex so
//! read-modify-write of one source is atomic while updates to different
//! sources proceed concurrently; there is no cross-source transaction and
//! no global lock on the hot path.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::models::SourceCredibility;

/// Shared ledger of per-source credibility scores.
#[derive(Debug)]
pub struct CredibilityLedger {
    sources: RwLock<HashMap<String, Arc<Mutex<SourceCredibility>>>>,
    /// Starting score for sources never seen before.
    neutral_score: f64,
}

impl CredibilityLedger {
    pub fn new(neutral_score: f64) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            neutral_score,
        }
    }

    /// Rebuild a ledger from a persisted snapshot.
    pub fn from_snapshot(neutral_score: f64, snapshot: HashMap<String, SourceCredibility>) -> Self {
        let sources = snapshot
            .into_iter()
            .map(|(k, v)| (k, Arc::new(Mutex::new(v))))
            .collect();
        Self {
            sources: RwLock::new(sources),
            neutral_score,
        }
    }

    /// Current credibility of a source; neutral default when never seen.
    ///
    /// The returned value is a copy taken at read time; callers must not
    /// cache it across passes.
    pub async fn get(&self, source: &str) -> SourceCredibility {
        let sources = self.sources.read().await;
        match sources.get(source) {
            Some(entry) => *entry.lock().await,
            None => SourceCredibility::neutral(self.neutral_score),
        }
    }

    /// Atomically fold one agreement observation into a source's score.
    ///
    /// Inserts the neutral default first for never-seen sources. The
    /// per-source mutex makes the read-modify-write atomic even when
    /// multiple stories update the same source concurrently.
    pub async fn observe(&self, source: &str, agreed: bool, decay: f64) -> SourceCredibility {
        let entry = {
            let mut sources = self.sources.write().await;
            Arc::clone(sources.entry(source.to_string()).or_insert_with(|| {
                Arc::new(Mutex::new(SourceCredibility::neutral(self.neutral_score)))
            }))
        };
        let mut cred = entry.lock().await;
        cred.observe(agreed, decay);
        debug!(
            %source,
            agreed,
            score = cred.score,
            samples = cred.samples,
            "Updated source credibility"
        );
        *cred
    }

    /// Copy of the whole ledger, for persistence.
    pub async fn snapshot(&self) -> HashMap<String, SourceCredibility> {
        let sources = self.sources.read().await;
        let mut out = HashMap::with_capacity(sources.len());
        for (name, entry) in sources.iter() {
            out.insert(name.clone(), *entry.lock().await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_source_is_neutral() {
        let ledger = CredibilityLedger::new(0.5);
        let cred = ledger.get("never-seen").await;
        assert_eq!(cred.score, 0.5);
        assert_eq!(cred.samples, 0);
    }

    #[tokio::test]
    async fn test_observe_persists() {
        let ledger = CredibilityLedger::new(0.5);
        ledger.observe("cnn", true, 0.95).await;
        let cred = ledger.get("cnn").await;
        assert!(cred.score > 0.5);
        assert_eq!(cred.samples, 1);
    }

    #[tokio::test]
    async fn test_agreeing_source_converges_up() {
        let ledger = CredibilityLedger::new(0.5);
        for _ in 0..200 {
            ledger.observe("reliable", true, 0.95).await;
        }
        assert!(ledger.get("reliable").await.score > 0.99);
    }

    #[tokio::test]
    async fn test_disagreeing_source_converges_down() {
        let ledger = CredibilityLedger::new(0.5);
        for _ in 0..200 {
            ledger.observe("unreliable", false, 0.95).await;
        }
        assert!(ledger.get("unreliable").await.score < 0.01);
    }

    #[tokio::test]
    async fn test_concurrent_updates_all_counted() {
        let ledger = Arc::new(CredibilityLedger::new(0.5));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.observe("shared", true, 0.9).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ledger.get("shared").await.samples, 32);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let ledger = CredibilityLedger::new(0.5);
        ledger.observe("cnn", true, 0.95).await;
        ledger.observe("npr", false, 0.95).await;

        let snapshot = ledger.snapshot().await;
        let restored = CredibilityLedger::from_snapshot(0.5, snapshot);
        assert_eq!(restored.get("cnn").await.samples, 1);
        assert!(restored.get("npr").await.score < 0.5);
    }
}
