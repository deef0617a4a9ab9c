//! File-backed persistence for results, stories, the ledger, and alerts.
//!
//! Everything is JSON under a single data directory, keyed by stable
//! identifiers so the engine can resume after a restart:
//!
//! ```text
//! data_dir/
//! ├── results/
//! │   └── <article_id>.jsonl   # append-only FactCheckResult history
//! ├── stories.json             # current story set + member records
//! ├── ledger.json              # credibility ledger snapshot
//! ├── alerts.jsonl             # append-only operational alerts
//! └── seen.json                # finalized article ids (idempotence)
//! ```
//!
//! Result history is append-only: a re-run writes a new line, never
//! rewrites an old one.

use std::collections::{HashMap, HashSet};
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::correlation::StorySnapshot;
use crate::error::EngineResult;
use crate::models::{EngineAlert, FactCheckResult, SourceCredibility};

/// Handle on the engine's data directory.
#[derive(Debug, Clone)]
pub struct EngineStore {
    data_dir: PathBuf,
}

impl EngineStore {
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: PathBuf::from(data_dir),
        }
    }

    /// Ensure the directory layout exists and is writable.
    ///
    /// Creates the tree if needed, then performs a write test by creating
    /// and immediately deleting a probe file.
    #[instrument(level = "info", skip_all, fields(data_dir = %self.data_dir.display()))]
    pub async fn ensure_layout(&self) -> EngineResult<()> {
        fs::create_dir_all(self.data_dir.join("results")).await?;
        // Try a small sync write using std fs (simpler error surface)
        let probe_path = self.data_dir.join("..__probe_write__");
        stdfs::File::create(&probe_path)?;
        let _ = stdfs::remove_file(&probe_path);
        info!("Data directory is writable");
        Ok(())
    }

    fn result_path(&self, article_id: &str) -> PathBuf {
        self.data_dir
            .join("results")
            .join(format!("{}.jsonl", sanitize(article_id)))
    }

    /// Append one result to the article's history file.
    pub async fn append_result(&self, result: &FactCheckResult) -> EngineResult<()> {
        append_line(&self.result_path(&result.article_id), result).await
    }

    /// Full result history for an article, oldest first.
    pub async fn result_history(&self, article_id: &str) -> EngineResult<Vec<FactCheckResult>> {
        read_lines(&self.result_path(article_id)).await
    }

    /// Most recent result for an article, if any.
    pub async fn latest_result(&self, article_id: &str) -> EngineResult<Option<FactCheckResult>> {
        Ok(self.result_history(article_id).await?.into_iter().next_back())
    }

    /// Append an operational alert.
    pub async fn append_alert(&self, alert: &EngineAlert) -> EngineResult<()> {
        append_line(&self.data_dir.join("alerts.jsonl"), alert).await
    }

    /// All alerts raised so far, oldest first.
    pub async fn alerts(&self) -> EngineResult<Vec<EngineAlert>> {
        read_lines(&self.data_dir.join("alerts.jsonl")).await
    }

    /// Persist the current story set.
    pub async fn save_stories(&self, snapshot: &StorySnapshot) -> EngineResult<()> {
        let json = serde_json::to_string(snapshot)?;
        fs::write(self.data_dir.join("stories.json"), json).await?;
        Ok(())
    }

    /// Load the persisted story set; empty when none was saved yet.
    pub async fn load_stories(&self) -> EngineResult<StorySnapshot> {
        read_or_default(&self.data_dir.join("stories.json")).await
    }

    /// Persist the credibility ledger snapshot.
    pub async fn save_ledger(
        &self,
        snapshot: &HashMap<String, SourceCredibility>,
    ) -> EngineResult<()> {
        let json = serde_json::to_string(snapshot)?;
        fs::write(self.data_dir.join("ledger.json"), json).await?;
        Ok(())
    }

    /// Load the persisted ledger; empty when none was saved yet.
    pub async fn load_ledger(&self) -> EngineResult<HashMap<String, SourceCredibility>> {
        read_or_default(&self.data_dir.join("ledger.json")).await
    }

    /// Persist the set of finalized article ids.
    pub async fn save_seen(&self, seen: &HashSet<String>) -> EngineResult<()> {
        let mut ids: Vec<&String> = seen.iter().collect();
        ids.sort();
        let json = serde_json::to_string(&ids)?;
        fs::write(self.data_dir.join("seen.json"), json).await?;
        Ok(())
    }

    /// Load the set of finalized article ids; empty when none was saved.
    pub async fn load_seen(&self) -> EngineResult<HashSet<String>> {
        read_or_default(&self.data_dir.join("seen.json")).await
    }
}

/// Make an identifier safe as a file name.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn append_line<T: serde::Serialize>(path: &Path, value: &T) -> EngineResult<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> EngineResult<Vec<T>> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}

async fn read_or_default<T: serde::de::DeserializeOwned + Default>(
    path: &Path,
) -> EngineResult<T> {
    match fs::read_to_string(path).await {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, OverallRating, VerdictLabel};
    use chrono::Utc;

    fn result(article_id: &str, pass: u32) -> FactCheckResult {
        FactCheckResult {
            article_id: article_id.to_string(),
            label: VerdictLabel::Supported,
            confidence: 0.8,
            overall_rating: OverallRating::True,
            claims: vec![],
            verdicts: vec![],
            disagreement: false,
            degraded: false,
            needs_human_review: false,
            pass,
            processing_ms: 10,
            checked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_result_history_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = EngineStore::new(dir.path().to_str().unwrap());
        store.ensure_layout().await.unwrap();

        store.append_result(&result("a1", 1)).await.unwrap();
        store.append_result(&result("a1", 2)).await.unwrap();

        let history = store.result_history("a1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].pass, 1);
        assert_eq!(history[1].pass, 2);

        let latest = store.latest_result("a1").await.unwrap().unwrap();
        assert_eq!(latest.pass, 2);
    }

    #[tokio::test]
    async fn test_missing_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EngineStore::new(dir.path().to_str().unwrap());
        store.ensure_layout().await.unwrap();
        assert!(store.result_history("never-seen").await.unwrap().is_empty());
        assert!(store.latest_result("never-seen").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_awkward_ids_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = EngineStore::new(dir.path().to_str().unwrap());
        store.ensure_layout().await.unwrap();
        let id = "https://example.com/2025/05/06/story";
        store.append_result(&result(id, 1)).await.unwrap();
        let history = store.result_history(id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].article_id, id);
    }

    #[tokio::test]
    async fn test_alert_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EngineStore::new(dir.path().to_str().unwrap());
        store.ensure_layout().await.unwrap();
        store
            .append_alert(&EngineAlert {
                kind: AlertKind::AllProvidersUnavailable,
                article_id: "a1".to_string(),
                detail: "all calls failed".to_string(),
                raised_at: Utc::now(),
            })
            .await
            .unwrap();
        let alerts = store.alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::AllProvidersUnavailable);
    }

    #[tokio::test]
    async fn test_ledger_and_seen_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EngineStore::new(dir.path().to_str().unwrap());
        store.ensure_layout().await.unwrap();

        let mut ledger = HashMap::new();
        ledger.insert("cnn".to_string(), SourceCredibility { score: 0.7, samples: 4 });
        store.save_ledger(&ledger).await.unwrap();
        let loaded = store.load_ledger().await.unwrap();
        assert_eq!(loaded.get("cnn").unwrap().samples, 4);

        let seen: HashSet<String> = ["a1".to_string(), "a2".to_string()].into_iter().collect();
        store.save_seen(&seen).await.unwrap();
        assert_eq!(store.load_seen().await.unwrap(), seen);
    }

    #[tokio::test]
    async fn test_empty_store_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = EngineStore::new(dir.path().to_str().unwrap());
        store.ensure_layout().await.unwrap();
        assert!(store.load_stories().await.unwrap().stories.is_empty());
        assert!(store.load_ledger().await.unwrap().is_empty());
        assert!(store.load_seen().await.unwrap().is_empty());
        assert!(store.alerts().await.unwrap().is_empty());
    }
}
