//! Correlation engine: assign articles to stories, maintain timelines, and
//! update source credibility.
//!
//! A new article is compared against the fingerprints of members ingested
//! within the trailing candidate window. The best-scoring candidate at or
//! above the join threshold decides the story; otherwise the article seeds
//! a new singleton story.
//!
//! Concurrency discipline: each story sits behind its own mutex, so exactly
//! one mutation of a given story runs at a time while joins to different
//! stories proceed concurrently. There is no global lock across stories.
//! The membership map is the arbiter for duplicate-join races: when two
//! passes claim the same article for two stories, the story with the
//! earlier creation timestamp wins, the other join is rolled back, and a
//! `CorrelationInconsistency` alert is raised.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::ledger::CredibilityLedger;
use crate::models::{
    AlertKind, EngineAlert, FactCheckResult, Fingerprint, Story, TimelineEntry, VerdictLabel,
};
use crate::similarity::similarity;

/// Everything correlation needs to know about one article.
///
/// Built by the engine from the article and its latest fact-check result
/// (when one exists); retained so later joins can recompute consensus with
/// then-current source credibility.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct MemberRecord {
    pub article_id: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    /// Article-level label from the latest result; `None` for articles
    /// that skipped verification (extraction failed).
    pub label: Option<VerdictLabel>,
    pub confidence: f64,
    /// Claim texts, for timeline claim-deltas.
    pub claims: Vec<String>,
}

impl MemberRecord {
    pub fn new(
        article: &crate::models::Article,
        fingerprint: Fingerprint,
        result: Option<&FactCheckResult>,
    ) -> Self {
        Self {
            article_id: article.id.clone(),
            source: article.source.clone(),
            published_at: article.published_at,
            ingested_at: article.retrieved_at,
            fingerprint,
            label: result.map(|r| r.label),
            confidence: result.map(|r| r.confidence).unwrap_or(0.0),
            claims: article.claims.iter().map(|c| c.text.clone()).collect(),
        }
    }
}

/// Outcome of correlating one article.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub story_id: String,
    /// True when the article seeded a new story.
    pub created: bool,
    /// Similarity score against the best candidate (0 for singletons).
    pub score: f64,
    pub near_duplicate: bool,
    /// Raised when a duplicate-join race had to be rolled back.
    pub alert: Option<EngineAlert>,
}

/// Persisted form of the story index.
#[derive(Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct StorySnapshot {
    pub stories: Vec<Story>,
    pub members: HashMap<String, MemberRecord>,
}

/// In-memory story set plus article membership.
#[derive(Debug, Default)]
pub struct StoryIndex {
    /// Story id -> story, each behind its own writer lock.
    stories: RwLock<HashMap<String, Arc<Mutex<Story>>>>,
    /// Article id -> (story id, story created_at). The creation timestamp
    /// rides along so duplicate-join races resolve without locking the
    /// competing story.
    membership: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
    /// Correlated articles, for candidate comparison and consensus.
    members: RwLock<HashMap<String, MemberRecord>>,
}

impl StoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from a persisted snapshot.
    pub fn from_snapshot(snapshot: StorySnapshot) -> Self {
        let mut stories = HashMap::new();
        let mut membership = HashMap::new();
        for story in snapshot.stories {
            for article_id in &story.article_ids {
                membership.insert(article_id.clone(), (story.id.clone(), story.created_at));
            }
            stories.insert(story.id.clone(), Arc::new(Mutex::new(story)));
        }
        Self {
            stories: RwLock::new(stories),
            membership: RwLock::new(membership),
            members: RwLock::new(snapshot.members),
        }
    }

    /// Copy of the full index, for persistence.
    pub async fn snapshot(&self) -> StorySnapshot {
        let stories = self.stories.read().await;
        let mut out = Vec::with_capacity(stories.len());
        for story in stories.values() {
            out.push(story.lock().await.clone());
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        StorySnapshot {
            stories: out,
            members: self.members.read().await.clone(),
        }
    }

    /// Story by id.
    pub async fn story(&self, story_id: &str) -> Option<Story> {
        let stories = self.stories.read().await;
        match stories.get(story_id) {
            Some(story) => Some(story.lock().await.clone()),
            None => None,
        }
    }

    /// Story containing the given article, if any.
    pub async fn story_for_article(&self, article_id: &str) -> Option<Story> {
        let story_id = {
            let membership = self.membership.read().await;
            membership.get(article_id).map(|(id, _)| id.clone())
        };
        match story_id {
            Some(id) => self.story(&id).await,
            None => None,
        }
    }

    pub async fn story_count(&self) -> usize {
        self.stories.read().await.len()
    }
}

/// Correlate one article: join the best-matching story or create a new one.
///
/// Re-delivery of an already-correlated article is a no-op returning its
/// existing story.
#[instrument(level = "info", skip_all, fields(article_id = %member.article_id))]
pub async fn correlate_article(
    index: &StoryIndex,
    member: MemberRecord,
    ledger: &CredibilityLedger,
    config: &EngineConfig,
) -> EngineResult<JoinOutcome> {
    if let Some((story_id, _)) = index.membership.read().await.get(&member.article_id) {
        debug!(story_id = %story_id, "Article already correlated; no-op");
        return Ok(JoinOutcome {
            story_id: story_id.clone(),
            created: false,
            score: 0.0,
            near_duplicate: false,
            alert: None,
        });
    }

    let best = best_candidate(index, &member, config).await;

    match best {
        Some((candidate_id, score)) if score.score >= config.join_threshold => {
            let story_id = {
                let membership = index.membership.read().await;
                membership.get(&candidate_id).map(|(id, _)| id.clone())
            };
            match story_id {
                Some(story_id) => {
                    attach(index, member, &story_id, score.score, score.near_duplicate, ledger, config)
                        .await
                }
                // Candidate vanished between scoring and lookup; seed fresh.
                None => create_story(index, member, ledger).await,
            }
        }
        _ => create_story(index, member, ledger).await,
    }
}

/// Highest-scoring candidate within the trailing window.
///
/// Deterministic: score descending, then article id, so identical scores
/// always pick the same candidate regardless of map iteration order.
async fn best_candidate(
    index: &StoryIndex,
    member: &MemberRecord,
    config: &EngineConfig,
) -> Option<(String, crate::similarity::SimilarityScore)> {
    let window = Duration::hours(config.candidate_window_hours);
    let members = index.members.read().await;
    let mut best: Option<(String, crate::similarity::SimilarityScore)> = None;
    let mut compared = 0usize;
    for candidate in members.values() {
        let age = member.published_at - candidate.published_at;
        if age > window || age < -window {
            continue;
        }
        compared += 1;
        let score = similarity(&member.fingerprint, &candidate.fingerprint, config);
        let better = match &best {
            None => true,
            Some((best_id, best_score)) => {
                score.score > best_score.score
                    || (score.score == best_score.score && candidate.article_id < *best_id)
            }
        };
        if better {
            best = Some((candidate.article_id.clone(), score));
        }
    }
    debug!(
        compared,
        window_hours = config.candidate_window_hours,
        best_score = best.as_ref().map(|(_, s)| s.score).unwrap_or(0.0),
        "Scored correlation candidates"
    );
    best
}

/// Seed a new singleton story from the article.
async fn create_story(
    index: &StoryIndex,
    member: MemberRecord,
    ledger: &CredibilityLedger,
) -> EngineResult<JoinOutcome> {
    let story_id = Uuid::new_v4().to_string();
    let created_at = Utc::now();

    let mut story = Story {
        id: story_id.clone(),
        created_at,
        article_ids: vec![member.article_id.clone()],
        timeline: vec![timeline_entry(&member, &[])],
        consensus_label: None,
        consensus_confidence: 0.0,
        keywords: member.fingerprint.keywords.clone(),
    };
    refresh_consensus(&mut story, &[&member], ledger).await;

    {
        let mut membership = index.membership.write().await;
        membership.insert(member.article_id.clone(), (story_id.clone(), created_at));
    }
    {
        let mut stories = index.stories.write().await;
        stories.insert(story_id.clone(), Arc::new(Mutex::new(story)));
    }
    index
        .members
        .write()
        .await
        .insert(member.article_id.clone(), member);

    info!(story_id = %story_id, "Created singleton story");
    Ok(JoinOutcome {
        story_id,
        created: true,
        score: 0.0,
        near_duplicate: false,
        alert: None,
    })
}

/// Attach the article to an existing story.
///
/// Holds the story's mutex for the whole mutation: timeline insertion,
/// consensus recomputation, and the credibility update are atomic relative
/// to concurrent joins of the same story.
async fn attach(
    index: &StoryIndex,
    member: MemberRecord,
    story_id: &str,
    score: f64,
    near_duplicate: bool,
    ledger: &CredibilityLedger,
    config: &EngineConfig,
) -> EngineResult<JoinOutcome> {
    let story_arc = {
        let stories = index.stories.read().await;
        match stories.get(story_id) {
            Some(arc) => Arc::clone(arc),
            None => return create_story(index, member, ledger).await,
        }
    };
    let mut story = story_arc.lock().await;

    // Claim membership before mutating; this is where duplicate-join races
    // surface and resolve.
    let mut alert = None;
    {
        let mut membership = index.membership.write().await;
        let existing = membership
            .get(&member.article_id)
            .map(|(id, created)| (id.clone(), *created));
        match existing {
            None => {
                membership.insert(
                    member.article_id.clone(),
                    (story.id.clone(), story.created_at),
                );
            }
            Some((other_id, other_created)) if other_id != story.id => {
                // Earlier-created story wins; the other join rolls back.
                if other_created <= story.created_at {
                    warn!(
                        article_id = %member.article_id,
                        kept = %other_id,
                        lost = %story.id,
                        "Duplicate join race; earlier story keeps the article"
                    );
                    return Ok(JoinOutcome {
                        story_id: other_id.clone(),
                        created: false,
                        score,
                        near_duplicate,
                        alert: Some(inconsistency_alert(&member.article_id, &other_id, &story.id)),
                    });
                }
                membership.insert(
                    member.article_id.clone(),
                    (story.id.clone(), story.created_at),
                );
                alert = Some(inconsistency_alert(&member.article_id, &story.id, &other_id));
                drop(membership);
                rollback_join(index, &other_id, &member.article_id).await;
            }
            Some(_) => {
                // Raced with a join to the same story; nothing to do.
                return Ok(JoinOutcome {
                    story_id: story.id.clone(),
                    created: false,
                    score,
                    near_duplicate,
                    alert: None,
                });
            }
        }
    }

    // Timeline insertion: publication order, earlier ingestion on ties.
    let seen: Vec<String> = story
        .timeline
        .iter()
        .flat_map(|e| e.claim_delta.iter().cloned())
        .collect();
    let entry = timeline_entry(&member, &seen);
    let position = story
        .timeline
        .partition_point(|e| {
            (e.published_at, e.ingested_at) <= (entry.published_at, entry.ingested_at)
        });
    story.timeline.insert(position, entry);
    story.article_ids.push(member.article_id.clone());

    // Consensus over all members, weighted by current source credibility.
    let member_records: Vec<MemberRecord> = {
        let members = index.members.read().await;
        story
            .article_ids
            .iter()
            .filter_map(|id| members.get(id).cloned())
            .chain(std::iter::once(member.clone()))
            .collect()
    };
    let refs: Vec<&MemberRecord> = member_records.iter().collect();
    refresh_consensus(&mut story, &refs, ledger).await;

    // The joining source gains or loses credibility by agreement with the
    // consensus it just joined.
    if let (Some(label), Some(consensus)) = (member.label, story.consensus_label) {
        let agreed = label == consensus;
        ledger
            .observe(&member.source, agreed, config.decay_factor)
            .await;
    }

    refresh_keywords(&mut story, &refs);

    info!(
        story_id = %story.id,
        members = story.article_ids.len(),
        score,
        near_duplicate,
        consensus = ?story.consensus_label,
        consensus_confidence = story.consensus_confidence,
        "Article joined story"
    );

    let outcome = JoinOutcome {
        story_id: story.id.clone(),
        created: false,
        score,
        near_duplicate,
        alert,
    };
    drop(story);

    index
        .members
        .write()
        .await
        .insert(member.article_id.clone(), member);
    Ok(outcome)
}

fn inconsistency_alert(article_id: &str, kept: &str, lost: &str) -> EngineAlert {
    EngineAlert {
        kind: AlertKind::CorrelationInconsistency,
        article_id: article_id.to_string(),
        detail: format!("kept story {kept}, rolled back join to {lost}"),
        raised_at: Utc::now(),
    }
}

/// Remove a rolled-back article from the losing story.
async fn rollback_join(index: &StoryIndex, story_id: &str, article_id: &str) {
    let story_arc = {
        let stories = index.stories.read().await;
        stories.get(story_id).map(Arc::clone)
    };
    if let Some(story_arc) = story_arc {
        let mut story = story_arc.lock().await;
        story.article_ids.retain(|id| id != article_id);
        story.timeline.retain(|e| e.article_id != article_id);
        warn!(story_id = %story_id, article_id = %article_id, "Rolled back duplicate join");
    }
}

fn timeline_entry(member: &MemberRecord, seen_claims: &[String]) -> TimelineEntry {
    let claim_delta = member
        .claims
        .iter()
        .filter(|c| !seen_claims.iter().any(|s| s.eq_ignore_ascii_case(c)))
        .cloned()
        .collect();
    TimelineEntry {
        article_id: member.article_id.clone(),
        published_at: member.published_at,
        ingested_at: member.ingested_at,
        claim_delta,
    }
}

/// Recompute consensus label and confidence, weighting each member's result
/// by its source's current credibility. Members without a result carry no
/// weight. Reads the ledger fresh each time; credibility is never cached
/// across passes.
async fn refresh_consensus(story: &mut Story, members: &[&MemberRecord], ledger: &CredibilityLedger) {
    let mut label_weight: HashMap<VerdictLabel, f64> = HashMap::new();
    let mut weighted_confidence = 0.0;
    let mut total_weight = 0.0;

    for member in members {
        let Some(label) = member.label else { continue };
        let weight = ledger.get(&member.source).await.score;
        *label_weight.entry(label).or_insert(0.0) += weight;
        weighted_confidence += weight * member.confidence;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        story.consensus_label = None;
        story.consensus_confidence = 0.0;
        return;
    }

    let supported = label_weight.get(&VerdictLabel::Supported).copied().unwrap_or(0.0);
    let contradicted = label_weight
        .get(&VerdictLabel::Contradicted)
        .copied()
        .unwrap_or(0.0);

    let label = if supported > 0.0 && (supported - contradicted).abs() < 1e-9 {
        VerdictLabel::Unverifiable
    } else {
        label_weight
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| *label)
            .unwrap_or(VerdictLabel::Unverifiable)
    };

    story.consensus_label = Some(label);
    story.consensus_confidence = (weighted_confidence / total_weight).clamp(0.0, 1.0);
}

/// Keep the terms most shared across member fingerprints.
fn refresh_keywords(story: &mut Story, members: &[&MemberRecord]) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for member in members {
        for keyword in &member.fingerprint.keywords {
            *counts.entry(keyword.as_str()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    story.keywords = ranked.into_iter().take(16).map(|(w, _)| w.to_string()).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::fingerprint;
    use chrono::TimeZone;

    const EVENT: &str = "Startup Acme raised fifty million dollars in a funding round led by \
        Firm Y, the company announced on Tuesday. The round values Acme at four \
        hundred million dollars and will fund expansion into Europe.";

    fn member(id: &str, source: &str, text: &str, hour: u32) -> MemberRecord {
        MemberRecord {
            article_id: id.to_string(),
            source: source.to_string(),
            published_at: Utc.with_ymd_and_hms(2025, 5, 6, hour, 0, 0).unwrap(),
            ingested_at: Utc.with_ymd_and_hms(2025, 5, 6, hour, 30, 0).unwrap(),
            fingerprint: fingerprint(text),
            label: Some(VerdictLabel::Supported),
            confidence: 0.8,
            claims: vec![format!("claim from {id}")],
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn test_first_article_creates_singleton() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        let outcome = correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        assert!(outcome.created);
        let story = index.story(&outcome.story_id).await.unwrap();
        assert_eq!(story.article_ids, vec!["a1"]);
        assert_eq!(story.timeline.len(), 1);
        assert_eq!(story.consensus_label, Some(VerdictLabel::Supported));
    }

    #[tokio::test]
    async fn test_near_duplicate_joins_with_ordered_timeline() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();

        // Same prose, two hours later.
        let outcome = correlate_article(&index, member("a2", "npr", EVENT, 10), &ledger, &config())
            .await
            .unwrap();
        assert!(!outcome.created);
        assert!(outcome.near_duplicate);
        assert!(outcome.score >= 0.9);

        let story = index.story(&outcome.story_id).await.unwrap();
        assert_eq!(story.article_ids.len(), 2);
        assert_eq!(story.timeline.len(), 2);
        assert_eq!(story.timeline[0].article_id, "a1");
        assert_eq!(story.timeline[1].article_id, "a2");
    }

    #[tokio::test]
    async fn test_dissimilar_article_gets_own_story() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        let outcome = correlate_article(
            &index,
            member(
                "a2",
                "npr",
                "Severe storms battered the coast overnight, leaving thousands without \
                 power as crews cleared fallen trees from roads across the region.",
                9,
            ),
            &ledger,
            &config(),
        )
        .await
        .unwrap();
        assert!(outcome.created);
        assert_eq!(index.story_count().await, 2);
    }

    #[tokio::test]
    async fn test_join_is_order_independent() {
        let texts = [
            ("a1", EVENT),
            ("a2", EVENT),
            ("a3", EVENT),
        ];
        for order in [[0, 1, 2], [2, 0, 1], [1, 2, 0]] {
            let index = StoryIndex::new();
            let ledger = CredibilityLedger::new(0.5);
            for i in order {
                let (id, text) = texts[i];
                correlate_article(&index, member(id, "cnn", text, 8 + i as u32), &ledger, &config())
                    .await
                    .unwrap();
            }
            assert_eq!(index.story_count().await, 1, "order {order:?}");
            let story = index.story_for_article("a1").await.unwrap();
            assert_eq!(story.article_ids.len(), 3, "order {order:?}");
        }
    }

    #[tokio::test]
    async fn test_timeline_tie_breaks_on_ingestion() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        let mut first = member("a1", "cnn", EVENT, 8);
        let mut second = member("a2", "npr", EVENT, 8);
        // Same publication instant; a2 was ingested earlier.
        first.ingested_at = Utc.with_ymd_and_hms(2025, 5, 6, 9, 0, 0).unwrap();
        second.ingested_at = Utc.with_ymd_and_hms(2025, 5, 6, 8, 10, 0).unwrap();

        correlate_article(&index, first, &ledger, &config()).await.unwrap();
        let outcome = correlate_article(&index, second, &ledger, &config()).await.unwrap();

        let story = index.story(&outcome.story_id).await.unwrap();
        assert_eq!(story.timeline[0].article_id, "a2");
        assert_eq!(story.timeline[1].article_id, "a1");
    }

    #[tokio::test]
    async fn test_redelivery_is_noop() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        let first = correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        let again = correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        assert_eq!(first.story_id, again.story_id);
        assert!(!again.created);
        let story = index.story(&first.story_id).await.unwrap();
        assert_eq!(story.article_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_agreeing_join_raises_source_credibility() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        correlate_article(&index, member("a2", "agreeing-wire", EVENT, 9), &ledger, &config())
            .await
            .unwrap();
        assert!(ledger.get("agreeing-wire").await.score > 0.5);
    }

    #[tokio::test]
    async fn test_disagreeing_join_lowers_source_credibility() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        let mut contrarian = member("a2", "contrarian-wire", EVENT, 9);
        contrarian.label = Some(VerdictLabel::Contradicted);
        correlate_article(&index, contrarian, &ledger, &config()).await.unwrap();
        assert!(ledger.get("contrarian-wire").await.score < 0.5);
    }

    #[tokio::test]
    async fn test_unverified_article_joins_without_consensus_weight() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        let mut unverified = member("a2", "quiet-wire", EVENT, 9);
        unverified.label = None;
        unverified.confidence = 0.0;
        let outcome = correlate_article(&index, unverified, &ledger, &config()).await.unwrap();

        let story = index.story(&outcome.story_id).await.unwrap();
        assert_eq!(story.article_ids.len(), 2);
        assert_eq!(story.consensus_label, Some(VerdictLabel::Supported));
        // No agreement observation for a member without a result.
        assert_eq!(ledger.get("quiet-wire").await.samples, 0);
    }

    #[tokio::test]
    async fn test_candidate_window_excludes_stale_articles() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        let mut old = member("a1", "cnn", EVENT, 8);
        old.published_at = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        correlate_article(&index, old, &ledger, &config()).await.unwrap();

        // Same prose five days later lands outside the 72h window.
        let outcome = correlate_article(&index, member("a2", "npr", EVENT, 9), &ledger, &config())
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(index.story_count().await, 2);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let index = StoryIndex::new();
        let ledger = CredibilityLedger::new(0.5);
        correlate_article(&index, member("a1", "cnn", EVENT, 8), &ledger, &config())
            .await
            .unwrap();
        correlate_article(&index, member("a2", "npr", EVENT, 10), &ledger, &config())
            .await
            .unwrap();

        let snapshot = index.snapshot().await;
        let restored = StoryIndex::from_snapshot(
            serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap(),
        );
        assert_eq!(restored.story_count().await, 1);
        let story = restored.story_for_article("a2").await.unwrap();
        assert_eq!(story.article_ids.len(), 2);

        // Restored members still serve as candidates.
        let outcome = correlate_article(&restored, member("a3", "bbc", EVENT, 11), &ledger, &config())
            .await
            .unwrap();
        assert!(!outcome.created);
    }
}
