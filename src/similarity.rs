//! Content fingerprints and pairwise article similarity.
//!
//! Two-tier comparison, cheap tier first:
//!
//! 1. **Near-duplicate**: a minhash signature over 3-token shingles
//!    estimates Jaccard similarity of the shingle sets. Syndicated and
//!    re-published copies score high here; at or above the configured
//!    near-duplicate threshold the estimate short-circuits as the final
//!    score and the topical tier is skipped.
//! 2. **Topical**: keyword-signature overlap (Jaccard over the top terms)
//!    scaled by the configured topical weight, for articles that cover the
//!    same event without sharing prose.
//!
//! Fingerprints are computed once at ingestion and never change, so a new
//! article is compared only against the fingerprints of a bounded candidate
//! set rather than re-reading any article body.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::EngineConfig;
use crate::models::Fingerprint;
use crate::utils::tokenize;

/// Number of salted hash slots in a minhash signature.
const SIGNATURE_WIDTH: u64 = 64;

/// Number of tokens per shingle.
const SHINGLE_LEN: usize = 3;

/// Number of keywords kept in the topical signature.
const KEYWORD_COUNT: usize = 16;

/// Outcome of comparing two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    /// Final similarity in [0, 1].
    pub score: f64,
    /// True when the minhash estimate alone crossed the near-duplicate
    /// threshold (topical comparison was skipped).
    pub near_duplicate: bool,
}

fn salted_hash(shingle: &[String], salt: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    salt.hash(&mut hasher);
    for token in shingle {
        token.hash(&mut hasher);
    }
    hasher.finish()
}

/// Compute an article's fingerprint from its body text.
///
/// Deterministic: the same text always produces the same fingerprint.
/// Bodies too short to shingle produce an empty minhash signature and
/// compare as dissimilar to everything.
pub fn fingerprint(text: &str) -> Fingerprint {
    let tokens = tokenize(text);

    let minhash = if tokens.len() >= SHINGLE_LEN {
        (0..SIGNATURE_WIDTH)
            .map(|salt| {
                tokens
                    .windows(SHINGLE_LEN)
                    .map(|shingle| salted_hash(shingle, salt))
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect()
    } else {
        Vec::new()
    };

    // Top terms by frequency; ties broken alphabetically for determinism.
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for token in &tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let keywords = ranked
        .into_iter()
        .take(KEYWORD_COUNT)
        .map(|(w, _)| w.to_string())
        .collect();

    Fingerprint { minhash, keywords }
}

/// Estimated Jaccard similarity of the two shingle sets.
fn minhash_estimate(a: &Fingerprint, b: &Fingerprint) -> f64 {
    if a.minhash.is_empty() || b.minhash.is_empty() || a.minhash.len() != b.minhash.len() {
        return 0.0;
    }
    let matching = a
        .minhash
        .iter()
        .zip(b.minhash.iter())
        .filter(|(x, y)| x == y)
        .count();
    matching as f64 / a.minhash.len() as f64
}

/// Jaccard overlap of the keyword signatures.
fn keyword_overlap(a: &Fingerprint, b: &Fingerprint) -> f64 {
    if a.keywords.is_empty() || b.keywords.is_empty() {
        return 0.0;
    }
    let left: HashSet<&str> = a.keywords.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.keywords.iter().map(String::as_str).collect();
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

/// Compare two fingerprints.
///
/// The near-duplicate estimate is always computed first; at or above
/// `near_duplicate_threshold` it short-circuits as the score. Otherwise the
/// score is the larger of the estimate and the scaled keyword overlap, so a
/// heavily rewritten syndication still scores by prose overlap while
/// independent coverage of the same event scores by topic.
pub fn similarity(a: &Fingerprint, b: &Fingerprint, config: &EngineConfig) -> SimilarityScore {
    let estimate = minhash_estimate(a, b);
    if estimate >= config.near_duplicate_threshold {
        return SimilarityScore {
            score: estimate,
            near_duplicate: true,
        };
    }

    let topical = keyword_overlap(a, b) * config.topical_weight;
    SimilarityScore {
        score: estimate.max(topical).clamp(0.0, 1.0),
        near_duplicate: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FUNDING: &str = "Startup Acme raised fifty million dollars in a funding round led by \
         Firm Y, the company announced on Tuesday. The round values Acme at \
         four hundred million dollars and will fund expansion into Europe.";

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_identical_text_is_near_duplicate() {
        let a = fingerprint(FUNDING);
        let b = fingerprint(FUNDING);
        let sim = similarity(&a, &b, &config());
        assert!(sim.near_duplicate);
        assert!((sim.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lightly_edited_copy_scores_high() {
        let edited = format!("{FUNDING} Analysts called the valuation ambitious.");
        let a = fingerprint(FUNDING);
        let b = fingerprint(&edited);
        let sim = similarity(&a, &b, &config());
        assert!(sim.score > 0.7, "score was {}", sim.score);
    }

    #[test]
    fn test_unrelated_text_scores_low() {
        let a = fingerprint(FUNDING);
        let b = fingerprint(
            "Severe storms battered the coast overnight, leaving thousands \
             without power as emergency crews cleared fallen trees from roads.",
        );
        let sim = similarity(&a, &b, &config());
        assert!(!sim.near_duplicate);
        assert!(sim.score < 0.3, "score was {}", sim.score);
    }

    #[test]
    fn test_same_event_different_prose_scores_topically() {
        let a = fingerprint(FUNDING);
        let b = fingerprint(
            "Firm Y led a fifty million dollars investment into startup Acme, \
             a funding deal the company says values Acme near four hundred \
             million dollars as it pursues expansion across Europe.",
        );
        let sim = similarity(&a, &b, &config());
        assert!(!sim.near_duplicate);
        assert!(sim.score > 0.4, "score was {}", sim.score);
    }

    #[test]
    fn test_empty_body_compares_as_dissimilar() {
        let a = fingerprint("");
        let b = fingerprint(FUNDING);
        let sim = similarity(&a, &b, &config());
        assert_eq!(sim.score, 0.0);
        assert!(!sim.near_duplicate);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint(FUNDING);
        let b = fingerprint(FUNDING);
        assert_eq!(a, b);
    }

    #[test]
    fn test_keywords_capped_and_ranked() {
        let fp = fingerprint(FUNDING);
        assert!(fp.keywords.len() <= KEYWORD_COUNT);
        assert!(fp.keywords.contains(&"million".to_string()));
    }

    #[test]
    fn test_score_bounds() {
        let texts = [FUNDING, "", "one two", "alpha beta gamma delta epsilon"];
        for x in &texts {
            for y in &texts {
                let sim = similarity(&fingerprint(x), &fingerprint(y), &config());
                assert!((0.0..=1.0).contains(&sim.score));
            }
        }
    }
}
