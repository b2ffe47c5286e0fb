//! Similarity Scoring
//!
//! Weighted exact-match comparison of two signal sets. Used offline, over
//! stored snapshots, to flag devices that are probably the same machine with
//! a slightly different fingerprint (browser update, new extension).
//!
//! Matching is exact per field: a one-character difference in the user agent
//! counts the same as a completely different one.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::logic::signals::SignalSet;

/// Default similarity threshold
pub const DEFAULT_THRESHOLD: f64 = constants::DEFAULT_SIMILARITY_THRESHOLD;

/// Default field weights (sum 1.0)
pub const DEFAULT_WEIGHTS: &[(&str, f64)] = &[
    ("userAgent", 0.30),
    ("screenResolution", 0.20),
    ("canvasFingerprint", 0.20),
    ("webglFingerprint", 0.15),
    ("audioFingerprint", 0.10),
    ("fonts", 0.05),
];

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult<K> {
    pub candidate: K,
    pub score: f64,
}

/// Weighted field scorer
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    weights: Vec<(String, f64)>,
    threshold: f64,
}

impl SimilarityScorer {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// Threshold from `FINGERPRINT_SIMILARITY_THRESHOLD`, else the default
    pub fn from_env() -> Self {
        Self::with_threshold(constants::get_similarity_threshold())
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            weights: DEFAULT_WEIGHTS
                .iter()
                .map(|(k, w)| (k.to_string(), *w))
                .collect(),
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Replace the weight table; non-positive weights are dropped
    pub fn with_weights<I, K>(mut self, weights: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.weights = weights
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(k, w)| (k.into(), w))
            .collect();
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score in [0, 1]
    ///
    /// Only fields present on both sides count toward the denominator. When
    /// no weighted field is comparable the score is 1.0 for identical sets
    /// and 0.0 otherwise.
    pub fn score(&self, a: &SignalSet, b: &SignalSet) -> f64 {
        let mut matched = 0.0;
        let mut total = 0.0;

        for (field, weight) in &self.weights {
            let (Some(left), Some(right)) = (a.get(field), b.get(field)) else {
                continue;
            };
            total += weight;
            if left == right {
                matched += weight;
            }
        }

        if total == 0.0 {
            return if a == b { 1.0 } else { 0.0 };
        }

        (matched / total).clamp(0.0, 1.0)
    }

    pub fn is_similar(&self, a: &SignalSet, b: &SignalSet) -> bool {
        self.score(a, b) >= self.threshold
    }

    /// Candidates scoring at or above the threshold, best first
    pub fn rank<'a, K, I>(&self, reference: &SignalSet, candidates: I) -> Vec<SimilarityResult<K>>
    where
        I: IntoIterator<Item = (K, &'a SignalSet)>,
    {
        let mut results: Vec<SimilarityResult<K>> = candidates
            .into_iter()
            .map(|(candidate, signals)| SimilarityResult {
                candidate,
                score: self.score(reference, signals),
            })
            .filter(|r| r.score >= self.threshold)
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::signals::SignalValue;

    fn device() -> SignalSet {
        let mut s = SignalSet::new();
        s.insert("userAgent", "Mozilla/5.0 Chrome/120");
        s.insert("screenResolution", "1920x1080");
        s.insert("canvasFingerprint", "0a1b2c3d4e5f6071");
        s.insert("webglFingerprint", r#"{"vendor":"Intel"}"#);
        s.insert("audioFingerprint", "8899aabbccddeeff");
        s.insert("fonts", "1122334455667788");
        s.insert("language", "en-US");
        s
    }

    #[test]
    fn test_identical_scores_one() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.score(&device(), &device()), 1.0);
        assert!(scorer.is_similar(&device(), &device()));
    }

    #[test]
    fn test_identical_without_weighted_fields_scores_one() {
        let scorer = SimilarityScorer::new();
        let mut a = SignalSet::new();
        a.insert("language", "en-US");
        assert_eq!(scorer.score(&a, &a.clone()), 1.0);

        let mut b = SignalSet::new();
        b.insert("language", "de-DE");
        assert_eq!(scorer.score(&a, &b), 0.0);
        assert_eq!(scorer.score(&SignalSet::new(), &SignalSet::new()), 1.0);
    }

    #[test]
    fn test_user_agent_change_only() {
        let scorer = SimilarityScorer::new();
        let mut other = device();
        other.insert("userAgent", "Mozilla/5.0 Chrome/121");

        let score = scorer.score(&device(), &other);
        assert!((score - 0.70).abs() < 1e-9);
        assert!(!scorer.is_similar(&device(), &other));
    }

    #[test]
    fn test_missing_field_excluded_from_denominator() {
        let scorer = SimilarityScorer::new();
        let mut partial = device();
        partial.remove("audioFingerprint");
        partial.remove("fonts");

        // Everything still present matches
        assert_eq!(scorer.score(&device(), &partial), 1.0);

        partial.insert("screenResolution", "1280x720");
        // 0.20 of the 0.85 comparable weight differs
        let score = scorer.score(&device(), &partial);
        assert!((score - 0.65 / 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_score_bounds() {
        let scorer = SimilarityScorer::new();
        let mut other = SignalSet::new();
        for (field, _) in DEFAULT_WEIGHTS {
            other.insert(*field, SignalValue::from("different"));
        }
        let score = scorer.score(&device(), &other);
        assert_eq!(score, 0.0);
        assert!((0.0..=1.0).contains(&scorer.score(&device(), &SignalSet::new())));
    }

    #[test]
    fn test_rank_orders_and_filters() {
        let scorer = SimilarityScorer::with_threshold(0.5);

        let same = device();
        let mut close = device();
        close.insert("fonts", "ffffffffffffffff");
        let mut far = device();
        far.insert("userAgent", "curl/8.0");
        far.insert("screenResolution", "800x600");
        far.insert("canvasFingerprint", "0000000000000000");

        let ranked = scorer.rank(
            &device(),
            [("far", &far), ("close", &close), ("same", &same)],
        );

        let names: Vec<&str> = ranked.iter().map(|r| r.candidate).collect();
        assert_eq!(names, vec!["same", "close"]);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_custom_weights() {
        let scorer = SimilarityScorer::new().with_weights([("language", 1.0), ("ignored", 0.0)]);
        let mut other = device();
        other.insert("userAgent", "anything");
        assert_eq!(scorer.score(&device(), &other), 1.0);
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(SimilarityScorer::with_threshold(1.7).threshold(), 1.0);
        assert_eq!(SimilarityScorer::with_threshold(-0.2).threshold(), 0.0);
    }

    #[test]
    fn test_threshold_from_env() {
        std::env::set_var("FINGERPRINT_SIMILARITY_THRESHOLD", "0.65");
        assert_eq!(SimilarityScorer::from_env().threshold(), 0.65);

        std::env::set_var("FINGERPRINT_SIMILARITY_THRESHOLD", "2.5");
        assert_eq!(SimilarityScorer::from_env().threshold(), DEFAULT_THRESHOLD);

        std::env::remove_var("FINGERPRINT_SIMILARITY_THRESHOLD");
        assert_eq!(SimilarityScorer::from_env().threshold(), DEFAULT_THRESHOLD);
    }
}
