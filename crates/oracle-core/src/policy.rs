//! Catalog-versus-upstream routing.
//!
//! Short questions are usually yes/no style and get a canned answer most of
//! the time; longer questions always go upstream.

use std::sync::Arc;

use crate::random::RandomSource;

/// Default word count at or below which a question counts as short.
pub const DEFAULT_SHORT_QUESTION_WORDS: usize = 7;

/// Default probability that a short question still goes upstream.  A draw
/// above this value routes the question to the catalog.
pub const DEFAULT_UPSTREAM_PROBABILITY: f64 = 0.3;

/// Probabilistic routing policy.
#[derive(Clone)]
pub struct DecisionPolicy {
    short_question_words: usize,
    upstream_probability: f64,
    rng: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for DecisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionPolicy")
            .field("short_question_words", &self.short_question_words)
            .field("upstream_probability", &self.upstream_probability)
            .finish_non_exhaustive()
    }
}

impl DecisionPolicy {
    pub fn new(
        short_question_words: usize,
        upstream_probability: f64,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            short_question_words,
            upstream_probability: upstream_probability.clamp(0.0, 1.0),
            rng,
        }
    }

    /// Policy with the default thresholds.
    pub fn with_rng(rng: Arc<dyn RandomSource>) -> Self {
        Self::new(
            DEFAULT_SHORT_QUESTION_WORDS,
            DEFAULT_UPSTREAM_PROBABILITY,
            rng,
        )
    }

    /// Returns `true` when the question should be sent to the upstream model.
    ///
    /// Long questions return `true` without drawing.  Short questions
    /// (including empty ones) consume exactly one sample and go to the
    /// catalog when the sample exceeds `upstream_probability`.
    pub fn should_consult_upstream(&self, question: &str) -> bool {
        let words = word_count(question);
        if words > self.short_question_words {
            return true;
        }

        let draw = self.rng.next_unit();
        let use_catalog = draw > self.upstream_probability;
        tracing::debug!(words, draw, use_catalog, "short question routing");
        !use_catalog
    }
}

/// Number of whitespace-delimited tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{ScriptedRandom, ThreadRandom};

    fn scripted(values: Vec<f64>) -> (Arc<ScriptedRandom>, DecisionPolicy) {
        let rng = Arc::new(ScriptedRandom::new(values));
        let policy = DecisionPolicy::with_rng(rng.clone());
        (rng, policy)
    }

    #[test]
    fn counts_words() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
        assert_eq!(word_count("Да?"), 1);
        assert_eq!(word_count("  будет\tли\nдождь  "), 3);
    }

    #[test]
    fn long_question_always_upstream_without_draw() {
        let (rng, policy) = scripted(vec![0.99]);
        let q = "Стоит ли мне менять работу в следующем году?";
        assert!(word_count(q) > 7);
        for _ in 0..100 {
            assert!(policy.should_consult_upstream(q));
        }
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn short_question_high_draw_uses_catalog() {
        let (rng, policy) = scripted(vec![0.5]);
        assert!(!policy.should_consult_upstream("Да?"));
        assert_eq!(rng.draws(), 1);
    }

    #[test]
    fn short_question_low_draw_goes_upstream() {
        let (_, policy) = scripted(vec![0.3]);
        assert!(policy.should_consult_upstream("Да?"));
        let (_, policy) = scripted(vec![0.1]);
        assert!(policy.should_consult_upstream("one two three four five six seven"));
    }

    #[test]
    fn empty_question_still_draws() {
        let (rng, policy) = scripted(vec![0.9]);
        assert!(!policy.should_consult_upstream(""));
        assert_eq!(rng.draws(), 1);
    }

    #[test]
    fn short_question_rate_close_to_seventy_percent() {
        let policy = DecisionPolicy::with_rng(Arc::new(ThreadRandom));
        let trials = 1000;
        let upstream = (0..trials)
            .filter(|_| policy.should_consult_upstream("Будет ли дождь?"))
            .count();
        let catalog_rate = 1.0 - upstream as f64 / trials as f64;
        assert!(
            (catalog_rate - 0.7).abs() < 0.07,
            "catalog rate {catalog_rate} too far from 0.7"
        );
    }

    #[test]
    fn probability_is_clamped() {
        let (_, policy) = {
            let rng = Arc::new(ScriptedRandom::new(vec![0.0]));
            (rng.clone(), DecisionPolicy::new(7, 5.0, rng))
        };
        assert_eq!(policy.upstream_probability, 1.0);
    }

    #[test]
    fn threshold_is_exact() {
        // Just above 0.3 in f64; must already count as a catalog draw.
        let (_, policy) = scripted(vec![0.300_000_000_000_000_04]);
        assert!(!policy.should_consult_upstream("Да?"));
        let (_, policy) = scripted(vec![0.3]);
        assert!(policy.should_consult_upstream("Да?"));
    }
}
