//! Canned fallback answers.
//!
//! The catalog answers short questions directly and covers every upstream
//! failure, so it must never be empty.

use crate::random::RandomSource;

/// Fixed set of oracle phrases shipped with the bot.
pub const DEFAULT_ANSWERS: [&str; 7] = [
    "Да, звёзды благосклонны.",
    "Нет, сейчас не время.",
    "Возможно, но не торопись.",
    "Ответ скрыт в тумане, спроси позже.",
    "Доверься своему сердцу.",
    "Знаки указывают на перемены.",
    "Судьба ещё не решила.",
];

/// Read-only, process-wide collection of fallback answers.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCatalog {
    answers: &'static [&'static str],
}

impl Default for ResponseCatalog {
    fn default() -> Self {
        Self {
            answers: &DEFAULT_ANSWERS,
        }
    }
}

impl ResponseCatalog {
    /// Uniformly pick one answer using a single draw from `rng`.
    pub fn draw(&self, rng: &dyn RandomSource) -> &'static str {
        self.answers[rng.next_index(self.answers.len())]
    }

    pub fn contains(&self, text: &str) -> bool {
        self.answers.contains(&text)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn answers(&self) -> &'static [&'static str] {
        self.answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;

    #[test]
    fn default_catalog_has_seven_phrases() {
        let catalog = ResponseCatalog::default();
        assert_eq!(catalog.len(), 7);
        assert!(catalog.answers().iter().all(|a| !a.trim().is_empty()));
    }

    #[test]
    fn draw_uses_one_sample() {
        let catalog = ResponseCatalog::default();
        let rng = ScriptedRandom::new(vec![0.0]);
        assert_eq!(catalog.draw(&rng), DEFAULT_ANSWERS[0]);
        assert_eq!(rng.draws(), 1);
    }

    #[test]
    fn draw_covers_last_phrase() {
        let catalog = ResponseCatalog::default();
        let rng = ScriptedRandom::new(vec![0.99]);
        assert_eq!(catalog.draw(&rng), DEFAULT_ANSWERS[6]);
    }
}
