//! Answer matching engine
//!
//! This module owns the current question's accepted answers and decides
//! whether free-text input names one of them despite typos, word order,
//! and paraphrase. Matching proceeds through four tiers: exact base-form
//! equality, synonym redirect, weighted fuzzy scoring, and a single-word
//! Jaro-Winkler fallback. The engine is synchronous and holds no state
//! beyond the loaded question, so it is safe to reason about
//! single-threaded inside its owning lobby.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    bank::QuestionBank,
    constants::question::MAX_ANSWER_SLOTS,
    text::{Lexicon, SynonymSource},
};

/// Answers with at least this many stems get a keyword set
const MIN_WORDS_FOR_KEYWORD_LOGIC: usize = 2;
/// Keyword evidence below this contributes nothing
const MIN_KEYWORD_QUALITY_THRESHOLD: f64 = 0.35;

/// Weight of edit-distance similarity in the combined confidence
const WEIGHT_LEVENSHTEIN_SIMILARITY: f64 = 0.25;
/// Weight of Jaro-Winkler similarity in the combined confidence
const WEIGHT_JARO_WINKLER: f64 = 0.15;
/// Weight of token-set Jaccard similarity in the combined confidence
const WEIGHT_JACCARD_TOKEN_SET: f64 = 0.25;
/// Weight of keyword evidence in the combined confidence
const WEIGHT_KEYWORD_SCORE: f64 = 0.35;

/// Acceptance threshold for single-word comparisons
const MIN_ACCEPTABLE_COMBINED_SCORE: f64 = 0.58;
/// Acceptance threshold once either side is a multi-word phrase
const MIN_ACCEPTABLE_PHRASE_SCORE: f64 = 0.60;
/// Jaro-Winkler floor for the single-word fallback tier
const FALLBACK_SINGLE_WORD_JARO_WINKLER: f64 = 0.85;
/// Confidence assigned outright when keyword containment is strong
const STRONG_PARTIAL_KEYWORD_CONFIDENCE: f64 = 0.75;
/// Keyword coverage required for the strong-partial shortcut
const MIN_COVERAGE_FOR_STRONG_PARTIAL: f64 = 0.40;

/// One accepted answer of the current question
///
/// Immutable once a question is loaded. The display-order index runs
/// 0..6; index 0 is the top-ranked answer and carries initial-control
/// significance in the round state machine.
#[derive(Debug, Clone)]
pub struct AcceptedAnswer {
    /// Original display text, trimmed
    pub text: String,
    /// Points awarded for naming this answer
    pub points: u32,
    /// Rank position on the board (0 = top answer); blank slots are
    /// skipped, so this always equals the reveal-ledger position
    pub index: usize,
    /// Canonical base form used for equality comparisons
    pub base_form: String,
    /// Cached word stems of the display text
    tokens: Vec<String>,
}

/// The verdict for one submission
///
/// This single tagged type is produced by the engine, by quizmaster
/// rulings, and by countdown timeouts alike, so the round state machine
/// has exactly one code path regardless of where a verdict came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MatchOutcome {
    /// The input named an accepted answer
    Hit {
        /// Points carried by the matched answer
        points: u32,
        /// The matched answer's original display text
        text: String,
        /// The matched answer's display-order index
        index: usize,
        /// The matched answer's canonical base form
        base_form: String,
    },
    /// The input named nothing on the board
    Miss,
}

impl MatchOutcome {
    fn hit(answer: &AcceptedAnswer) -> Self {
        Self::Hit {
            points: answer.points,
            text: answer.text.clone(),
            index: answer.index,
            base_form: answer.base_form.clone(),
        }
    }

    /// Returns true when the outcome names an answer
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

/// Errors that can occur while drawing a question
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The bank has no questions left for this category at all
    #[error("question pool is exhausted")]
    Exhausted,
}

/// Derives the accepted edit distance from the answer's length
///
/// Short answers tolerate no typos at all; longer answers tolerate up to
/// four edits.
fn adaptive_levenshtein_threshold(answer_length: usize) -> usize {
    match answer_length {
        0..=1 => 0,
        2..=5 => 1,
        6..=7 => 2,
        8..=10 => 3,
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        _ => 4.min((answer_length as f64 * 0.30).ceil() as usize),
    }
}

/// Jaccard similarity of two sets
///
/// Two empty sets count as identical.
fn jaccard(first: &HashSet<&str>, second: &HashSet<&str>) -> f64 {
    if first.is_empty() && second.is_empty() {
        return 1.0;
    }
    if first.is_empty() || second.is_empty() {
        return 0.0;
    }
    let intersection = first.intersection(second).count();
    let union = first.union(second).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

/// Scores the overlap between input stems and an answer's keyword set
///
/// Returns the raw score and whether it qualifies as a strong partial
/// match (full containment with enough coverage).
fn keyword_score(input_tokens: &HashSet<&str>, expected: &HashSet<&str>) -> (f64, bool) {
    if input_tokens.is_subset(expected) && !input_tokens.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let coverage = input_tokens.len() as f64 / expected.len() as f64;
        let score = 0.70 + 0.30 * coverage;
        let strong =
            coverage >= MIN_COVERAGE_FOR_STRONG_PARTIAL && score >= MIN_KEYWORD_QUALITY_THRESHOLD;
        (score, strong)
    } else {
        (jaccard(input_tokens, expected), false)
    }
}

/// The matching engine for one lobby
///
/// Holds the current question, its accepted answers, the merged keyword
/// vocabulary per answer, and the synonym redirect table. All of it is
/// rebuilt wholesale on every [`MatchEngine::load_question`] call and
/// never partially mutated.
#[derive(Debug, Default)]
pub struct MatchEngine {
    question: Option<(u32, String)>,
    answers: Vec<AcceptedAnswer>,
    /// Answer base form -> merged stems of the answer and its synonyms
    keywords: HashMap<String, HashSet<String>>,
    /// Synonym base form -> target answer base form
    synonyms: HashMap<String, String>,
}

impl MatchEngine {
    /// Creates an engine with no question loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// The loaded question's id, if any
    pub fn question_id(&self) -> Option<u32> {
        self.question.as_ref().map(|(id, _)| *id)
    }

    /// The loaded question's text, if any
    pub fn question_text(&self) -> Option<&str> {
        self.question.as_ref().map(|(_, text)| text.as_str())
    }

    /// The accepted answers of the loaded question, in display order
    pub fn answers(&self) -> &[AcceptedAnswer] {
        &self.answers
    }

    /// Number of accepted answers on the board
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    /// Drops the loaded question and every derived table
    pub fn clear(&mut self) {
        self.question = None;
        self.answers.clear();
        self.keywords.clear();
        self.synonyms.clear();
    }

    /// Draws a question from the bank and prepares it for matching
    ///
    /// Questions whose id is in `exclude` are skipped; if that empties
    /// the pool the draw is retried once without exclusions, allowing
    /// question reuse once the pool is exhausted. All prior state is
    /// cleared before loading.
    ///
    /// For each non-blank answer slot this computes the base form, caches
    /// the answer's stems, builds the keyword set for multi-word answers,
    /// and records synonym redirects (merging multi-word synonym stems
    /// into the keyword set).
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Exhausted` when the bank has nothing to offer
    /// even without exclusions.
    pub fn load_question<B: QuestionBank, L: Lexicon, S: SynonymSource>(
        &mut self,
        bank: &B,
        lexicon: &L,
        synonym_source: &S,
        category: Option<&str>,
        exclude: &HashSet<u32>,
    ) -> Result<(), LoadError> {
        self.clear();

        let record = bank.pick(category, exclude).or_else(|| {
            if exclude.is_empty() {
                None
            } else {
                bank.pick(category, &HashSet::new())
            }
        });
        let Some(record) = record else {
            return Err(LoadError::Exhausted);
        };

        self.question = Some((record.id, record.text));

        for (text, points) in record.answers.into_iter().take(MAX_ANSWER_SLOTS) {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            let base_form = lexicon.base_form(trimmed);
            let tokens = lexicon.stemmed_tokens(trimmed, true);

            if tokens.len() >= MIN_WORDS_FOR_KEYWORD_LOGIC {
                self.keywords
                    .entry(base_form.clone())
                    .or_default()
                    .extend(tokens.iter().cloned());
            }

            self.answers.push(AcceptedAnswer {
                text: trimmed.to_owned(),
                points,
                index: self.answers.len(),
                base_form: base_form.clone(),
                tokens,
            });

            for synonym in synonym_source.synonyms_of(&trimmed.to_lowercase()) {
                let normalized = lexicon.base_form(&synonym);
                if normalized.is_empty()
                    || normalized == base_form
                    || self.answers.iter().any(|a| a.base_form == normalized)
                {
                    continue;
                }
                self.synonyms.insert(normalized, base_form.clone());
                let synonym_tokens = lexicon.stemmed_tokens(&synonym, true);
                if synonym_tokens.len() >= MIN_WORDS_FOR_KEYWORD_LOGIC {
                    self.keywords
                        .entry(base_form.clone())
                        .or_default()
                        .extend(synonym_tokens);
                }
            }
        }

        debug!(
            question_id = self.question_id(),
            answers = self.answers.len(),
            synonyms = self.synonyms.len(),
            "question loaded"
        );

        Ok(())
    }

    /// Scores a submission against the loaded question
    ///
    /// Blank input is always a miss. Otherwise the four matching tiers
    /// run in order and the first success wins; see the module docs.
    pub fn process_answer<L: Lexicon>(&self, lexicon: &L, input: &str) -> MatchOutcome {
        if input.trim().is_empty() {
            return MatchOutcome::Miss;
        }

        let normalized = lexicon.base_form(input);
        let input_tokens = lexicon.stemmed_tokens(input, true);

        // Tier 1: exact base-form equality
        for answer in &self.answers {
            if answer.base_form == normalized {
                return MatchOutcome::hit(answer);
            }
        }

        // Tier 2: synonym redirect
        if let Some(target) = self.synonyms.get(&normalized) {
            if let Some(answer) = self.answers.iter().find(|a| &a.base_form == target) {
                return MatchOutcome::hit(answer);
            }
        }

        // Tier 3: weighted fuzzy scoring, best single answer wins
        let input_token_set: HashSet<&str> = input_tokens.iter().map(String::as_str).collect();
        let mut best: Option<&AcceptedAnswer> = None;
        let mut best_confidence = 0.0_f64;

        for answer in &self.answers {
            if answer.base_form.is_empty() {
                continue;
            }

            let mut keyword_contribution = 0.0;
            let mut strong_partial = false;
            if let Some(expected) = self.keywords.get(&answer.base_form) {
                if !expected.is_empty() && !input_tokens.is_empty() {
                    let expected_set: HashSet<&str> =
                        expected.iter().map(String::as_str).collect();
                    let (score, strong) = keyword_score(&input_token_set, &expected_set);
                    strong_partial = strong;
                    if score >= MIN_KEYWORD_QUALITY_THRESHOLD {
                        keyword_contribution = score;
                    }
                }
            }

            let confidence = if strong_partial {
                STRONG_PARTIAL_KEYWORD_CONFIDENCE
            } else {
                let distance = strsim::levenshtein(&normalized, &answer.base_form);
                let allowed = adaptive_levenshtein_threshold(answer.base_form.chars().count());
                if distance > allowed {
                    0.0
                } else {
                    let max_len = normalized
                        .chars()
                        .count()
                        .max(answer.base_form.chars().count());
                    #[allow(clippy::cast_precision_loss)]
                    let edit_similarity = if max_len > 0 {
                        1.0 - distance as f64 / max_len as f64
                    } else {
                        1.0
                    };
                    let jw = if normalized.is_empty() || answer.base_form.is_empty() {
                        0.0
                    } else {
                        strsim::jaro_winkler(&normalized, &answer.base_form)
                    };
                    let answer_token_set: HashSet<&str> =
                        answer.tokens.iter().map(String::as_str).collect();
                    let token_jaccard = jaccard(&input_token_set, &answer_token_set);

                    WEIGHT_LEVENSHTEIN_SIMILARITY * edit_similarity
                        + WEIGHT_JARO_WINKLER * jw
                        + WEIGHT_JACCARD_TOKEN_SET * token_jaccard
                        + WEIGHT_KEYWORD_SCORE * keyword_contribution
                }
            };

            if confidence > best_confidence {
                best_confidence = confidence;
                best = Some(answer);
            }
        }

        let phrase_involved =
            input_tokens.len() > 1 || best.is_some_and(|a| a.base_form.contains(' '));
        let threshold = if phrase_involved {
            MIN_ACCEPTABLE_PHRASE_SCORE
        } else {
            MIN_ACCEPTABLE_COMBINED_SCORE
        };

        if let Some(answer) = best {
            if best_confidence >= threshold {
                return MatchOutcome::hit(answer);
            }
        }

        // Tier 4: single-word fallback on Jaro-Winkler alone
        if input_tokens.len() == 1 {
            for answer in &self.answers {
                if answer.base_form.split_whitespace().count() == 1
                    && strsim::jaro_winkler(&normalized, &answer.base_form)
                        >= FALLBACK_SINGLE_WORD_JARO_WINKLER
                {
                    return MatchOutcome::hit(answer);
                }
            }
        }

        MatchOutcome::Miss
    }

    /// Resolves a quizmaster's "correct" ruling into a verdict
    ///
    /// The quizmaster names the display text of the answer that was
    /// matched; the comparison is case-insensitive. Unknown text yields
    /// a miss.
    pub fn answer_by_text(&self, text: &str) -> MatchOutcome {
        let wanted = text.trim().to_lowercase();
        self.answers
            .iter()
            .find(|a| a.text.to_lowercase() == wanted)
            .map_or(MatchOutcome::Miss, MatchOutcome::hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{InMemoryBank, QuestionRecord};
    use crate::text::NoSynonyms;

    const STOP_WORDS: [&str; 4] = ["the", "a", "of", "and"];

    /// Lowercases, strips punctuation, and drops stopwords. Base form is
    /// the space-joined stem list.
    struct TestLexicon;

    impl Lexicon for TestLexicon {
        fn base_form(&self, text: &str) -> String {
            self.stemmed_tokens(text, true).join(" ")
        }

        fn stemmed_tokens(&self, text: &str, remove_stopwords: bool) -> Vec<String> {
            text.to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { ' ' })
                .collect::<String>()
                .split_whitespace()
                .filter(|token| !remove_stopwords || !STOP_WORDS.contains(token))
                .map(str::to_string)
                .collect()
        }
    }

    /// A synonym table backed by a fixed list
    struct TestSynonyms(Vec<(&'static str, Vec<&'static str>)>);

    impl SynonymSource for TestSynonyms {
        fn synonyms_of(&self, text: &str) -> Vec<String> {
            self.0
                .iter()
                .find(|(key, _)| *key == text)
                .map(|(_, list)| list.iter().map(|s| (*s).to_string()).collect())
                .unwrap_or_default()
        }
    }

    fn board() -> QuestionRecord {
        QuestionRecord {
            id: 7,
            text: "Name something you find in a kitchen".to_string(),
            answers: vec![
                ("Refrigerator".to_string(), 40),
                ("Statue of Liberty".to_string(), 25),
                ("Oven".to_string(), 15),
                ("  ".to_string(), 0),
                ("Elephant".to_string(), 10),
            ],
        }
    }

    fn loaded_engine() -> MatchEngine {
        let mut bank = InMemoryBank::new();
        bank.insert(None, board());
        let mut engine = MatchEngine::new();
        engine
            .load_question(&bank, &TestLexicon, &NoSynonyms, None, &HashSet::new())
            .unwrap();
        engine
    }

    #[test]
    fn test_blank_slots_are_skipped() {
        let engine = loaded_engine();
        assert_eq!(engine.answer_count(), 4);
        assert_eq!(engine.question_id(), Some(7));
        // Indices stay dense across skipped blanks, aligned with the board
        let indices: Vec<usize> = engine.answers().iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_exact_base_form_match() {
        let engine = loaded_engine();
        let outcome = engine.process_answer(&TestLexicon, "  REFRIGERATOR ");
        assert_eq!(
            outcome,
            MatchOutcome::Hit {
                points: 40,
                text: "Refrigerator".to_string(),
                index: 0,
                base_form: "refrigerator".to_string(),
            }
        );
    }

    #[test]
    fn test_blank_input_is_a_miss() {
        let engine = loaded_engine();
        assert_eq!(engine.process_answer(&TestLexicon, ""), MatchOutcome::Miss);
        assert_eq!(
            engine.process_answer(&TestLexicon, "   "),
            MatchOutcome::Miss
        );
    }

    #[test]
    fn test_unrelated_input_is_a_miss() {
        let engine = loaded_engine();
        assert_eq!(
            engine.process_answer(&TestLexicon, "spaceship"),
            MatchOutcome::Miss
        );
    }

    #[test]
    fn test_word_order_does_not_matter() {
        let engine = loaded_engine();
        // Full keyword containment with coverage 1.0 -> strong partial
        let outcome = engine.process_answer(&TestLexicon, "liberty statue");
        assert!(matches!(outcome, MatchOutcome::Hit { index: 1, .. }));
    }

    #[test]
    fn test_partial_phrase_still_matches() {
        let engine = loaded_engine();
        // One of two keywords: coverage 0.5 passes the strong-partial bar
        let outcome = engine.process_answer(&TestLexicon, "liberty");
        assert!(matches!(outcome, MatchOutcome::Hit { points: 25, .. }));
    }

    #[test]
    fn test_single_word_typo_falls_back_to_jaro_winkler() {
        let engine = loaded_engine();
        let outcome = engine.process_answer(&TestLexicon, "elefant");
        assert!(matches!(outcome, MatchOutcome::Hit { points: 10, .. }));
    }

    #[test]
    fn test_synonym_redirect() {
        let mut bank = InMemoryBank::new();
        bank.insert(
            None,
            QuestionRecord {
                id: 1,
                text: "Name a way to get to work".to_string(),
                answers: vec![("Car".to_string(), 50), ("Bike".to_string(), 30)],
            },
        );
        let synonyms = TestSynonyms(vec![("car", vec!["automobile", "motor vehicle"])]);
        let mut engine = MatchEngine::new();
        engine
            .load_question(&bank, &TestLexicon, &synonyms, None, &HashSet::new())
            .unwrap();

        let outcome = engine.process_answer(&TestLexicon, "automobile");
        assert!(matches!(outcome, MatchOutcome::Hit { points: 50, index: 0, .. }));

        // Multi-word synonym stems merge into the keyword set
        let outcome = engine.process_answer(&TestLexicon, "motor vehicle");
        assert!(matches!(outcome, MatchOutcome::Hit { points: 50, .. }));
    }

    #[test]
    fn test_synonym_colliding_with_another_answer_is_not_redirected() {
        let mut bank = InMemoryBank::new();
        bank.insert(
            None,
            QuestionRecord {
                id: 1,
                text: "q".to_string(),
                answers: vec![("Car".to_string(), 50), ("Automobile".to_string(), 30)],
            },
        );
        let synonyms = TestSynonyms(vec![("car", vec!["automobile"])]);
        let mut engine = MatchEngine::new();
        engine
            .load_question(&bank, &TestLexicon, &synonyms, None, &HashSet::new())
            .unwrap();

        // "automobile" is its own answer; the synonym must not shadow it
        let outcome = engine.process_answer(&TestLexicon, "automobile");
        assert!(matches!(outcome, MatchOutcome::Hit { points: 30, index: 1, .. }));
    }

    #[test]
    fn test_exclusion_set_relaxed_once_when_pool_is_exhausted() {
        let mut bank = InMemoryBank::new();
        bank.insert(None, board());

        let mut engine = MatchEngine::new();
        let exclude: HashSet<u32> = [7].into_iter().collect();
        // The only question is excluded, so the draw retries without
        // exclusions and reuses it.
        engine
            .load_question(&bank, &TestLexicon, &NoSynonyms, None, &exclude)
            .unwrap();
        assert_eq!(engine.question_id(), Some(7));
    }

    #[test]
    fn test_empty_bank_is_exhausted() {
        let bank = InMemoryBank::new();
        let mut engine = MatchEngine::new();
        assert_eq!(
            engine.load_question(&bank, &TestLexicon, &NoSynonyms, None, &HashSet::new()),
            Err(LoadError::Exhausted)
        );
        assert!(engine.question_id().is_none());
    }

    #[test]
    fn test_load_clears_previous_state() {
        let mut bank = InMemoryBank::new();
        bank.insert(Some("first"), board());
        bank.insert(
            Some("second"),
            QuestionRecord {
                id: 8,
                text: "q".to_string(),
                answers: vec![("Oak".to_string(), 60)],
            },
        );

        let mut engine = MatchEngine::new();
        engine
            .load_question(&bank, &TestLexicon, &NoSynonyms, Some("first"), &HashSet::new())
            .unwrap();
        engine
            .load_question(&bank, &TestLexicon, &NoSynonyms, Some("second"), &HashSet::new())
            .unwrap();

        assert_eq!(engine.question_id(), Some(8));
        assert_eq!(engine.answer_count(), 1);
        assert_eq!(
            engine.process_answer(&TestLexicon, "refrigerator"),
            MatchOutcome::Miss
        );
    }

    #[test]
    fn test_adaptive_threshold_table() {
        assert_eq!(adaptive_levenshtein_threshold(1), 0);
        assert_eq!(adaptive_levenshtein_threshold(3), 1);
        assert_eq!(adaptive_levenshtein_threshold(5), 1);
        assert_eq!(adaptive_levenshtein_threshold(7), 2);
        assert_eq!(adaptive_levenshtein_threshold(10), 3);
        assert_eq!(adaptive_levenshtein_threshold(20), 4);
    }

    #[test]
    fn test_jaccard_edges() {
        let empty: HashSet<&str> = HashSet::new();
        let some: HashSet<&str> = ["a"].into_iter().collect();
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&empty, &some), 0.0);
        assert_eq!(jaccard(&some, &some), 1.0);
    }

    #[test]
    fn test_keyword_score_monotonic_in_overlap() {
        let expected: HashSet<&str> = ["statue", "liberty", "york"].into_iter().collect();

        let one: HashSet<&str> = ["statue"].into_iter().collect();
        let two: HashSet<&str> = ["statue", "liberty"].into_iter().collect();
        let three: HashSet<&str> = ["statue", "liberty", "york"].into_iter().collect();

        let (score_one, _) = keyword_score(&one, &expected);
        let (score_two, _) = keyword_score(&two, &expected);
        let (score_three, _) = keyword_score(&three, &expected);

        assert!(score_one < score_two);
        assert!(score_two < score_three);

        // Outside containment the score degrades to Jaccard, still
        // monotonic in overlap.
        let mixed_low: HashSet<&str> = ["statue", "pigeon"].into_iter().collect();
        let mixed_high: HashSet<&str> = ["statue", "liberty", "pigeon"].into_iter().collect();
        let (low, strong_low) = keyword_score(&mixed_low, &expected);
        let (high, strong_high) = keyword_score(&mixed_high, &expected);
        assert!(!strong_low && !strong_high);
        assert!(low < high);
    }

    #[test]
    fn test_answer_by_text_resolution() {
        let engine = loaded_engine();

        let outcome = engine.answer_by_text("statue of liberty");
        assert!(matches!(outcome, MatchOutcome::Hit { index: 1, points: 25, .. }));

        assert_eq!(engine.answer_by_text("Microwave"), MatchOutcome::Miss);
    }
}
