//! Question bank collaborator
//!
//! A question bank hands out one question at a time: the question text,
//! its numeric id, and up to six scored answer slots. Production hosts
//! back this with a database; [`InMemoryBank`] is a small fastrand-backed
//! implementation suitable for tests and single-process deployments.

use std::collections::HashSet;

use itertools::Itertools;

/// One question as delivered by a bank
///
/// Answer slots are ordered by rank: slot 0 is the top answer. Blank
/// slots are permitted and skipped by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    /// Stable numeric id used for exclusion sets
    pub id: u32,
    /// The question text shown to players
    pub text: String,
    /// Up to six `(display text, points)` answer slots, rank order
    pub answers: Vec<(String, u32)>,
}

/// Source of questions for the matching engine
pub trait QuestionBank {
    /// Picks one question matching `category` (or any category when `None`)
    /// whose id is not in `exclude`. Returns `None` when no candidate
    /// exists. Which candidate is returned is up to the implementation;
    /// banks are expected to randomize.
    fn pick(&self, category: Option<&str>, exclude: &HashSet<u32>) -> Option<QuestionRecord>;
}

/// A question bank held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryBank {
    questions: Vec<(Option<String>, QuestionRecord)>,
}

impl InMemoryBank {
    /// Creates an empty bank
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a question under an optional category
    pub fn insert(&mut self, category: Option<&str>, record: QuestionRecord) {
        self.questions
            .push((category.map(std::borrow::ToOwned::to_owned), record));
    }

    /// Returns the number of stored questions
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Checks whether the bank holds no questions
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionBank for InMemoryBank {
    fn pick(&self, category: Option<&str>, exclude: &HashSet<u32>) -> Option<QuestionRecord> {
        let candidates = self
            .questions
            .iter()
            .filter(|(cat, _)| {
                category.map_or(true, |wanted| {
                    cat.as_deref()
                        .is_some_and(|c| c.eq_ignore_ascii_case(wanted))
                })
            })
            .filter(|(_, record)| !exclude.contains(&record.id))
            .collect_vec();

        candidates
            .get(fastrand::usize(..candidates.len().max(1)))
            .map(|(_, record)| record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32) -> QuestionRecord {
        QuestionRecord {
            id,
            text: format!("question {id}"),
            answers: vec![("answer".to_string(), 10)],
        }
    }

    #[test]
    fn test_pick_from_empty_bank() {
        let bank = InMemoryBank::new();
        assert!(bank.pick(None, &HashSet::new()).is_none());
    }

    #[test]
    fn test_pick_respects_category() {
        let mut bank = InMemoryBank::new();
        bank.insert(Some("history"), record(1));
        bank.insert(Some("sports"), record(2));

        let picked = bank.pick(Some("sports"), &HashSet::new()).unwrap();
        assert_eq!(picked.id, 2);

        assert!(bank.pick(Some("geography"), &HashSet::new()).is_none());
    }

    #[test]
    fn test_pick_category_is_case_insensitive() {
        let mut bank = InMemoryBank::new();
        bank.insert(Some("History"), record(1));

        assert!(bank.pick(Some("history"), &HashSet::new()).is_some());
    }

    #[test]
    fn test_pick_ignores_excluded_ids() {
        let mut bank = InMemoryBank::new();
        bank.insert(None, record(1));
        bank.insert(None, record(2));

        let exclude: HashSet<u32> = [1].into_iter().collect();
        for _ in 0..20 {
            assert_eq!(bank.pick(None, &exclude).unwrap().id, 2);
        }

        let all: HashSet<u32> = [1, 2].into_iter().collect();
        assert!(bank.pick(None, &all).is_none());
    }

    #[test]
    fn test_pick_without_category_sees_everything() {
        let mut bank = InMemoryBank::new();
        bank.insert(Some("history"), record(1));
        bank.insert(None, record(2));

        let seen: HashSet<u32> = (0..100)
            .filter_map(|_| bank.pick(None, &HashSet::new()))
            .map(|r| r.id)
            .collect();
        assert_eq!(seen, [1, 2].into_iter().collect());
    }
}
