//! Text canonicalization and synonym lookup collaborators
//!
//! The matching engine never inspects raw text itself; it relies on an
//! external lemmatizer/normalizer and an optional thesaurus. Both are
//! abstracted behind traits so hosts can plug in whatever language
//! tooling they run, the same way the transport is abstracted behind
//! [`crate::session::Tunnel`].

/// Canonicalizes free text for comparison purposes
///
/// Implementations are expected to lowercase, strip accents and
/// punctuation, lemmatize, and (optionally) drop stopwords. Two strings
/// that mean the same thing should produce the same base form.
pub trait Lexicon {
    /// Collapses text into a single canonical base form used for equality
    /// comparisons. Blank input must produce an empty string.
    fn base_form(&self, text: &str) -> String;

    /// Splits text into canonical word stems, in order of appearance.
    ///
    /// When `remove_stopwords` is true, function words carrying no meaning
    /// are dropped from the result.
    fn stemmed_tokens(&self, text: &str, remove_stopwords: bool) -> Vec<String>;
}

/// Looks up alternate phrasings for an answer
pub trait SynonymSource {
    /// Returns zero or more alternate phrases for the given text.
    fn synonyms_of(&self, text: &str) -> Vec<String>;
}

/// A synonym source that knows no synonyms
///
/// Useful for lobbies that run without a thesaurus; answer matching then
/// relies on base forms and fuzzy scoring alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSynonyms;

impl SynonymSource for NoSynonyms {
    fn synonyms_of(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }
}
