use std::collections::HashSet;
use rust_stemmers::{Algorithm, Stemmer};

/// One stage of the analysis pipeline.
pub trait TokenFilter: Send + Sync {
    fn apply(&self, terms: Vec<String>) -> Vec<String>;
}

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn apply(&self, terms: Vec<String>) -> Vec<String> {
        terms.into_iter().map(|t| t.to_lowercase()).collect()
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for",
    "from", "has", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "were", "will", "with",
];

/// Drops stop words. Expects lowercased input.
pub struct StopWordFilter {
    words: HashSet<&'static str>,
}

impl StopWordFilter {
    pub fn english() -> Self {
        StopWordFilter {
            words: ENGLISH_STOP_WORDS.iter().copied().collect(),
        }
    }
}

impl TokenFilter for StopWordFilter {
    fn apply(&self, terms: Vec<String>) -> Vec<String> {
        terms.into_iter().filter(|t| !self.words.contains(t.as_str())).collect()
    }
}

/// Snowball stemming.
pub struct StemmerFilter {
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter {
            stemmer: Stemmer::create(algorithm),
        }
    }
}

impl TokenFilter for StemmerFilter {
    fn apply(&self, terms: Vec<String>) -> Vec<String> {
        terms.into_iter().map(|t| self.stemmer.stem(&t).into_owned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn stop_words_need_lowercase_first() {
        let stop = StopWordFilter::english();
        assert_eq!(stop.apply(terms(&["The", "the", "ledger"])), terms(&["The", "ledger"]));
        let lowered = LowercaseFilter.apply(terms(&["The", "Ledger"]));
        assert_eq!(stop.apply(lowered), terms(&["ledger"]));
    }

    #[test]
    fn english_stemming() {
        let stem = StemmerFilter::new(Algorithm::English);
        assert_eq!(stem.apply(terms(&["payments", "paid", "invoices"])), terms(&["payment", "paid", "invoic"]));
    }
}
