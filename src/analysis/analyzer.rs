use rust_stemmers::Algorithm;
use crate::analysis::filters::{LowercaseFilter, StemmerFilter, StopWordFilter, TokenFilter};
use crate::analysis::tokenizer::{Tokenizer, WordTokenizer};

/// Text analysis pipeline used by full-text columns and the document index.
pub struct Analyzer {
    tokenizer: Box<dyn Tokenizer>,
    filters: Vec<Box<dyn TokenFilter>>,
}

impl Analyzer {
    pub fn new(tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Terms of `text` in source order, duplicates kept.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.filters.iter().fold(self.tokenizer.tokenize(text), |terms, filter| filter.apply(terms))
    }

    /// Distinct terms of `text`, sorted.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let mut terms = self.analyze(text);
        terms.sort_unstable();
        terms.dedup();
        terms
    }

    /// Lowercase, English stop words, Snowball English stemming.
    pub fn standard_english() -> Self {
        Analyzer::new(Box::new(WordTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
            .add_filter(Box::new(StopWordFilter::english()))
            .add_filter(Box::new(StemmerFilter::new(Algorithm::English)))
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::standard_english()
    }
}
