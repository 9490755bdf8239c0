//! Term extraction for full-text columns and the document index.

pub mod analyzer;
pub mod filters;
pub mod tokenizer;

pub use analyzer::Analyzer;
