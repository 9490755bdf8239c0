use unicode_segmentation::UnicodeSegmentation;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Splits on Unicode word boundaries (UAX #29). Words longer than
/// `max_token_length` bytes are dropped.
#[derive(Debug, Clone)]
pub struct WordTokenizer {
    pub max_token_length: usize,
}

impl Default for WordTokenizer {
    fn default() -> Self {
        WordTokenizer {
            max_token_length: 255,
        }
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .filter(|word| word.len() <= self.max_token_length)
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_word_boundaries() {
        let words = WordTokenizer::default().tokenize("Invoice #42, paid-in-full.");
        assert_eq!(words, vec!["Invoice", "42", "paid", "in", "full"]);
    }

    #[test]
    fn drops_overlong_words() {
        let tokenizer = WordTokenizer { max_token_length: 4 };
        assert_eq!(tokenizer.tokenize("tax invoice due"), vec!["tax", "due"]);
    }
}
