//! Sliding-window n-gram extraction.
//!
//! For every token position the extractor emits each contiguous phrase that
//! starts there, from length 1 up to the configured maximum order, stopping
//! at the end of the document.
//!
//! # Example
//!
//! ```text
//! "a b c" with max order 5 -> "a", "a b", "a b c", "b", "b c", "c"
//! ```
//!
//! A document of `n` tokens yields `max(0, n - k + 1)` phrases of order `k`.

/// Longest phrase the model is built over.
pub const MAX_ORDER: usize = 5;

/// Number of space-separated tokens in a phrase.
pub fn order(phrase: &str) -> usize {
    phrase.split(' ').filter(|token| !token.is_empty()).count()
}

/// Emits every phrase of length `1..=max_order` from cleaned text.
#[derive(Debug, Clone, Copy)]
pub struct NgramExtractor {
    max_order: usize,
}

impl NgramExtractor {
    pub fn new(max_order: usize) -> Self {
        Self {
            max_order: max_order.clamp(1, MAX_ORDER),
        }
    }

    /// Extract all n-grams from whitespace-tokenized text.
    ///
    /// Phrases are returned in emission order: by start position, then by
    /// increasing length. Empty text yields nothing.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut ngrams = Vec::with_capacity(tokens.len() * self.max_order);

        for start in 0..tokens.len() {
            let mut phrase = String::new();
            for token in tokens[start..].iter().take(self.max_order) {
                if !phrase.is_empty() {
                    phrase.push(' ');
                }
                phrase.push_str(token);
                ngrams.push(phrase.clone());
            }
        }

        ngrams
    }
}

impl Default for NgramExtractor {
    fn default() -> Self {
        Self::new(MAX_ORDER)
    }
}
