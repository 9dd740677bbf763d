//! Best-effort keyphrase annotation for page titles.
//!
//! Extracted phrases are metadata only. They are never consulted when a
//! title is categorized, and a failure here never blocks an insert.

use std::collections::HashMap;

use regex::Regex;

use crate::config::KeyphraseConfig;

const TOKEN_PATTERN: &str = r"[\p{L}\p{N}]+(?:[.+#'-][\p{L}\p{N}]+)*";

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his",
    "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most",
    "my", "new", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "to", "too", "under", "until", "up", "use", "using", "very", "vs", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "you", "your", "yours",
];

#[derive(Debug, thiserror::Error)]
pub enum KeyphraseError {
    #[error("nothing to extract from an empty title")]
    EmptyInput,

    #[error("title has no candidate phrases")]
    NoCandidates,

    #[error("token pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub struct KeyphraseExtractor {
    token_re: Regex,
    top_n: usize,
    max_ngram: usize,
}

impl KeyphraseExtractor {
    pub fn new(config: &KeyphraseConfig) -> Result<Self, KeyphraseError> {
        Ok(Self {
            token_re: Regex::new(TOKEN_PATTERN)?,
            top_n: config.top_n,
            max_ngram: config.max_ngram.max(1),
        })
    }

    /// Extract up to `top_n` phrases of 1..=`max_ngram` words.
    ///
    /// Stop words are dropped before phrases are formed. Phrases are ranked by
    /// the summed frequency of their words, then by length (longer first),
    /// then by first occurrence.
    pub fn extract(&self, title: &str) -> Result<Vec<String>, KeyphraseError> {
        if title.trim().is_empty() {
            return Err(KeyphraseError::EmptyInput);
        }

        let tokens: Vec<String> = self
            .token_re
            .find_iter(title)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
            .collect();

        if tokens.is_empty() {
            return Err(KeyphraseError::NoCandidates);
        }

        let mut freq: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *freq.entry(token.as_str()).or_default() += 1;
        }

        // phrase -> (score, words, first position)
        let mut candidates: HashMap<String, (usize, usize, usize)> = HashMap::new();
        for n in 1..=self.max_ngram {
            for (pos, window) in tokens.windows(n).enumerate() {
                let phrase = window.join(" ");
                let score = window.iter().map(|t| freq[t.as_str()]).sum();
                candidates.entry(phrase).or_insert((score, n, pos));
            }
        }

        let mut ranked: Vec<(String, (usize, usize, usize))> = candidates.into_iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        Ok(ranked
            .into_iter()
            .take(self.top_n)
            .map(|(phrase, _)| phrase)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(top_n: usize, max_ngram: usize) -> KeyphraseExtractor {
        KeyphraseExtractor::new(&KeyphraseConfig {
            enabled: true,
            top_n,
            max_ngram,
        })
        .unwrap()
    }

    #[test]
    fn test_stop_words_removed() {
        let phrases = extractor(10, 1).extract("The state of the art").unwrap();
        assert_eq!(phrases, vec!["state".to_string(), "art".to_string()]);
    }

    #[test]
    fn test_bigrams_rank_above_unigrams() {
        let phrases = extractor(3, 2).extract("Rust async runtime").unwrap();
        assert_eq!(
            phrases,
            vec!["rust async".to_string(), "async runtime".to_string(), "rust".to_string()]
        );
    }

    #[test]
    fn test_repeated_word_scores_higher() {
        let phrases = extractor(1, 1).extract("Python tips: python packaging").unwrap();
        assert_eq!(phrases, vec!["python".to_string()]);
    }

    #[test]
    fn test_dotted_tokens_kept_whole() {
        let phrases = extractor(5, 1).extract("Next.js routing").unwrap();
        assert!(phrases.contains(&"next.js".to_string()));
    }

    #[test]
    fn test_empty_title_is_error() {
        assert!(matches!(
            extractor(3, 2).extract("   "),
            Err(KeyphraseError::EmptyInput)
        ));
    }

    #[test]
    fn test_only_stop_words_is_error() {
        assert!(matches!(
            extractor(3, 2).extract("what is this"),
            Err(KeyphraseError::NoCandidates)
        ));
    }
}
