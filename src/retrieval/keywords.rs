//! Content tokenizer and stopword set for the topic-coherence filter.

use std::collections::BTreeSet;

/// Fixed English stopword set. Kept small and stable: the filter only needs
/// to keep function words from counting as shared topics.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "because",
    "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have",
    "he", "her", "his", "how", "if", "in", "into", "is", "it", "its", "just", "me", "more", "most",
    "my", "no", "not", "of", "on", "only", "or", "our", "out", "over", "she", "so", "some", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "up", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your",
];

/// Tokenise text into deduplicated content tokens.
///
/// Lowercases, splits on non-letter characters, drops tokens shorter than
/// two characters and stopwords.
#[must_use]
pub fn content_tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|token| token.len() >= 2)
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Number of tokens shared between two token sets.
#[must_use]
pub fn shared_keyword_count(a: &BTreeSet<String>, b: &BTreeSet<String>) -> usize {
    a.intersection(b).count()
}
