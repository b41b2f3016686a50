//! Lexical tokenization shared by the chunker, the lexical index and the
//! query analyzer.
//!
//! Tokens are maximal runs of alphanumeric characters, lowercased. This lines
//! up with the `unicode61` tokenizer used by the FTS5 projection.
use std::collections::BTreeMap;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for", "from",
    "has", "have", "how", "i", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or",
    "our", "should", "so", "that", "the", "their", "then", "there", "these", "this", "to", "was",
    "we", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Term-frequency map of a chunk's content.
pub fn term_frequencies(text: &str) -> BTreeMap<String, u32> {
    let mut freqs = BTreeMap::new();
    for token in tokenize(text) {
        *freqs.entry(token).or_insert(0) += 1;
    }
    freqs
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Distinct non-stopword tokens of a query, in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in tokenize(query) {
        if !is_stopword(&token) && !terms.contains(&token) {
            terms.push(token);
        }
    }
    terms
}
