//! Lexical relevance helpers.
//!
//! Two tokenizers back the retrieval and mining paths: a cheap
//! whitespace tokenizer for "find similar past situations" queries, and a
//! stop-word-filtered keyword extractor used by the miner's keyword
//! strategy. Both are pure functions, so a semantic retriever could
//! replace the store-side lookup without changing either contract.

use regex::Regex;
use std::sync::OnceLock;

/// Tokens shorter than this carry too little signal to match on.
const MIN_TOKEN_LEN: usize = 3;

/// Cap on query tokens, bounding the cost of the OR-chain in SQL.
const MAX_SITUATION_TOKENS: usize = 10;

/// Common words that would otherwise dominate keyword frequency counts.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "was", "are", "has", "had", "but", "not",
    "you", "all", "can", "her", "his", "one", "our", "out", "day", "get", "got", "let", "may",
    "say", "she", "too", "use", "way", "who", "how", "its", "did", "now",
];

static WORD_RE: OnceLock<Regex> = OnceLock::new();

fn word_re() -> &'static Regex {
    WORD_RE.get_or_init(|| Regex::new(r"[a-z][a-z0-9_]+").expect("static pattern compiles"))
}

/// Tokenize a situation description for relevance retrieval.
///
/// Whitespace-delimited words, lower-cased, length >= 3, capped to the
/// first 10. An empty result means "match nothing", not an error.
pub fn situation_tokens(situation: &str) -> Vec<String> {
    situation
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
        .map(|w| w.to_lowercase())
        .take(MAX_SITUATION_TOKENS)
        .collect()
}

/// Extract meaningful keywords from decision context text.
///
/// Lower-cased alphanumeric runs (`[a-z][a-z0-9_]+`) with stop words
/// removed. Duplicates are preserved so callers can count occurrences.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_re()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|w| w.chars().count() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}
