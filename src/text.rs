//! Text normalization shared by the rule engine, the feature extractor, and inference.

use regex::Regex;
use std::sync::OnceLock;

/// Characters stripped from the end of a token before suffix matching.
pub const TRAILING_PUNCTUATION: &[char] = &['.', ',', ')', '/', ']', '}', '»', '”', '’', '"', '\''];

/// Trim and collapse every whitespace run into a single ASCII space.
pub fn normalize(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase `\w+` tokens used by the word n-gram view.
pub fn word_tokens(text: &str) -> Vec<String> {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let word = WORD.get_or_init(|| Regex::new(r"\w+").expect("word regex must compile"));
    let lowered = text.to_lowercase();
    word.find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// True when any whitespace token, after trailing punctuation is stripped, ends with a suffix.
pub fn any_token_has_suffix(text: &str, suffixes: &[String]) -> bool {
    if suffixes.is_empty() {
        return false;
    }
    text.split_whitespace().any(|token| {
        let token = token.trim_end_matches(TRAILING_PUNCTUATION);
        suffixes.iter().any(|suffix| token.ends_with(suffix.as_str()))
    })
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}
