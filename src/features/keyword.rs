//! Hand-engineered keyword count features.

use crate::labeling::KeywordRuleEngine;
use crate::text;

/// Number of keyword features appended after the TF-IDF views.
pub const KEYWORD_FEATURE_COUNT: usize = 8;

/// Feature names in column order.
pub const KEYWORD_FEATURE_NAMES: [&str; KEYWORD_FEATURE_COUNT] = [
    "finished_hits",
    "ingredient_hits",
    "any_finished",
    "any_ingredient",
    "conflict",
    "score",
    "token_count",
    "char_count",
];

/// Keyword counts of a whitespace-normalized name, in `KEYWORD_FEATURE_NAMES` order.
pub fn keyword_features(engine: &KeywordRuleEngine, normalized: &str) -> [f64; KEYWORD_FEATURE_COUNT] {
    let mut finished: usize = engine
        .dominant_literals()
        .iter()
        .map(|literal| text::count_occurrences(normalized, literal))
        .sum();
    if text::any_token_has_suffix(normalized, engine.dominant_suffixes()) {
        finished += 1;
    }
    let ingredient: usize = engine
        .fallback_literals()
        .iter()
        .map(|literal| text::count_occurrences(normalized, literal))
        .sum();
    let any_finished = finished > 0;
    let any_ingredient = ingredient > 0;
    [
        finished as f64,
        ingredient as f64,
        flag(any_finished),
        flag(any_ingredient),
        flag(any_finished && any_ingredient),
        finished as f64 - ingredient as f64,
        normalized.split_whitespace().count() as f64,
        normalized.chars().count() as f64,
    ]
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}
