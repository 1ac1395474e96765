//! Deterministic keyword rules used to seed training labels.

use super::keywords::KeywordLists;
use crate::text;

/// Outcome of applying the keyword rules to one product name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleVerdict {
    /// A dominant literal or suffix matched; wins over any fallback match.
    Dominant,
    Fallback,
    Abstain,
}

/// Keyword rule engine for one label stage.
#[derive(Debug, Clone)]
pub struct KeywordRuleEngine {
    dominant_literals: Vec<String>,
    dominant_suffixes: Vec<String>,
    fallback_literals: Vec<String>,
}

impl KeywordRuleEngine {
    pub fn new(lists: &KeywordLists) -> Self {
        let split = lists.split_dominant();
        Self {
            dominant_literals: split.literals,
            dominant_suffixes: split.suffixes,
            fallback_literals: lists.fallback_literals(),
        }
    }

    pub fn dominant_literals(&self) -> &[String] {
        &self.dominant_literals
    }

    pub fn dominant_suffixes(&self) -> &[String] {
        &self.dominant_suffixes
    }

    pub fn fallback_literals(&self) -> &[String] {
        &self.fallback_literals
    }

    /// Classify a product name. Dominant keywords are checked first.
    pub fn classify(&self, name: &str) -> RuleVerdict {
        let normalized = text::normalize(name);
        if self.matches_dominant(&normalized) {
            RuleVerdict::Dominant
        } else if self.matches_fallback(&normalized) {
            RuleVerdict::Fallback
        } else {
            RuleVerdict::Abstain
        }
    }

    /// True when a dominant literal is contained or a token ends with a registered suffix.
    pub fn matches_dominant(&self, normalized: &str) -> bool {
        self.dominant_literals
            .iter()
            .any(|literal| normalized.contains(literal.as_str()))
            || text::any_token_has_suffix(normalized, &self.dominant_suffixes)
    }

    pub fn matches_fallback(&self, normalized: &str) -> bool {
        self.fallback_literals
            .iter()
            .any(|literal| normalized.contains(literal.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> KeywordRuleEngine {
        KeywordRuleEngine::new(&KeywordLists::new(
            ["컵라면", "세트", "%탕"],
            ["쌀", "콩", "떡"],
        ))
    }

    #[test]
    fn dominant_wins_over_fallback() {
        assert_eq!(engine().classify("즉석국 떡국세트"), RuleVerdict::Dominant);
    }

    #[test]
    fn fallback_when_no_dominant_keyword() {
        assert_eq!(engine().classify("흰쌀20kg"), RuleVerdict::Fallback);
        assert_eq!(engine().classify("국산콩"), RuleVerdict::Fallback);
    }

    #[test]
    fn suffix_matches_token_end_only() {
        let engine = engine();
        assert_eq!(engine.classify("불닭볶음탕"), RuleVerdict::Dominant);
        assert_eq!(engine.classify("탕수육"), RuleVerdict::Abstain);
        assert_eq!(engine.classify("얼큰 감자탕)"), RuleVerdict::Dominant);
    }

    #[test]
    fn abstains_without_any_keyword() {
        assert_eq!(engine().classify("무선 청소기"), RuleVerdict::Abstain);
        assert_eq!(engine().classify("   "), RuleVerdict::Abstain);
    }

    #[test]
    fn whitespace_is_normalized_before_matching() {
        let engine = KeywordRuleEngine::new(&KeywordLists::new(["즉석 국"], Vec::<String>::new()));
        assert_eq!(engine.classify("즉석 \t  국"), RuleVerdict::Dominant);
    }
}
