//! Label types and weak labeling.
//!
//! Keyword rules bootstrap training labels before the model takes over.

pub mod keywords;
pub mod rules;

pub use keywords::{KeywordLists, load_keyword_file};
pub use rules::{KeywordRuleEngine, RuleVerdict};

use serde::{Deserialize, Serialize};

/// Binary label written to a flag column. Polarity: 1 = food / ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BinaryLabel {
    Negative = 0,
    Positive = 1,
}

impl BinaryLabel {
    pub const ALL: [BinaryLabel; 2] = [BinaryLabel::Negative, BinaryLabel::Positive];

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(BinaryLabel::Negative),
            1 => Some(BinaryLabel::Positive),
            _ => None,
        }
    }

    /// Decode a legacy manual-label cell.
    pub fn parse_manual(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "t" | "y" | "yes" | "ingredient" | "ing" | "food" => {
                Some(BinaryLabel::Positive)
            }
            "0" | "false" | "f" | "n" | "no" | "finished" | "fin" | "product" | "prod"
            | "notfood" => Some(BinaryLabel::Negative),
            _ => None,
        }
    }
}

impl From<BinaryLabel> for u8 {
    fn from(label: BinaryLabel) -> Self {
        label as u8
    }
}

impl TryFrom<u8> for BinaryLabel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        BinaryLabel::from_index(value as usize).ok_or_else(|| format!("invalid label {value}"))
    }
}

/// Provenance of a training example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    Manual,
    Rule,
    Pseudo,
    Model,
}

impl LabelSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelSource::Manual => "manual",
            LabelSource::Rule => "rule",
            LabelSource::Pseudo => "pseudo",
            LabelSource::Model => "model",
        }
    }
}

/// Maps rule verdicts onto the stage's binary labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polarity {
    pub dominant: BinaryLabel,
    pub fallback: BinaryLabel,
}

impl Polarity {
    /// Dominant keywords name the negative class (finished products, non-food goods).
    pub const DOMINANT_NEGATIVE: Polarity = Polarity {
        dominant: BinaryLabel::Negative,
        fallback: BinaryLabel::Positive,
    };

    /// Dominant keywords name the positive class.
    pub const DOMINANT_POSITIVE: Polarity = Polarity {
        dominant: BinaryLabel::Positive,
        fallback: BinaryLabel::Negative,
    };

    pub fn label_for(self, verdict: RuleVerdict) -> Option<BinaryLabel> {
        match verdict {
            RuleVerdict::Dominant => Some(self.dominant),
            RuleVerdict::Fallback => Some(self.fallback),
            RuleVerdict::Abstain => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_manual_values() {
        assert_eq!(BinaryLabel::parse_manual(" Ingredient "), Some(BinaryLabel::Positive));
        assert_eq!(BinaryLabel::parse_manual("1"), Some(BinaryLabel::Positive));
        assert_eq!(BinaryLabel::parse_manual("PROD"), Some(BinaryLabel::Negative));
        assert_eq!(BinaryLabel::parse_manual("notfood"), Some(BinaryLabel::Negative));
        assert_eq!(BinaryLabel::parse_manual("maybe"), None);
        assert_eq!(BinaryLabel::parse_manual(""), None);
    }

    #[test]
    fn polarity_maps_dominant_to_negative() {
        let polarity = Polarity::DOMINANT_NEGATIVE;
        assert_eq!(polarity.label_for(RuleVerdict::Dominant), Some(BinaryLabel::Negative));
        assert_eq!(polarity.label_for(RuleVerdict::Fallback), Some(BinaryLabel::Positive));
        assert_eq!(polarity.label_for(RuleVerdict::Abstain), None);
        let inverted = Polarity::DOMINANT_POSITIVE;
        assert_eq!(inverted.label_for(RuleVerdict::Dominant), Some(BinaryLabel::Positive));
        assert_eq!(inverted.label_for(RuleVerdict::Fallback), Some(BinaryLabel::Negative));
    }

    #[test]
    fn label_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&BinaryLabel::Positive).unwrap(), "1");
        let parsed: BinaryLabel = serde_json::from_str("0").unwrap();
        assert_eq!(parsed, BinaryLabel::Negative);
        assert!(serde_json::from_str::<BinaryLabel>("2").is_err());
    }
}
