//! Fused sparse features for product names.
//!
//! A feature row is the concatenation of the word TF-IDF view, the character TF-IDF view,
//! and the keyword counts from [`keyword::keyword_features`].

pub mod keyword;
pub mod tfidf;

use serde::{Deserialize, Serialize};
use sprs::CsVec;

use crate::labeling::{KeywordLists, KeywordRuleEngine};
use crate::text;
pub use keyword::{KEYWORD_FEATURE_COUNT, KEYWORD_FEATURE_NAMES, keyword_features};
pub use tfidf::{Analyzer, TfidfOptions, TfidfVectorizer};

/// Sparse row fed to the classifier.
pub type FeatureVector = CsVec<f64>;

/// Vectorizer options for one label stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub word: TfidfOptions,
    pub char: TfidfOptions,
}

impl FeatureConfig {
    /// Word 1-2 grams and char 3-5 grams.
    pub fn ingredient() -> Self {
        Self {
            word: TfidfOptions::word(),
            char: TfidfOptions::char(3, 5),
        }
    }

    /// Char 2-5 grams with a pruned vocabulary.
    pub fn food() -> Self {
        Self {
            word: TfidfOptions {
                min_df: 2,
                max_features: Some(120_000),
                ..TfidfOptions::word()
            },
            char: TfidfOptions {
                min_df: 2,
                max_features: Some(120_000),
                ..TfidfOptions::char(2, 5)
            },
        }
    }
}

/// Fitted feature extractor.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    word: TfidfVectorizer,
    char: TfidfVectorizer,
    lists: KeywordLists,
    engine: KeywordRuleEngine,
}

impl FeatureExtractor {
    /// Fit both TF-IDF views on normalized `corpus`.
    pub fn fit<S: AsRef<str>>(
        config: &FeatureConfig,
        lists: &KeywordLists,
        corpus: &[S],
    ) -> Result<Self, String> {
        let normalized: Vec<String> = corpus.iter().map(|doc| text::normalize(doc.as_ref())).collect();
        let word = TfidfVectorizer::fit(config.word.clone(), &normalized)?;
        let char = TfidfVectorizer::fit(config.char.clone(), &normalized)?;
        Ok(Self::from_parts(word, char, lists.clone()))
    }

    /// Rebuild from persisted vectorizers and keyword lists.
    pub fn from_parts(word: TfidfVectorizer, char: TfidfVectorizer, lists: KeywordLists) -> Self {
        let engine = KeywordRuleEngine::new(&lists);
        Self {
            word,
            char,
            lists,
            engine,
        }
    }

    pub fn word(&self) -> &TfidfVectorizer {
        &self.word
    }

    pub fn char(&self) -> &TfidfVectorizer {
        &self.char
    }

    pub fn keyword_lists(&self) -> &KeywordLists {
        &self.lists
    }

    /// Total columns: word vocabulary + char vocabulary + keyword features.
    pub fn dim(&self) -> usize {
        self.word.len() + self.char.len() + KEYWORD_FEATURE_COUNT
    }

    /// Deterministic fused row for one product name.
    pub fn transform(&self, name: &str) -> FeatureVector {
        let normalized = text::normalize(name);
        let word_offset = 0;
        let char_offset = self.word.len();
        let keyword_offset = char_offset + self.char.len();

        let mut indices = Vec::new();
        let mut data = Vec::new();
        let mut push = |column: usize, value: f64| {
            if value != 0.0 {
                indices.push(column);
                data.push(value);
            }
        };
        for (column, value) in self.word.transform(&normalized) {
            push(word_offset + column, value);
        }
        for (column, value) in self.char.transform(&normalized) {
            push(char_offset + column, value);
        }
        for (column, value) in keyword_features(&self.engine, &normalized).into_iter().enumerate() {
            push(keyword_offset + column, value);
        }
        CsVec::new(self.dim(), indices, data)
    }

    pub fn transform_batch<S: AsRef<str>>(&self, names: &[S]) -> Vec<FeatureVector> {
        names.iter().map(|name| self.transform(name.as_ref())).collect()
    }
}
