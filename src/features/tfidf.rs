//! Word and character n-gram TF-IDF vectorizers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::text;

/// Which n-grams a vectorizer extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    /// Lowercase `\w+` tokens joined by a single space.
    Word,
    /// Character windows over the lowercased, whitespace-normalized text.
    Char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfidfOptions {
    pub analyzer: Analyzer,
    pub ngram_min: usize,
    pub ngram_max: usize,
    /// Terms seen in fewer documents are dropped.
    pub min_df: usize,
    /// Keep only the most frequent terms across the corpus.
    pub max_features: Option<usize>,
}

impl TfidfOptions {
    pub fn word() -> Self {
        Self {
            analyzer: Analyzer::Word,
            ngram_min: 1,
            ngram_max: 2,
            min_df: 1,
            max_features: None,
        }
    }

    pub fn char(ngram_min: usize, ngram_max: usize) -> Self {
        Self {
            analyzer: Analyzer::Char,
            ngram_min,
            ngram_max,
            min_df: 1,
            max_features: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return Err(format!(
                "invalid n-gram range {}..={}",
                self.ngram_min, self.ngram_max
            ));
        }
        if self.max_features == Some(0) {
            return Err("max_features must be > 0".to_string());
        }
        Ok(())
    }

    /// All n-grams of `input`, with repeats.
    pub fn ngrams(&self, input: &str) -> Vec<String> {
        match self.analyzer {
            Analyzer::Word => word_ngrams(&text::word_tokens(input), self.ngram_min, self.ngram_max),
            Analyzer::Char => {
                char_ngrams(&text::normalize(&input.to_lowercase()), self.ngram_min, self.ngram_max)
            }
        }
    }
}

fn word_ngrams(tokens: &[String], min: usize, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    for n in min..=max {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}

fn char_ngrams(normalized: &str, min: usize, max: usize) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    let mut out = Vec::new();
    for n in min..=max {
        if n > chars.len() {
            break;
        }
        for window in chars.windows(n) {
            out.push(window.iter().collect());
        }
    }
    out
}

/// Persisted vectorizer state: options, sorted vocabulary, and one idf weight per term.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TfidfState {
    options: TfidfOptions,
    vocabulary: Vec<String>,
    idf: Vec<f64>,
}

/// Fitted TF-IDF vectorizer.
///
/// `idf(t) = ln((1 + n) / (1 + df(t))) + 1`, raw term counts, L2-normalized rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TfidfState", into = "TfidfState")]
pub struct TfidfVectorizer {
    options: TfidfOptions,
    vocabulary: Vec<String>,
    idf: Vec<f64>,
    index: HashMap<String, usize>,
}

impl TfidfVectorizer {
    /// Learn the vocabulary and idf weights from `corpus`.
    pub fn fit<S: AsRef<str>>(options: TfidfOptions, corpus: &[S]) -> Result<Self, String> {
        options.validate()?;
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        for doc in corpus {
            let grams = options.ngrams(doc.as_ref());
            let mut seen = HashSet::new();
            for gram in grams {
                *term_freq.entry(gram.clone()).or_default() += 1;
                if seen.insert(gram.clone()) {
                    *doc_freq.entry(gram).or_default() += 1;
                }
            }
        }
        let mut kept: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= options.min_df.max(1))
            .collect();
        if let Some(limit) = options.max_features {
            if kept.len() > limit {
                kept.sort_by(|(a_term, _), (b_term, _)| {
                    let a = term_freq.get(a_term).copied().unwrap_or(0);
                    let b = term_freq.get(b_term).copied().unwrap_or(0);
                    b.cmp(&a).then_with(|| a_term.cmp(b_term))
                });
                kept.truncate(limit);
            }
        }
        kept.sort_by(|(a, _), (b, _)| a.cmp(b));
        let n_docs = corpus.len() as f64;
        let idf = kept
            .iter()
            .map(|(_, df)| ((1.0 + n_docs) / (1.0 + *df as f64)).ln() + 1.0)
            .collect();
        let vocabulary = kept.into_iter().map(|(term, _)| term).collect();
        Self::from_state(TfidfState {
            options,
            vocabulary,
            idf,
        })
    }

    fn from_state(state: TfidfState) -> Result<Self, String> {
        state.options.validate()?;
        if state.vocabulary.len() != state.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf weights",
                state.vocabulary.len(),
                state.idf.len()
            ));
        }
        if state.vocabulary.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("vocabulary must be sorted and unique".to_string());
        }
        if state.idf.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err("idf weights must be finite and positive".to_string());
        }
        let index = state
            .vocabulary
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();
        Ok(Self {
            options: state.options,
            vocabulary: state.vocabulary,
            idf: state.idf,
            index,
        })
    }

    pub fn options(&self) -> &TfidfOptions {
        &self.options
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Output dimensionality.
    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Sparse `(column, weight)` pairs sorted by column. Unknown n-grams are ignored.
    pub fn transform(&self, input: &str) -> Vec<(usize, f64)> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for gram in self.options.ngrams(input) {
            if let Some(&column) = self.index.get(&gram) {
                *counts.entry(column).or_default() += 1.0;
            }
        }
        let mut weighted: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(column, count)| (column, count * self.idf[column]))
            .collect();
        let norm = weighted.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut weighted {
                *v /= norm;
            }
        }
        weighted
    }
}

impl TryFrom<TfidfState> for TfidfVectorizer {
    type Error = String;

    fn try_from(state: TfidfState) -> Result<Self, Self::Error> {
        Self::from_state(state)
    }
}

impl From<TfidfVectorizer> for TfidfState {
    fn from(vectorizer: TfidfVectorizer) -> Self {
        TfidfState {
            options: vectorizer.options,
            vocabulary: vectorizer.vocabulary,
            idf: vectorizer.idf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_ngrams_include_bigrams() {
        let grams = TfidfOptions::word().ngrams("즉석국 떡국세트");
        assert_eq!(grams, vec!["즉석국", "떡국세트", "즉석국 떡국세트"]);
    }

    #[test]
    fn char_ngrams_span_whitespace() {
        let grams = TfidfOptions::char(3, 3).ngrams("Ab  c");
        assert_eq!(grams, vec!["ab ", "b c"]);
    }

    #[test]
    fn smooth_idf_and_l2_norm() {
        let corpus = ["a b", "a c"];
        let vectorizer = TfidfVectorizer::fit(
            TfidfOptions {
                ngram_max: 1,
                ..TfidfOptions::word()
            },
            &corpus,
        )
        .unwrap();
        assert_eq!(vectorizer.vocabulary(), ["a", "b", "c"]);
        let row = vectorizer.transform("a b");
        let idf_a = 1.0;
        let idf_b = (3.0f64 / 2.0).ln() + 1.0;
        let norm = (idf_a * idf_a + idf_b * idf_b).sqrt();
        assert_eq!(row.len(), 2);
        assert!((row[0].1 - idf_a / norm).abs() < 1e-12);
        assert!((row[1].1 - idf_b / norm).abs() < 1e-12);
    }

    #[test]
    fn min_df_and_max_features_prune_vocabulary() {
        let corpus = ["x y", "x z", "x y"];
        let options = TfidfOptions {
            ngram_max: 1,
            min_df: 2,
            ..TfidfOptions::word()
        };
        let vectorizer = TfidfVectorizer::fit(options.clone(), &corpus).unwrap();
        assert_eq!(vectorizer.vocabulary(), ["x", "y"]);

        let capped = TfidfVectorizer::fit(
            TfidfOptions {
                min_df: 1,
                max_features: Some(1),
                ..options
            },
            &corpus,
        )
        .unwrap();
        assert_eq!(capped.vocabulary(), ["x"]);
    }

    #[test]
    fn unknown_terms_produce_empty_row() {
        let vectorizer = TfidfVectorizer::fit(TfidfOptions::word(), &["쌀"]).unwrap();
        assert!(vectorizer.transform("라면").is_empty());
    }

    #[test]
    fn serde_round_trip_rebuilds_index() {
        let vectorizer =
            TfidfVectorizer::fit(TfidfOptions::char(2, 3), &["흰쌀20kg", "국산콩"]).unwrap();
        let json = serde_json::to_string(&vectorizer).unwrap();
        let loaded: TfidfVectorizer = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.transform("국산쌀"), vectorizer.transform("국산쌀"));
    }

    #[test]
    fn rejects_mismatched_state() {
        let json = r#"{"options":{"analyzer":"word","ngram_min":1,"ngram_max":2,"min_df":1,"max_features":null},"vocabulary":["a","b"],"idf":[1.0]}"#;
        assert!(serde_json::from_str::<TfidfVectorizer>(json).is_err());
    }
}
