//! On-disk artifact layouts and their discovery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::ArtifactError;

/// Default file name of a single-file artifact.
pub const BUNDLE_FILE_NAME: &str = "model.json";
pub const WORD_VECTORIZER_FILE_NAME: &str = "tfidf_word.json";
pub const CHAR_VECTORIZER_FILE_NAME: &str = "tfidf_char.json";
pub const CLASSIFIER_FILE_NAME: &str = "linear_svm_calibrated.json";
/// Keyword lists and metadata written next to the three split parts.
pub const KEYWORD_META_FILE_NAME: &str = "keyword_meta.json";

/// Paths of the split layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPaths {
    pub word: PathBuf,
    pub char: PathBuf,
    pub classifier: PathBuf,
    pub keywords: PathBuf,
}

impl SplitPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            word: dir.join(WORD_VECTORIZER_FILE_NAME),
            char: dir.join(CHAR_VECTORIZER_FILE_NAME),
            classifier: dir.join(CLASSIFIER_FILE_NAME),
            keywords: dir.join(KEYWORD_META_FILE_NAME),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.word, &self.char, &self.classifier, &self.keywords]
    }

    fn all_exist(&self) -> bool {
        self.all().iter().all(|path| path.is_file())
    }
}

/// A resolved artifact location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLayout {
    Bundled(PathBuf),
    Split(SplitPaths),
}

impl ArtifactLayout {
    /// Resolve `path` to an existing artifact.
    ///
    /// A file is a bundle. A directory is a bundle when it holds `model.json`, otherwise a
    /// split layout when it holds all four split files. A missing path falls back to the
    /// split layout in its parent directory.
    pub fn discover(path: &Path) -> Result<Self, ArtifactError> {
        if path.is_file() {
            return Ok(ArtifactLayout::Bundled(path.to_path_buf()));
        }
        let dir = if path.is_dir() {
            let bundle = path.join(BUNDLE_FILE_NAME);
            if bundle.is_file() {
                return Ok(ArtifactLayout::Bundled(bundle));
            }
            path.to_path_buf()
        } else {
            match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        };
        let split = SplitPaths::in_dir(&dir);
        if split.all_exist() {
            return Ok(ArtifactLayout::Split(split));
        }
        Err(ArtifactError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Which layout a trainer writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutKind {
    #[default]
    Bundle,
    Split,
}

impl LayoutKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutKind::Bundle => "bundle",
            LayoutKind::Split => "split",
        }
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bundle" | "bundled" => Ok(LayoutKind::Bundle),
            "split" => Ok(LayoutKind::Split),
            other => Err(format!("unknown artifact layout '{other}' (expected bundle or split)")),
        }
    }
}
