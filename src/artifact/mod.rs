//! Persisted model artifacts: fitted vectorizers, calibrated classifier, keyword lists.

pub mod layout;

pub use layout::{ArtifactLayout, LayoutKind, SplitPaths};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::features::{FeatureExtractor, TfidfVectorizer};
use crate::labeling::{BinaryLabel, KeywordLists};
use crate::ml::CalibratedClassifier;

/// Current on-disk format version.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("No model artifact found at {path}")]
    NotFound { path: PathBuf },
    #[error("Failed to read model artifact {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write model artifact {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize model artifact: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Refusing to replace existing model artifact at {path}")]
    AlreadyExists { path: PathBuf },
    #[error("Unsupported artifact format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Feature extractor produces {features} columns but the classifier expects {classifier}")]
    DimensionMismatch { features: usize, classifier: usize },
    #[error("Invalid model artifact: {0}")]
    Invalid(String),
}

/// Number of training rows per label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub negative: usize,
    pub positive: usize,
}

impl LabelDistribution {
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a BinaryLabel>) -> Self {
        let mut distribution = Self::default();
        for label in labels {
            distribution.add(*label);
        }
        distribution
    }

    pub fn add(&mut self, label: BinaryLabel) {
        match label {
            BinaryLabel::Negative => self.negative += 1,
            BinaryLabel::Positive => self.positive += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.negative + self.positive
    }

    pub fn distinct(&self) -> usize {
        usize::from(self.negative > 0) + usize::from(self.positive > 0)
    }
}

/// Seed rows by provenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSourceCounts {
    pub manual: usize,
    pub rule: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub format_version: u32,
    /// Label stage the classifier was trained for, e.g. `ingredient`.
    pub stage: String,
    pub corpus_size: usize,
    pub label_distribution: LabelDistribution,
    /// RFC 3339 timestamp.
    pub trained_at: String,
    pub conf_threshold: f64,
    #[serde(default)]
    pub seed_sources: SeedSourceCounts,
}

impl ArtifactMetadata {
    pub fn new(
        stage: impl Into<String>,
        label_distribution: LabelDistribution,
        conf_threshold: f64,
        seed_sources: SeedSourceCounts,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            stage: stage.into(),
            corpus_size: label_distribution.total(),
            label_distribution,
            trained_at: now_rfc3339(),
            conf_threshold,
            seed_sources,
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[derive(Debug, Serialize, Deserialize)]
struct BundleFile {
    metadata: ArtifactMetadata,
    keywords: KeywordLists,
    word_vectorizer: TfidfVectorizer,
    char_vectorizer: TfidfVectorizer,
    classifier: CalibratedClassifier,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeywordSidecar {
    #[serde(flatten)]
    keywords: KeywordLists,
    metadata: ArtifactMetadata,
}

/// Immutable trained model for one label stage.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    extractor: FeatureExtractor,
    classifier: CalibratedClassifier,
    metadata: ArtifactMetadata,
}

impl ModelArtifact {
    /// Assemble an artifact, checking that the extractor and classifier agree on dimension.
    pub fn new(
        extractor: FeatureExtractor,
        classifier: CalibratedClassifier,
        metadata: ArtifactMetadata,
    ) -> Result<Self, ArtifactError> {
        if metadata.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: metadata.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        classifier.validate().map_err(ArtifactError::Invalid)?;
        if extractor.dim() != classifier.input_dim {
            return Err(ArtifactError::DimensionMismatch {
                features: extractor.dim(),
                classifier: classifier.input_dim,
            });
        }
        Ok(Self {
            extractor,
            classifier,
            metadata,
        })
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn classifier(&self) -> &CalibratedClassifier {
        &self.classifier
    }

    pub fn keyword_lists(&self) -> &KeywordLists {
        self.extractor.keyword_lists()
    }

    /// Label and max class probability per text.
    pub fn predict_with_confidence<S: AsRef<str>>(&self, texts: &[S]) -> Vec<(BinaryLabel, f64)> {
        texts
            .iter()
            .map(|text| {
                let row = self.extractor.transform(text.as_ref());
                self.classifier.predict_with_confidence(&row)
            })
            .collect()
    }

    pub fn predict<S: AsRef<str>>(&self, texts: &[S]) -> Vec<BinaryLabel> {
        self.predict_with_confidence(texts)
            .into_iter()
            .map(|(label, _)| label)
            .collect()
    }

    pub fn predict_confidence<S: AsRef<str>>(&self, texts: &[S]) -> Vec<f64> {
        self.predict_with_confidence(texts)
            .into_iter()
            .map(|(_, confidence)| confidence)
            .collect()
    }

    /// Discover and load the artifact at `path`.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let layout = ArtifactLayout::discover(path)?;
        Self::load_layout(&layout)
    }

    pub fn load_layout(layout: &ArtifactLayout) -> Result<Self, ArtifactError> {
        match layout {
            ArtifactLayout::Bundled(path) => {
                let bundle: BundleFile = read_json(path)?;
                Self::new(
                    FeatureExtractor::from_parts(
                        bundle.word_vectorizer,
                        bundle.char_vectorizer,
                        bundle.keywords,
                    ),
                    bundle.classifier,
                    bundle.metadata,
                )
            }
            ArtifactLayout::Split(paths) => {
                let word: TfidfVectorizer = read_json(&paths.word)?;
                let char: TfidfVectorizer = read_json(&paths.char)?;
                let classifier: CalibratedClassifier = read_json(&paths.classifier)?;
                let sidecar: KeywordSidecar = read_json(&paths.keywords)?;
                Self::new(
                    FeatureExtractor::from_parts(word, char, sidecar.keywords),
                    classifier,
                    sidecar.metadata,
                )
            }
        }
    }

    /// Persist under `path` and return where it was written.
    ///
    /// For [`LayoutKind::Bundle`], `path` is the bundle file, or a directory that receives
    /// `model.json`; the file is written to a temporary sibling and renamed into place.
    /// For [`LayoutKind::Split`], `path` is a directory that must be missing or empty. The
    /// four parts are written into a staging directory next to it, which is then renamed to
    /// `path` in one step; an existing split artifact is never rewritten.
    pub fn save(&self, path: &Path, kind: LayoutKind) -> Result<ArtifactLayout, ArtifactError> {
        match kind {
            LayoutKind::Bundle => {
                let target = if path.is_dir() {
                    path.join(layout::BUNDLE_FILE_NAME)
                } else {
                    path.to_path_buf()
                };
                let bundle = BundleFile {
                    metadata: self.metadata.clone(),
                    keywords: self.keyword_lists().clone(),
                    word_vectorizer: self.extractor.word().clone(),
                    char_vectorizer: self.extractor.char().clone(),
                    classifier: self.classifier.clone(),
                };
                write_json_atomic(&target, &bundle)?;
                Ok(ArtifactLayout::Bundled(target))
            }
            LayoutKind::Split => {
                ensure_vacant(path)?;
                let staging = tempfile::Builder::new()
                    .prefix(".catalabel-split-")
                    .tempdir_in(parent_dir(path))
                    .map_err(|source| ArtifactError::Write {
                        path: path.to_path_buf(),
                        source,
                    })?;
                let staged = SplitPaths::in_dir(staging.path());
                write_json_atomic(&staged.word, self.extractor.word())?;
                write_json_atomic(&staged.char, self.extractor.char())?;
                write_json_atomic(&staged.classifier, &self.classifier)?;
                write_json_atomic(
                    &staged.keywords,
                    &KeywordSidecar {
                        keywords: self.keyword_lists().clone(),
                        metadata: self.metadata.clone(),
                    },
                )?;
                publish_dir(staging, path)?;
                Ok(ArtifactLayout::Split(SplitPaths::in_dir(path)))
            }
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// A split target may be absent or an empty directory.
fn ensure_vacant(path: &Path) -> Result<(), ArtifactError> {
    if !path.exists() {
        return std::fs::create_dir_all(parent_dir(path)).map_err(|source| ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    let empty_dir = path.is_dir()
        && std::fs::read_dir(path)
            .map_err(|source| ArtifactError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .next()
            .is_none();
    if empty_dir {
        Ok(())
    } else {
        Err(ArtifactError::AlreadyExists {
            path: path.to_path_buf(),
        })
    }
}

fn publish_dir(staging: tempfile::TempDir, path: &Path) -> Result<(), ArtifactError> {
    let write_err = |source: std::io::Error| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    if path.is_dir() {
        std::fs::remove_dir(path).map_err(write_err)?;
    }
    match std::fs::rename(staging.path(), path) {
        Ok(()) => Ok(()),
        Err(err) if path.exists() => {
            tracing::warn!("Another writer published {} first: {err}", path.display());
            Err(ArtifactError::AlreadyExists {
                path: path.to_path_buf(),
            })
        }
        Err(err) => Err(write_err(err)),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let data = serde_json::to_vec(value).map_err(ArtifactError::Serialize)?;
    let dir = parent_dir(path);
    let write_err = |source: std::io::Error| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;
    let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    file.write_all(&data).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureConfig;
    use crate::ml::CalibrationOptions;
    use tempfile::tempdir;

    fn trained() -> ModelArtifact {
        let lists = KeywordLists::new(["컵라면", "세트", "%탕"], ["쌀", "콩"]);
        let texts = ["흰쌀20kg", "컵라면24개세트", "국산콩", "불닭볶음탕"];
        let labels = [
            BinaryLabel::Positive,
            BinaryLabel::Negative,
            BinaryLabel::Positive,
            BinaryLabel::Negative,
        ];
        let extractor = FeatureExtractor::fit(&FeatureConfig::ingredient(), &lists, &texts).unwrap();
        let rows = extractor.transform_batch(&texts);
        let classifier =
            CalibratedClassifier::fit(&rows, &labels, extractor.dim(), &CalibrationOptions::default())
                .unwrap();
        let metadata = ArtifactMetadata::new(
            "ingredient",
            LabelDistribution::from_labels(&labels),
            0.7,
            SeedSourceCounts { manual: 0, rule: 4 },
        );
        ModelArtifact::new(extractor, classifier, metadata).unwrap()
    }

    #[test]
    fn bundle_and_split_layouts_load_identically() {
        let artifact = trained();
        let dir = tempdir().unwrap();
        let texts = ["국산콩 1kg", "즉석 감자탕"];

        let bundled = artifact.save(&dir.path().join("bundle.json"), LayoutKind::Bundle).unwrap();
        let from_bundle = ModelArtifact::load_layout(&bundled).unwrap();
        let split_dir = dir.path().join("split");
        let split = artifact.save(&split_dir, LayoutKind::Split).unwrap();
        assert!(matches!(split, ArtifactLayout::Split(_)));
        let from_split = ModelArtifact::load(&split_dir).unwrap();

        assert_eq!(from_bundle.predict(&texts), artifact.predict(&texts));
        assert_eq!(from_split.predict_confidence(&texts), artifact.predict_confidence(&texts));
        assert_eq!(from_split.metadata(), artifact.metadata());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let artifact = trained();
        let mut classifier = artifact.classifier().clone();
        classifier.input_dim += 1;
        for member in &mut classifier.members {
            member.svm.weights.push(0.0);
        }
        let err = ModelArtifact::new(
            artifact.extractor().clone(),
            classifier,
            artifact.metadata().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, ArtifactError::DimensionMismatch { .. }));
    }

    #[test]
    fn corrupt_bundle_fails_to_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ArtifactError::Parse { .. })
        ));
    }

    #[test]
    fn sidecar_accepts_domain_keyword_names() {
        let artifact = trained();
        let json = serde_json::json!({
            "notfood_keywords": ["냉장고"],
            "food_keywords": ["쌀"],
            "metadata": artifact.metadata(),
        });
        let sidecar: KeywordSidecar = serde_json::from_value(json).unwrap();
        assert_eq!(sidecar.keywords.dominant, vec!["냉장고"]);
        assert_eq!(sidecar.keywords.fallback, vec!["쌀"]);
    }

    #[test]
    fn metadata_records_corpus_size() {
        let artifact = trained();
        let metadata = artifact.metadata();
        assert_eq!(metadata.corpus_size, 4);
        assert_eq!(metadata.label_distribution.distinct(), 2);
        assert!(OffsetDateTime::parse(&metadata.trained_at, &Rfc3339).is_ok());
    }

    #[test]
    fn split_save_refuses_to_replace_an_existing_artifact() {
        let artifact = trained();
        let dir = tempdir().unwrap();
        let target = dir.path().join("split");
        artifact.save(&target, LayoutKind::Split).unwrap();
        let classifier = target.join(layout::CLASSIFIER_FILE_NAME);
        let before = std::fs::read(&classifier).unwrap();

        let err = artifact.save(&target, LayoutKind::Split).unwrap_err();
        assert!(matches!(err, ArtifactError::AlreadyExists { .. }));
        assert!(matches!(crate::Error::from(err), crate::Error::Config(_)));
        assert_eq!(std::fs::read(&classifier).unwrap(), before);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn split_save_fills_an_empty_directory() {
        let artifact = trained();
        let dir = tempdir().unwrap();
        let target = dir.path().join("empty");
        std::fs::create_dir(&target).unwrap();
        artifact.save(&target, LayoutKind::Split).unwrap();
        assert!(ModelArtifact::load(&target).is_ok());
    }

    #[test]
    fn reader_racing_a_split_save_sees_nothing_or_everything() {
        let artifact = trained();
        let dim = artifact.extractor().dim();
        let dir = tempdir().unwrap();
        let targets: Vec<PathBuf> = (0..20).map(|i| dir.path().join(format!("gen{i}"))).collect();

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                for target in &targets {
                    loop {
                        match ModelArtifact::load(target) {
                            Ok(loaded) => {
                                assert_eq!(loaded.extractor().dim(), dim);
                                break;
                            }
                            Err(ArtifactError::NotFound { .. }) => std::thread::yield_now(),
                            Err(other) => panic!("reader saw an incomplete artifact: {other}"),
                        }
                    }
                }
            });
            for target in &targets {
                artifact.save(target, LayoutKind::Split).unwrap();
            }
            reader.join().unwrap();
        });
    }

    #[test]
    fn unsupported_format_version_is_a_model_load_error() {
        let artifact = trained();
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        artifact.save(&path, LayoutKind::Bundle).unwrap();
        let mut json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        json["metadata"]["format_version"] = serde_json::json!(ARTIFACT_FORMAT_VERSION + 1);
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::UnsupportedVersion { found, expected: ARTIFACT_FORMAT_VERSION }
                if found == ARTIFACT_FORMAT_VERSION + 1
        ));
        assert!(matches!(
            crate::Error::from(err),
            crate::Error::ModelLoad(ArtifactError::UnsupportedVersion { .. })
        ));
    }
}
