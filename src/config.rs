//! TOML configuration: database location, training and inference settings, and
//! catalog profiles that add to or replace the built-in ones.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::app_dirs::{self, AppDirError};
use crate::features::FeatureConfig;
use crate::labeling::{KeywordLists, Polarity, keywords::KeywordFileError, load_keyword_file};
use crate::ml::{CalibrationOptions, SvmOptions};
use crate::profile::{DomainProfile, LabelStage};
use crate::training::TrainOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("No model artifact found at {path}")]
    ArtifactNotFound { path: PathBuf },
    #[error("A model artifact already exists at {path}; choose a new --out directory")]
    ArtifactExists { path: PathBuf },
    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("Unknown table '{table}' (known: {known})")]
    UnknownTable { table: String, known: String },
    #[error("Profile '{profile}' has no stage '{stage}'")]
    UnknownStage { profile: String, stage: String },
    #[error("Profile '{profile}' has {expected} label stage(s) but {given} model path(s) were given")]
    ModelPathCount {
        profile: String,
        expected: usize,
        given: usize,
    },
    #[error("Invalid profile '{name}': {message}")]
    InvalidProfile { name: String, message: String },
    #[error("No database path given; pass --db or set [database] path")]
    NoDatabase,
    #[error("Invalid setting: {0}")]
    Invalid(String),
    #[error(transparent)]
    Keywords(#[from] KeywordFileError),
    #[error(transparent)]
    AppDir(#[from] AppDirError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub conf_threshold: f64,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub svm_c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let svm = SvmOptions::default();
        Self {
            conf_threshold: 0.7,
            test_fraction: 0.2,
            cv_folds: 3,
            svm_c: svm.c,
            max_iter: svm.max_iter,
            tol: svm.tol,
            seed: svm.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub batch_size: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { batch_size: 5000 }
    }
}

/// Named feature settings a configured stage can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturePreset {
    Food,
    Ingredient,
}

impl FeaturePreset {
    pub fn config(self) -> FeatureConfig {
        match self {
            FeaturePreset::Food => FeatureConfig::food(),
            FeaturePreset::Ingredient => FeatureConfig::ingredient(),
        }
    }
}

/// Which class a stage's dominant keyword list names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolarityPreset {
    DominantNegative,
    DominantPositive,
}

impl PolarityPreset {
    pub fn polarity(self) -> Polarity {
        match self {
            PolarityPreset::DominantNegative => Polarity::DOMINANT_NEGATIVE,
            PolarityPreset::DominantPositive => Polarity::DOMINANT_POSITIVE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub label_column: String,
    #[serde(default)]
    pub prerequisite: Option<String>,
    #[serde(default)]
    pub features: Option<FeaturePreset>,
    #[serde(default)]
    pub polarity: Option<PolarityPreset>,
    /// TOML file with the two keyword lists, relative to the config file.
    #[serde(default)]
    pub keywords_file: Option<PathBuf>,
    #[serde(default, alias = "finished_keywords", alias = "notfood_keywords")]
    pub dominant_keywords: Option<Vec<String>>,
    #[serde(default, alias = "ingredient_keywords", alias = "food_keywords")]
    pub fallback_keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_name_column")]
    pub name_column: String,
    pub stages: Vec<StageConfig>,
}

fn default_id_column() -> String {
    "PRODUCT_ID".to_string()
}

fn default_name_column() -> String {
    "PRODUCT_NAME".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub training: TrainingConfig,
    pub inference: InferenceConfig,
    pub profiles: Vec<ProfileConfig>,
    /// Directory relative paths in the file are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load `path`, or the default config file when `None`.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let path = app_dirs::default_config_path()?;
                if path.is_file() {
                    Self::load_from_path(&path)
                } else {
                    tracing::debug!("No config at {}; using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig =
            toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
                path: path.to_path_buf(),
                source,
            })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Database path from the command line, falling back to the config file.
    pub fn database_path(&self, cli: Option<&Path>) -> Result<PathBuf, ConfigError> {
        cli.map(Path::to_path_buf)
            .or_else(|| self.database.path.as_ref().map(|path| self.resolve(path)))
            .ok_or(ConfigError::NoDatabase)
    }

    pub fn batch_size(&self) -> Result<usize, ConfigError> {
        if self.inference.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        Ok(self.inference.batch_size)
    }

    pub fn train_options(&self) -> TrainOptions {
        let training = &self.training;
        TrainOptions {
            conf_threshold: training.conf_threshold,
            test_fraction: training.test_fraction,
            calibration: CalibrationOptions {
                folds: training.cv_folds,
                svm: SvmOptions {
                    c: training.svm_c,
                    max_iter: training.max_iter,
                    tol: training.tol,
                    seed: training.seed,
                },
            },
            split_seed: format!("catalabel-{}", training.seed),
        }
    }

    /// Built-in profiles with configured ones applied on top, replacing by name.
    pub fn profiles(&self) -> Result<Vec<DomainProfile>, ConfigError> {
        let builtins = DomainProfile::builtins();
        let mut profiles = builtins.clone();
        for entry in &self.profiles {
            let builtin = builtins
                .iter()
                .find(|profile| profile.name.eq_ignore_ascii_case(&entry.name));
            let profile = self.build_profile(entry, builtin)?;
            profile
                .validate()
                .map_err(|message| ConfigError::InvalidProfile {
                    name: profile.name.clone(),
                    message,
                })?;
            match profiles
                .iter_mut()
                .find(|existing| existing.name.eq_ignore_ascii_case(&profile.name))
            {
                Some(existing) => *existing = profile,
                None => profiles.push(profile),
            }
        }
        Ok(profiles)
    }

    fn build_profile(
        &self,
        entry: &ProfileConfig,
        builtin: Option<&DomainProfile>,
    ) -> Result<DomainProfile, ConfigError> {
        let mut stages = Vec::with_capacity(entry.stages.len());
        for stage in &entry.stages {
            let inherited = builtin.and_then(|profile| profile.stage(&stage.name));
            let keywords = self.stage_keywords(&entry.name, stage, inherited)?;
            let features = stage
                .features
                .map(FeaturePreset::config)
                .or_else(|| inherited.map(|stage| stage.features.clone()))
                .unwrap_or_else(FeatureConfig::ingredient);
            let polarity = stage
                .polarity
                .map(PolarityPreset::polarity)
                .or_else(|| inherited.map(|stage| stage.polarity))
                .unwrap_or(Polarity::DOMINANT_NEGATIVE);
            stages.push(LabelStage {
                name: stage.name.clone(),
                label_column: stage.label_column.clone(),
                prerequisite: stage.prerequisite.clone(),
                keywords,
                polarity,
                features,
            });
        }
        Ok(DomainProfile {
            name: entry.name.clone(),
            table: entry.table.clone(),
            id_column: entry.id_column.clone(),
            name_column: entry.name_column.clone(),
            stages,
        })
    }

    fn stage_keywords(
        &self,
        profile: &str,
        stage: &StageConfig,
        inherited: Option<&LabelStage>,
    ) -> Result<KeywordLists, ConfigError> {
        if let Some(file) = &stage.keywords_file {
            return Ok(load_keyword_file(&self.resolve(file))?);
        }
        match (&stage.dominant_keywords, &stage.fallback_keywords, inherited) {
            (Some(dominant), Some(fallback), _) => {
                Ok(KeywordLists::new(dominant.iter().cloned(), fallback.iter().cloned()))
            }
            (None, None, Some(inherited)) => Ok(inherited.keywords.clone()),
            _ => Err(ConfigError::InvalidProfile {
                name: profile.to_string(),
                message: format!(
                    "stage '{}' needs keywords_file or both keyword lists",
                    stage.name
                ),
            }),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Look up a profile by table or profile name.
pub fn resolve_profile(profiles: &[DomainProfile], table: &str) -> Result<DomainProfile, ConfigError> {
    crate::profile::find_profile(profiles, table)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownTable {
            table: table.to_string(),
            known: profiles
                .iter()
                .map(|profile| profile.table.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_sections_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalabel.toml");
        std::fs::write(&path, "[inference]\nbatch_size = 100\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.inference.batch_size, 100);
        assert_eq!(config.training, TrainingConfig::default());
        let options = config.train_options();
        assert_eq!(options.conf_threshold, 0.7);
        assert_eq!(options.calibration.folds, 3);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn database_path_prefers_command_line_and_resolves_relative() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalabel.toml");
        std::fs::write(&path, "[database]\npath = \"catalog.db\"\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(
            config.database_path(None).unwrap(),
            dir.path().join("catalog.db")
        );
        assert_eq!(
            config.database_path(Some(Path::new("/tmp/x.db"))).unwrap(),
            PathBuf::from("/tmp/x.db")
        );
        assert!(matches!(
            AppConfig::default().database_path(None),
            Err(ConfigError::NoDatabase)
        ));
    }

    #[test]
    fn configured_profiles_replace_and_extend_builtins() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("mart.toml"),
            "finished_keywords = [\"도시락\"]\ningredient_keywords = [\"쌀\"]\n",
        )
        .unwrap();
        let path = dir.path().join("catalabel.toml");
        std::fs::write(
            &path,
            r#"
[[profiles]]
name = "kok"
table = "KOK_V2"
[[profiles.stages]]
name = "ingredient"
label_column = "CLS_ING"

[[profiles]]
name = "mart"
table = "MART_CLASSIFY"
id_column = "ID"
name_column = "NAME"
[[profiles.stages]]
name = "ingredient"
label_column = "IS_ING"
keywords_file = "mart.toml"
"#,
        )
        .unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        let profiles = config.profiles().unwrap();
        assert_eq!(profiles.len(), 3);
        let kok = resolve_profile(&profiles, "KOK_V2").unwrap();
        assert_eq!(kok.stages[0].keywords, KeywordLists::kok_ingredient());
        let mart = resolve_profile(&profiles, "mart").unwrap();
        assert_eq!(mart.stages[0].keywords.dominant, vec!["도시락"]);
        assert!(matches!(
            resolve_profile(&profiles, "KOK_CLASSIFY"),
            Err(ConfigError::UnknownTable { .. })
        ));
    }

    #[test]
    fn new_profile_without_keywords_is_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
[[profiles]]
name = "mart"
table = "MART"
[[profiles.stages]]
name = "ingredient"
label_column = "CLS_ING"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.profiles(),
            Err(ConfigError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn stage_polarity_is_configurable() {
        let config: AppConfig = toml::from_str(
            r#"
[[profiles]]
name = "pantry"
table = "PANTRY"
[[profiles.stages]]
name = "food"
label_column = "IS_FOOD"
polarity = "dominant_positive"
dominant_keywords = ["쌀"]
fallback_keywords = ["세제"]

[[profiles.stages]]
name = "ingredient"
label_column = "IS_ING"
prerequisite = "IS_FOOD"
dominant_keywords = ["세트"]
fallback_keywords = ["콩"]
"#,
        )
        .unwrap();
        let profiles = config.profiles().unwrap();
        let pantry = resolve_profile(&profiles, "PANTRY").unwrap();
        assert_eq!(pantry.stages[0].polarity, Polarity::DOMINANT_POSITIVE);
        assert_eq!(pantry.stages[1].polarity, Polarity::DOMINANT_NEGATIVE);
        assert!(
            toml::from_str::<StageConfig>("name = \"x\"\nlabel_column = \"Y\"\npolarity = \"upside_down\"")
                .is_err()
        );
    }
}
