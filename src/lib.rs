//! Library exports for the command-line tools, benchmarks, and tests.
/// Application directory resolution.
pub mod app_dirs;
/// Persisted model artifacts.
pub mod artifact;
/// TOML configuration and profile overrides.
pub mod config;
pub mod error;
/// Sparse product-name features.
pub mod features;
/// Batch labeling of unlabeled catalog rows.
pub mod inference;
/// Keyword rules and label types.
pub mod labeling;
/// File and console logging setup.
pub mod logging;
/// Linear classifier, calibration, and metrics.
pub mod ml;
/// Catalog profiles and label stages.
pub mod profile;
/// Product row storage.
pub mod store;
/// Product-name normalization and tokenization.
pub mod text;
/// Self-training pipeline.
pub mod training;

pub use error::{Error, Result};
