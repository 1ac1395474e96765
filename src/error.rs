//! Top-level error returned by pipeline entry points and the command-line tools.

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::config::ConfigError;
use crate::store::StoreError;
use crate::training::TrainError;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad settings, unknown tables, or a missing model artifact.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Training data that cannot produce a model.
    #[error("Data error: {0}")]
    Data(TrainError),
    /// A model artifact that exists but cannot be used.
    #[error("Model load error: {0}")]
    ModelLoad(ArtifactError),
    #[error("Database error: {0}")]
    Db(StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ArtifactError> for Error {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound { path } => Error::Config(ConfigError::ArtifactNotFound { path }),
            ArtifactError::AlreadyExists { path } => {
                Error::Config(ConfigError::ArtifactExists { path })
            }
            other => Error::ModelLoad(other),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidIdentifier(name) => {
                Error::Config(ConfigError::InvalidIdentifier(name))
            }
            other => Error::Db(other),
        }
    }
}

impl From<TrainError> for Error {
    fn from(err: TrainError) -> Self {
        match err {
            TrainError::InvalidOptions(message) => Error::Config(ConfigError::Invalid(message)),
            other => Error::Data(other),
        }
    }
}
