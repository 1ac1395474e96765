//! Access to catalog tables holding product names and nullable label columns.

pub mod sqlite;

pub use sqlite::SqliteStore;

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::labeling::BinaryLabel;

/// Primary key of a catalog row.
pub type ProductId = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open database {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        source: rusqlite::Error,
    },
    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("{} of {attempted} staged row(s) failed; first: {}", failures.len(), first_failure(failures))]
    Staging {
        attempted: usize,
        failures: Vec<RowFailure>,
    },
}

fn first_failure(failures: &[RowFailure]) -> String {
    failures
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// A table or column name that is safe to splice into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: &str) -> Result<Self, StoreError> {
        static VALID: OnceLock<Regex> = OnceLock::new();
        let valid = VALID.get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
        });
        if valid.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(StoreError::InvalidIdentifier(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One label column of a catalog table, with its optional prerequisite flag.
///
/// With a prerequisite, only rows whose prerequisite column equals 1 are read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTarget {
    pub table: Identifier,
    pub id_column: Identifier,
    pub name_column: Identifier,
    pub label_column: Identifier,
    pub prerequisite: Option<Identifier>,
}

impl LabelTarget {
    pub fn new(
        table: &str,
        id_column: &str,
        name_column: &str,
        label_column: &str,
        prerequisite: Option<&str>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            table: Identifier::new(table)?,
            id_column: Identifier::new(id_column)?,
            name_column: Identifier::new(name_column)?,
            label_column: Identifier::new(label_column)?,
            prerequisite: prerequisite.map(Identifier::new).transpose()?,
        })
    }
}

/// Selection of the next unlabeled batch, keyed after the last id already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlabeledPredicate<'a> {
    pub target: &'a LabelTarget,
    pub after_id: Option<ProductId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
}

/// A catalog row as seen by training, with any label already stored for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRow {
    pub id: ProductId,
    pub name: String,
    pub manual_label: Option<BinaryLabel>,
}

/// How staging treats ids that already exist in the catalog table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// A conflicting insert is a row failure and aborts the whole staging run.
    #[default]
    Reject,
    /// Conflicting inserts are skipped and counted.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub id: ProductId,
    pub message: String,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.id, self.message)
    }
}

/// Upstream table that new catalog rows are copied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingSource {
    pub table: Identifier,
    pub id_column: Identifier,
    pub name_column: Identifier,
    pub store_column: Option<Identifier>,
}

/// Catalog table receiving staged rows with null label columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTarget {
    pub table: Identifier,
    pub id_column: Identifier,
    pub name_column: Identifier,
    pub store_column: Option<Identifier>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingSummary {
    pub candidates: usize,
    pub inserted: usize,
    pub ignored_duplicates: usize,
}

/// Persistent collaborator holding product rows and nullable label columns.
pub trait LabeledStore {
    /// Up to `limit` rows with a null label and a non-null name, ascending by id.
    fn fetch_unlabeled(
        &mut self,
        predicate: UnlabeledPredicate<'_>,
        limit: usize,
    ) -> Result<Vec<ProductRow>, StoreError>;

    /// Write `(label, id)` pairs in one conditional statement; rows whose label is no
    /// longer null are left alone. Returns the number of rows changed.
    fn update_labels(
        &mut self,
        target: &LabelTarget,
        pairs: &[(BinaryLabel, ProductId)],
    ) -> Result<usize, StoreError>;

    /// Every row of the stage with a non-null name, labeled or not, ascending by id.
    fn fetch_training_rows(&mut self, target: &LabelTarget) -> Result<Vec<TrainingRow>, StoreError>;
}
