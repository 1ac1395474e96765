//! JSON-lines export of every training row with the final model's verdict.

use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::labeling::{BinaryLabel, LabelSource};
use crate::store::ProductId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub id: ProductId,
    pub name: String,
    pub manual_label: Option<BinaryLabel>,
    pub final_label: BinaryLabel,
    pub confidence: f64,
    pub source: LabelSource,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write labeled rows to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize labeled row {id}: {source}")]
    Serialize {
        id: ProductId,
        source: serde_json::Error,
    },
}

/// Write one JSON object per line, creating parent directories as needed.
pub fn write_labeled_jsonl(path: &Path, rows: &[LabeledRow]) -> Result<(), ExportError> {
    let write_err = |source: std::io::Error| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let file = std::fs::File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row).map_err(|source| ExportError::Serialize {
            id: row.id,
            source,
        })?;
        writer.write_all(b"\n").map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;
    Ok(())
}
