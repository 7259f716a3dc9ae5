//! Inventory error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Required column '{column}' missing from {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("Invalid row {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("Invalid JSON layout template: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML layout template: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid size string format: {0}")]
    InvalidSizeFormat(String),
}
