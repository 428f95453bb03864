//! Error taxonomy for the ingestion pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    /// A required canonical column is absent after normalization.
    #[error("missing column '{column}' in {entity} file")]
    MissingColumn {
        entity: &'static str,
        column: &'static str,
    },

    /// A cell could not be coerced to the column's semantic type.
    #[error("{entity} line {line}: column '{column}' value '{value}' is not a valid {expected}")]
    TypeCoercion {
        entity: &'static str,
        column: &'static str,
        line: usize,
        value: String,
        expected: &'static str,
    },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("unsupported input format for {0} (expected xlsx, xls, xlsb, ods or csv)")]
    UnsupportedFormat(PathBuf),

    #[error("{0} has no header row")]
    EmptyInput(PathBuf),

    /// Upsert precondition violated (caller bug, not bad input).
    #[error("invalid batch for table '{table}': {reason}")]
    InvalidBatch { table: &'static str, reason: String },
}

impl EtlError {
    pub fn read(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
