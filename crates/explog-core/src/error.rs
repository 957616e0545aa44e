//! Error types for explog-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A node, folder or configuration is absent where presence is required.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Table vs. grouping node confusion, or an unknown mode string.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A predicate, projection or written batch disagrees with a table schema.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Insertion requested without enough information, or an exception-mode
    /// write onto an existing node.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Results list has {actual} entries but {expected} configurations were resolved")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration specifier: {0}")]
    InvalidSpecifier(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Corrupt store image: {0}")]
    CorruptImage(String),

    #[error("The experiment log has been closed")]
    StoreClosed,
}

impl ExplogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExplogError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ExplogError>;
