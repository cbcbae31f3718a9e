//! Error types for cold item embedding inference.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for coldvec operations.
#[derive(Error, Debug)]
pub enum ColdVecError {
    /// Invalid configuration or unusable model inputs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A token id does not address a row of the context matrix.
    #[error("Item {item_id}: token {token} out of range for context matrix with {rows} rows")]
    TokenOutOfRange {
        /// The item whose token list contained the bad id.
        item_id: String,
        /// The offending token id.
        token: usize,
        /// Number of rows in the context matrix.
        rows: usize,
    },

    /// Vector or matrix dimensions disagree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected dimension.
        expected: usize,
        /// The dimension actually seen.
        actual: usize,
    },

    /// Malformed or unsupported `.npy` array file.
    #[error("Invalid array format: {0}")]
    InvalidArrayFormat(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A worker failed to start or terminated abnormally.
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias for coldvec operations.
pub type Result<T> = std::result::Result<T, ColdVecError>;

impl From<serde_json::Error> for ColdVecError {
    fn from(err: serde_json::Error) -> Self {
        ColdVecError::Serialization(err.to_string())
    }
}
