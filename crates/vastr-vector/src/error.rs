use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed vector store {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("invalid vector store: {0}")]
    Invalid(String),
    #[error("dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("image index is not ready: no embeddings loaded")]
    NotReady,
    #[error("conflicting embeddings for product {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
