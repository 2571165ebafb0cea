//! Error types for traza-db

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// traza-db error types
#[derive(Error, Debug)]
pub enum Error {
    /// Validation error: the caller must fix the call, nothing is retried
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No experiment with this name exists in the store
    #[error("No experiment named '{0}' in this store")]
    ExperimentNotFound(String),

    /// No dataset with this name exists in the experiment
    #[error("No dataset named '{0}' in this experiment")]
    DatasetNotFound(String),

    /// A destructive operation was declined; all state is left untouched
    #[error("Deletion of '{0}' was declined; nothing was removed")]
    DeletionDeclined(String),

    /// Storage error (index document or array file)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Index document (de)serialization error
    #[error("Index document error: {0}")]
    Json(#[from] serde_json::Error),

    /// Array file read error
    #[error("Array read error: {0}")]
    ArrayRead(#[from] ndarray_npy::ReadNpyError),

    /// Array file write error
    #[error("Array write error: {0}")]
    ArrayWrite(#[from] ndarray_npy::WriteNpyError),
}
