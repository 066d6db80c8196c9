use thiserror::Error;

/// A central error enum for storage-related errors.
///
/// Transitions on the store never fail; these only surface from the
/// persistence path (reading, decoding, writing or removing the record).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Other error: {0}")]
    Other(String),
}
