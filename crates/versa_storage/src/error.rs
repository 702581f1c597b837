//! Error types for checkpoint storage.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing checkpoint images.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The image path cannot be used (no file name, or not a file).
    #[error("invalid image path: {0}")]
    InvalidPath(String),

    /// The stored image is unreadable at the storage level.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
