//! Error types for Versa core.

use crate::types::{IsolationLevel, SequenceNumber};
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Versa core operations.
///
/// Every operation failure is reported through this type; the engine never
/// retries on its own. After any failure inside a transaction, `abort` is
/// always a safe recovery.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Checkpoint storage error.
    #[error("storage error: {0}")]
    Storage(#[from] versa_storage::StorageError),

    /// A key lock could not be acquired within the timeout.
    ///
    /// The transaction stays open; the caller may retry or abort.
    #[error("timed out after {timeout:?} waiting for the lock on key {key}")]
    LockTimeout {
        /// Debug rendering of the contended key.
        key: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// `add` was called on a key that already has a live value.
    #[error("key {key} already exists")]
    AlreadyExists {
        /// Debug rendering of the key.
        key: String,
    },

    /// A write was attempted while this replica is not a write-admissible
    /// primary.
    #[error("replica is not primary or write access is not granted")]
    NotPrimary,

    /// A read was attempted while this replica does not admit reads for the
    /// transaction's isolation level.
    #[error("replica is not readable for {isolation} reads")]
    NotReadable {
        /// Isolation level of the rejected read.
        isolation: IsolationLevel,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A replicated commit arrived out of order.
    #[error("replicated commit {received} does not follow last applied {applied}")]
    OutOfOrderReplication {
        /// Sequence of the last applied commit.
        applied: SequenceNumber,
        /// Sequence of the rejected commit.
        received: SequenceNumber,
    },

    /// A checkpoint image is malformed.
    #[error("checkpoint corruption: {message}")]
    CheckpointCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected in a checkpoint image.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// A key or value could not be serialized or deserialized.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a lock timeout error for `key`.
    pub fn lock_timeout(key: &impl std::fmt::Debug, timeout: Duration) -> Self {
        Self::LockTimeout {
            key: format!("{key:?}"),
            timeout,
        }
    }

    /// Creates an already-exists error for `key`.
    pub fn already_exists(key: &impl std::fmt::Debug) -> Self {
        Self::AlreadyExists {
            key: format!("{key:?}"),
        }
    }

    /// Creates a not-readable error.
    pub fn not_readable(isolation: IsolationLevel) -> Self {
        Self::NotReadable { isolation }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a checkpoint corruption error.
    pub fn checkpoint_corruption(message: impl Into<String>) -> Self {
        Self::CheckpointCorruption {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns true for failures a caller may retry as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
