//! Checkpoint storage trait definition.

use crate::error::StorageResult;

/// A durable home for the most recent checkpoint image.
///
/// # Invariants
///
/// - `write_image` replaces the previous image atomically
/// - once `write_image` returns `Ok`, the image survives process termination
/// - `read_image` returns exactly the bytes of the last successful write
/// - implementations must be `Send + Sync`; the checkpoint manager shares
///   them behind an `Arc`
///
/// # Implementors
///
/// - [`super::MemoryStorage`] - For testing
/// - [`super::FileStorage`] - For persistent storage
pub trait CheckpointStorage: Send + Sync {
    /// Replaces the stored image with `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be made durable. The previous
    /// image is left intact in that case.
    fn write_image(&self, image: &[u8]) -> StorageResult<()>;

    /// Reads the stored image, or `None` if nothing was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_image(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Removes the stored image.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn clear(&self) -> StorageResult<()>;
}
