//! In-memory checkpoint storage for testing.

use crate::error::StorageResult;
use crate::storage::CheckpointStorage;
use parking_lot::RwLock;

/// An in-memory checkpoint storage.
///
/// Suitable for unit tests, integration tests and stores that only need
/// checkpoint images to survive within one process.
///
/// # Example
///
/// ```rust
/// use versa_storage::{CheckpointStorage, MemoryStorage};
///
/// let storage = MemoryStorage::new();
/// assert!(storage.read_image().unwrap().is_none());
/// storage.write_image(b"image").unwrap();
/// assert_eq!(storage.writes(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    image: RwLock<Option<Vec<u8>>>,
    writes: RwLock<u64>,
}

impl MemoryStorage {
    /// Creates a new empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage holding a pre-existing image.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_image(image: Vec<u8>) -> Self {
        Self {
            image: RwLock::new(Some(image)),
            writes: RwLock::new(0),
        }
    }

    /// Returns how many images were written since creation.
    #[must_use]
    pub fn writes(&self) -> u64 {
        *self.writes.read()
    }
}

impl CheckpointStorage for MemoryStorage {
    fn write_image(&self, image: &[u8]) -> StorageResult<()> {
        *self.image.write() = Some(image.to_vec());
        *self.writes.write() += 1;
        Ok(())
    }

    fn read_image(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.image.read().clone())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.image.write() = None;
        Ok(())
    }
}
