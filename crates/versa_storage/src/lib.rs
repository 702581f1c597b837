//! # Versa Storage
//!
//! Durable sinks for checkpoint images.
//!
//! A checkpoint image is an **opaque byte blob**. Storage implementations
//! never interpret it; `versa_core` owns the image format. Each write replaces
//! the previous image wholesale, so a reader always observes either the old
//! image or the new one, never a mix.
//!
//! ## Available Storages
//!
//! - [`MemoryStorage`] - For testing and ephemeral stores
//! - [`FileStorage`] - Persistent storage with atomic replace
//!
//! ## Example
//!
//! ```rust
//! use versa_storage::{CheckpointStorage, MemoryStorage};
//!
//! let storage = MemoryStorage::new();
//! storage.write_image(b"epoch-1").unwrap();
//! assert_eq!(storage.read_image().unwrap().as_deref(), Some(&b"epoch-1"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod storage;

pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use storage::CheckpointStorage;
