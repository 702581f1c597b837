//! File-based checkpoint storage.

use crate::error::{StorageError, StorageResult};
use crate::storage::CheckpointStorage;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// A file-based checkpoint storage.
///
/// The image lives in a single file. Writes go to a sibling temporary file
/// which is synced and then renamed over the image, so a crash mid-write
/// leaves the previous image untouched.
///
/// # Durability
///
/// - the temporary file is `sync_all`ed before the rename
/// - on Unix the parent directory is synced after the rename
///
/// # Example
///
/// ```no_run
/// use versa_storage::{CheckpointStorage, FileStorage};
/// use std::path::Path;
///
/// let storage = FileStorage::open(Path::new("store/checkpoint.img")).unwrap();
/// storage.write_image(b"consolidated state").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    temp_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens a file storage at `path`, creating parent directories if needed.
    ///
    /// The image file itself is only created by the first `write_image`.
    /// A leftover temporary file from an interrupted write is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` has no file name, points at a directory,
    /// or the parent directories cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
        if path.is_dir() {
            return Err(StorageError::InvalidPath(path.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut temp_name = file_name.to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        match fs::remove_file(&temp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the path to the image file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl CheckpointStorage for FileStorage {
    fn write_image(&self, image: &[u8]) -> StorageResult<()> {
        let _guard = self.write_lock.lock();

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.temp_path)?;
            file.write_all(image)?;
            file.sync_all()?;
        }

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_parent()
    }

    fn read_image(&self) -> StorageResult<Option<Vec<u8>>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut image = Vec::new();
        file.read_to_end(&mut image)?;
        Ok(Some(image))
    }

    fn clear(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => self.sync_parent(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
