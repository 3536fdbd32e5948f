//! File-backed storage with advisory locking.
//!
//! Database directory layout:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK           # Advisory lock for single-writer access
//! ├─ store.vdb      # Encoded database image
//! └─ store.vdb.tmp  # Scratch file for atomic replacement
//! ```
//!
//! The LOCK file ensures only one process can write to the database at a
//! time. The image is replaced with the write-then-rename pattern so a
//! crash mid-persist never leaves a torn image behind.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const IMAGE_FILE: &str = "store.vdb";
const IMAGE_TEMP: &str = "store.vdb.tmp";

/// A file-backed storage backend.
///
/// Holds an exclusive advisory lock on the database directory for its
/// whole lifetime. Only one `FileBackend` instance can exist per
/// directory at a time; a second opener gets
/// [`DatabaseLocked`](StoreError::DatabaseLocked).
#[derive(Debug)]
pub struct FileBackend {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DatabaseLocked`] if another process holds the lock
    /// - [`StoreError::StorageUnavailable`] if the directory cannot be
    ///   created or the lock file cannot be opened
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                StoreError::storage_unavailable(format!(
                    "cannot create database directory {}: {e}",
                    path.display()
                ))
            })?;
        }

        if !path.is_dir() {
            return Err(StoreError::storage_unavailable(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                StoreError::storage_unavailable(format!(
                    "cannot open lock file {}: {e}",
                    lock_path.display()
                ))
            })?;

        // Non-blocking: a held lock means another live process owns the database.
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn image_path(&self) -> PathBuf {
        self.path.join(IMAGE_FILE)
    }

    /// Syncs the database directory so the rename is durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> std::io::Result<()> {
        // On Unix, fsync on a directory syncs the directory entries.
        let dir = File::open(&self.path)?;
        dir.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> std::io::Result<()> {
        // Windows NTFS journaling provides metadata durability guarantees.
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        let image_path = self.image_path();
        if !image_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&image_path).map_err(|e| {
            StoreError::storage_unavailable(format!(
                "cannot open database image {}: {e}",
                image_path.display()
            ))
        })?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| {
            StoreError::storage_unavailable(format!("cannot read database image: {e}"))
        })?;

        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(data))
    }

    fn persist(&mut self, image: &[u8]) -> StoreResult<()> {
        let temp_path = self.path.join(IMAGE_TEMP);

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(image)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp_path, self.image_path())?;
            self.sync_directory()
        };

        write().map_err(|e| {
            StoreError::storage_unavailable(format!("cannot persist database image: {e}"))
        })
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("new_db");
        assert!(!db_path.exists());

        let backend = FileBackend::open(&db_path).unwrap();
        assert!(db_path.is_dir());
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("locked_db");

        let _first = FileBackend::open(&db_path).unwrap();
        let second = FileBackend::open(&db_path);
        assert!(matches!(second, Err(StoreError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("reopen_db");

        {
            let _backend = FileBackend::open(&db_path).unwrap();
        }
        let _again = FileBackend::open(&db_path).unwrap();
    }

    #[test]
    fn image_round_trips_across_instances() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("image_db");

        {
            let mut backend = FileBackend::open(&db_path).unwrap();
            backend.persist(b"image-bytes").unwrap();
        }

        let backend = FileBackend::open(&db_path).unwrap();
        assert_eq!(backend.load().unwrap(), Some(b"image-bytes".to_vec()));
    }

    #[test]
    fn persist_replaces_previous_image() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("replace_db");

        let mut backend = FileBackend::open(&db_path).unwrap();
        backend.persist(b"first").unwrap();
        backend.persist(b"second").unwrap();
        assert_eq!(backend.load().unwrap(), Some(b"second".to_vec()));
    }
}
