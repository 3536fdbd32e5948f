//! Storage backend trait definition.

use crate::error::StoreResult;

/// A low-level storage backend for the collection store.
///
/// Backends are **opaque image stores**: they hold the encoded database
/// image as a single byte blob and know nothing about collections, keys,
/// or schema versions. The store owns all format interpretation.
///
/// # Invariants
///
/// - `load` returns exactly the bytes most recently `persist`ed, or
///   `None` if nothing was ever persisted
/// - `persist` replaces the image atomically: after a crash, `load`
///   observes either the previous image or the new one, never a mix
/// - Backends must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing and ephemeral databases
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads the current database image.
    ///
    /// Returns `None` for a backend that has never been written (a new
    /// database).
    ///
    /// # Errors
    ///
    /// Returns [`StorageUnavailable`](crate::StoreError::StorageUnavailable)
    /// if the image cannot be read.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Durably replaces the database image.
    ///
    /// After this returns successfully the new image is guaranteed to
    /// survive process termination (for persistent backends).
    ///
    /// # Errors
    ///
    /// Returns an error if the image could not be made durable. The
    /// previously persisted image remains intact.
    fn persist(&mut self, image: &[u8]) -> StoreResult<()>;

    /// Returns true if the backend survives process restarts.
    fn is_persistent(&self) -> bool;
}
