//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    image: RwLock<Option<Vec<u8>>>,
    fail_persists: AtomicBool,
}

/// An in-memory storage backend.
///
/// This backend holds the database image in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// Clones share the same underlying image, which lets tests reopen a
/// database "across sessions" without touching the file system:
///
/// ```rust
/// use vaultdb_store::{Database, InMemoryBackend, Schema};
///
/// let backend = InMemoryBackend::new();
/// {
///     let db = Database::open_with_backend(Box::new(backend.clone()),
///         &Schema::new(1, ["items"])).unwrap();
///     db.put("items", "a", vec![1]).unwrap();
/// }
/// let db = Database::open_with_backend(Box::new(backend),
///     &Schema::new(1, ["items"])).unwrap();
/// assert_eq!(db.get("items", "a").unwrap(), Some(vec![1]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current image, if any.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn image(&self) -> Option<Vec<u8>> {
        self.shared.image.read().clone()
    }

    /// Makes every subsequent `persist` fail until reset.
    ///
    /// Used by tests to exercise commit failure and rollback paths.
    pub fn set_fail_persists(&self, fail: bool) {
        self.shared.fail_persists.store(fail, Ordering::SeqCst);
    }
}

impl StorageBackend for InMemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.shared.image.read().clone())
    }

    fn persist(&mut self, image: &[u8]) -> StoreResult<()> {
        if self.shared.fail_persists.load(Ordering::SeqCst) {
            return Err(StoreError::storage_unavailable(
                "injected persist failure",
            ));
        }
        *self.shared.image.write() = Some(image.to_vec());
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backend_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
        assert!(backend.image().is_none());
    }

    #[test]
    fn persist_then_load() {
        let mut backend = InMemoryBackend::new();
        backend.persist(&[1, 2, 3]).unwrap();
        assert_eq!(backend.load().unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn persist_replaces_image() {
        let mut backend = InMemoryBackend::new();
        backend.persist(&[1]).unwrap();
        backend.persist(&[2, 3]).unwrap();
        assert_eq!(backend.load().unwrap(), Some(vec![2, 3]));
    }

    #[test]
    fn clones_share_image() {
        let mut backend = InMemoryBackend::new();
        let other = backend.clone();
        backend.persist(&[9]).unwrap();
        assert_eq!(other.load().unwrap(), Some(vec![9]));
    }

    #[test]
    fn injected_failure_keeps_previous_image() {
        let mut backend = InMemoryBackend::new();
        backend.persist(&[1]).unwrap();

        backend.set_fail_persists(true);
        let result = backend.persist(&[2]);
        assert!(matches!(result, Err(StoreError::StorageUnavailable { .. })));
        assert_eq!(backend.load().unwrap(), Some(vec![1]));

        backend.set_fail_persists(false);
        backend.persist(&[2]).unwrap();
        assert_eq!(backend.load().unwrap(), Some(vec![2]));
    }

    #[test]
    fn not_persistent() {
        assert!(!InMemoryBackend::new().is_persistent());
    }
}
