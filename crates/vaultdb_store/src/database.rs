//! Database facade: open, migrate, transact.

use crate::backend::StorageBackend;
use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::scan::Scan;
use crate::schema::Schema;
use crate::transaction::Transaction;
use crate::typed::TypedCollection;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Collection name -> (key -> record bytes).
pub(crate) type Tables = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// A named, schema-versioned collection database.
///
/// `Database` is the primary entry point of the store. It provides:
/// - Lazy creation on first open
/// - Additive schema migration driven by a [`Schema`] descriptor
/// - Atomic transaction scopes over one or more collections
/// - Key lookup and full-collection scans
///
/// # Opening a Database
///
/// ```rust
/// use vaultdb_store::{Database, Schema};
///
/// let schema = Schema::new(1, ["meta_passwords", "commit_log"]);
/// let db = Database::open_in_memory(&schema).unwrap();
///
/// db.transaction(&["meta_passwords"], |txn| {
///     txn.put("meta_passwords", "p1", vec![1, 2, 3])
/// }).unwrap();
///
/// assert_eq!(db.get("meta_passwords", "p1").unwrap(), Some(vec![1, 2, 3]));
/// ```
///
/// For persistent databases use [`Database::open`] with a directory
/// path; the directory is locked for exclusive access while the handle
/// lives.
pub struct Database {
    /// Stored schema version; fixed at open, never lowered.
    version: u32,
    /// Committed state.
    tables: RwLock<Tables>,
    /// Backing storage. The lock doubles as the commit lock, so at most
    /// one transaction commits at a time.
    backend: Mutex<Box<dyn StorageBackend>>,
}

impl Database {
    /// Opens or creates a file-backed database at `path`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DatabaseLocked`] if another process has the
    ///   database open
    /// - [`StoreError::StorageUnavailable`] if the directory or image
    ///   cannot be opened or is corrupted
    /// - [`StoreError::SchemaMigrationFailed`] if a required version
    ///   upgrade cannot be persisted
    pub fn open(path: &Path, schema: &Schema) -> StoreResult<Self> {
        Self::open_with_backend(Box::new(FileBackend::open(path)?), schema)
    }

    /// Opens a fresh in-memory database for testing or ephemeral use.
    pub fn open_in_memory(schema: &Schema) -> StoreResult<Self> {
        use crate::memory::InMemoryBackend;
        Self::open_with_backend(Box::new(InMemoryBackend::new()), schema)
    }

    /// Opens a database over a pre-configured backend.
    ///
    /// If the backend holds no image, a new database is created at
    /// `schema.version()` with every required collection. If the stored
    /// version is behind, the missing required collections are created
    /// and the new version is persisted; existing collections and
    /// records are never touched. If the stored version is equal or
    /// ahead, no structural change occurs.
    pub fn open_with_backend(
        mut backend: Box<dyn StorageBackend>,
        schema: &Schema,
    ) -> StoreResult<Self> {
        let stored = backend.load()?;

        let (version, tables) = match stored {
            None => {
                let tables: Tables = schema
                    .collections()
                    .map(|name| (name.to_string(), BTreeMap::new()))
                    .collect();
                let image = codec::to_cbor(&(schema.version(), &tables))?;
                backend.persist(&image)?;
                tracing::info!(
                    version = schema.version(),
                    collections = tables.len(),
                    "created database"
                );
                (schema.version(), tables)
            }
            Some(bytes) => {
                let (stored_version, mut tables): (u32, Tables) = codec::from_cbor(&bytes)
                    .map_err(|e| {
                        StoreError::storage_unavailable(format!(
                            "corrupted database image: {e}"
                        ))
                    })?;

                if stored_version < schema.version() {
                    let missing: Vec<String> = schema
                        .collections()
                        .filter(|name| !tables.contains_key(*name))
                        .map(str::to_string)
                        .collect();
                    for name in &missing {
                        tables.insert(name.clone(), BTreeMap::new());
                    }

                    let image = codec::to_cbor(&(schema.version(), &tables))
                        .map_err(|e| StoreError::migration_failed(e.to_string()))?;
                    backend.persist(&image).map_err(|e| {
                        StoreError::migration_failed(format!(
                            "cannot persist version {} image: {e}",
                            schema.version()
                        ))
                    })?;
                    tracing::info!(
                        from = stored_version,
                        to = schema.version(),
                        created = missing.len(),
                        "migrated database schema"
                    );
                    (schema.version(), tables)
                } else {
                    tracing::debug!(version = stored_version, "opened database");
                    (stored_version, tables)
                }
            }
        };

        Ok(Self {
            version,
            tables: RwLock::new(tables),
            backend: Mutex::new(backend),
        })
    }

    /// Returns the stored schema version.
    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.version
    }

    /// Returns the names of all collections, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Checks whether a collection exists.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Executes a function within an atomic transaction scope bound to
    /// `collections`.
    ///
    /// If the function returns `Ok`, every staged write is committed
    /// durably; if it returns `Err`, nothing is written. A commit that
    /// fails to persist surfaces as
    /// [`TransactionAborted`](StoreError::TransactionAborted) and leaves
    /// the committed state untouched.
    pub fn transaction<T, F>(&self, collections: &[&str], f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    {
        let scope: BTreeSet<String> = collections.iter().map(|s| (*s).to_string()).collect();
        {
            let tables = self.tables.read();
            for name in &scope {
                if !tables.contains_key(name) {
                    return Err(StoreError::collection_not_found(name.clone()));
                }
            }
        }

        let mut txn = Transaction::new(self, scope);
        let out = f(&mut txn)?;

        let writes = txn.into_writes();
        if !writes.is_empty() {
            self.commit(writes)?;
        }
        Ok(out)
    }

    /// Reads a record by key in a single-operation transaction.
    ///
    /// A missing key is `Ok(None)`, never an error.
    pub fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.transaction(&[collection], |txn| txn.get(collection, key))
    }

    /// Writes a record in a single-operation transaction, replacing any
    /// prior value under `key`. Returns once the commit is durable.
    pub fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.transaction(&[collection], |txn| txn.put(collection, key, value))
    }

    /// Opens a scan over every record of a collection.
    ///
    /// The scan reflects the collection at the time it was opened; later
    /// commits are not visible to it. Each call yields a fresh,
    /// independent iteration.
    pub fn scan_all(&self, collection: &str) -> StoreResult<Scan> {
        self.transaction(&[collection], |txn| txn.scan_all(collection))
    }

    /// Returns a typed view over a collection.
    ///
    /// # Errors
    ///
    /// [`CollectionNotFound`](StoreError::CollectionNotFound) if the
    /// collection does not exist at the stored schema version.
    pub fn typed_collection<T>(&self, name: &str) -> StoreResult<TypedCollection<'_, T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if !self.has_collection(name) {
            return Err(StoreError::collection_not_found(name));
        }
        Ok(TypedCollection::new(self, name.to_string()))
    }

    /// Applies staged writes and persists the new image atomically.
    fn commit(&self, writes: BTreeMap<(String, String), Vec<u8>>) -> StoreResult<()> {
        let mut backend = self.backend.lock();

        let mut next = self.tables.read().clone();
        for ((collection, key), value) in writes {
            if let Some(records) = next.get_mut(&collection) {
                records.insert(key, value);
            }
        }

        let image = codec::to_cbor(&(self.version, &next))
            .map_err(|e| StoreError::transaction_aborted(e.to_string()))?;
        backend
            .persist(&image)
            .map_err(|e| StoreError::transaction_aborted(e.to_string()))?;

        // Only after the image is durable does the committed state move.
        *self.tables.write() = next;
        Ok(())
    }

    pub(crate) fn read_record(&self, collection: &str, key: &str) -> Option<Vec<u8>> {
        self.tables
            .read()
            .get(collection)
            .and_then(|records| records.get(key).cloned())
    }

    pub(crate) fn snapshot_collection(&self, collection: &str) -> Vec<(String, Vec<u8>)> {
        self.tables
            .read()
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("version", &self.version)
            .field("collections", &self.collection_names())
            .finish_non_exhaustive()
    }
}
