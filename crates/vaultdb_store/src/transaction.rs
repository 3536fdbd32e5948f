//! Atomic transaction scopes.
//!
//! Every read and write against a [`Database`](crate::Database) happens
//! inside a transaction bound to one or more collections. Writes are
//! staged in memory and applied all-or-nothing when the scope closure
//! returns `Ok`; an `Err` return discards every staged write.

use crate::database::Database;
use crate::error::{StoreError, StoreResult};
use crate::scan::Scan;
use std::collections::{BTreeMap, BTreeSet};

/// An active transaction scope.
///
/// Created by [`Database::transaction`]; lives only for the duration of
/// the scope closure. Reads observe the transaction's own staged writes
/// first (read-your-writes), then the committed state.
#[derive(Debug)]
pub struct Transaction<'db> {
    db: &'db Database,
    scope: BTreeSet<String>,
    /// Staged writes: (collection, key) -> record bytes.
    writes: BTreeMap<(String, String), Vec<u8>>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, scope: BTreeSet<String>) -> Self {
        Self {
            db,
            scope,
            writes: BTreeMap::new(),
        }
    }

    fn ensure_in_scope(&self, collection: &str) -> StoreResult<()> {
        if self.scope.contains(collection) {
            Ok(())
        } else {
            Err(StoreError::invalid_operation(format!(
                "collection {collection} is not in the transaction scope"
            )))
        }
    }

    /// Reads a record by key.
    ///
    /// A missing key is `Ok(None)`, never an error.
    pub fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_in_scope(collection)?;

        let staged = (collection.to_string(), key.to_string());
        if let Some(value) = self.writes.get(&staged) {
            return Ok(Some(value.clone()));
        }
        Ok(self.db.read_record(collection, key))
    }

    /// Stages a write. The record replaces any prior value under `key`
    /// when the transaction commits.
    pub fn put(
        &mut self,
        collection: &str,
        key: impl Into<String>,
        value: Vec<u8>,
    ) -> StoreResult<()> {
        self.ensure_in_scope(collection)?;
        self.writes
            .insert((collection.to_string(), key.into()), value);
        Ok(())
    }

    /// Opens a scan over the collection as this transaction sees it:
    /// the committed snapshot with the transaction's staged writes
    /// applied on top.
    pub fn scan_all(&self, collection: &str) -> StoreResult<Scan> {
        self.ensure_in_scope(collection)?;

        let mut snapshot: BTreeMap<String, Vec<u8>> =
            self.db.snapshot_collection(collection).into_iter().collect();
        for ((col, key), value) in &self.writes {
            if col == collection {
                snapshot.insert(key.clone(), value.clone());
            }
        }
        Ok(Scan::new(snapshot.into_iter().collect()))
    }

    /// Returns the number of staged writes.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn into_writes(self) -> BTreeMap<(String, String), Vec<u8>> {
        self.writes
    }
}
