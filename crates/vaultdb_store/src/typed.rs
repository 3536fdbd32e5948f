//! Typed views over collections.

use crate::codec;
use crate::database::Database;
use crate::error::StoreResult;
use crate::scan::Scan;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// A typed view over one collection.
///
/// `TypedCollection<T>` validates record shape at the store boundary:
/// values are encoded to CBOR on `put` and decoded on `get`/`scan_all`,
/// so a record that does not match `T` surfaces as a
/// [`Codec`](crate::StoreError::Codec) error instead of leaking an
/// arbitrary shape into the application.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use vaultdb_store::{Database, Schema};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct PasswordEntry {
///     id: String,
///     title: String,
/// }
///
/// let db = Database::open_in_memory(&Schema::new(1, ["meta_passwords"])).unwrap();
/// let passwords = db.typed_collection::<PasswordEntry>("meta_passwords").unwrap();
///
/// let entry = PasswordEntry { id: "p1".into(), title: "email".into() };
/// passwords.put("p1", &entry).unwrap();
/// assert_eq!(passwords.get("p1").unwrap(), Some(entry));
/// ```
#[derive(Debug)]
pub struct TypedCollection<'db, T> {
    db: &'db Database,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<'db, T> TypedCollection<'db, T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(db: &'db Database, name: String) -> Self {
        Self {
            db,
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads and decodes a record by key.
    pub fn get(&self, key: &str) -> StoreResult<Option<T>> {
        match self.db.get(&self.name, key)? {
            Some(bytes) => Ok(Some(codec::from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encodes and writes a record in its own transaction.
    pub fn put(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = codec::to_cbor(value)?;
        self.db.put(&self.name, key, bytes)
    }

    /// Opens a decoding scan over the collection.
    pub fn scan_all(&self) -> StoreResult<TypedScan<T>> {
        Ok(TypedScan {
            inner: self.db.scan_all(&self.name)?,
            _marker: PhantomData,
        })
    }
}

/// A decoding iteration over every record of one collection.
///
/// Shares [`Scan`](crate::Scan)'s snapshot-at-open semantics. Each item
/// is `(key, decode result)`; a record that fails to decode yields its
/// error in place rather than aborting the whole scan.
#[derive(Debug)]
pub struct TypedScan<T> {
    inner: Scan,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for TypedScan<T> {
    type Item = (String, StoreResult<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, bytes) = self.inner.next()?;
        Some((key, codec::from_cbor(&bytes)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::schema::Schema;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
        title: String,
    }

    fn create_db() -> Database {
        Database::open_in_memory(&Schema::new(1, ["meta_passwords"])).unwrap()
    }

    #[test]
    fn typed_round_trip() {
        let db = create_db();
        let passwords = db.typed_collection::<Entry>("meta_passwords").unwrap();

        let entry = Entry {
            id: "p1".into(),
            title: "email".into(),
        };
        passwords.put("p1", &entry).unwrap();
        assert_eq!(passwords.get("p1").unwrap(), Some(entry));
    }

    #[test]
    fn typed_get_missing_is_none() {
        let db = create_db();
        let passwords = db.typed_collection::<Entry>("meta_passwords").unwrap();
        assert_eq!(passwords.get("absent").unwrap(), None);
    }

    #[test]
    fn typed_scan_decodes_every_record() {
        let db = create_db();
        let passwords = db.typed_collection::<Entry>("meta_passwords").unwrap();

        for i in 0..3 {
            let entry = Entry {
                id: format!("p{i}"),
                title: format!("title {i}"),
            };
            passwords.put(&entry.id.clone(), &entry).unwrap();
        }

        let decoded: Vec<Entry> = passwords
            .scan_all()
            .unwrap()
            .map(|(_, record)| record.unwrap())
            .collect();
        assert_eq!(decoded.len(), 3);
    }

    #[test]
    fn json_values_are_valid_records() {
        let db = create_db();
        let values = db
            .typed_collection::<serde_json::Value>("meta_passwords")
            .unwrap();

        values.put("p1", &serde_json::json!({"title": "x"})).unwrap();
        assert_eq!(
            values.get("p1").unwrap(),
            Some(serde_json::json!({"title": "x"}))
        );
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let db = create_db();
        let result = db.typed_collection::<Entry>("unknown");
        assert!(matches!(result, Err(StoreError::CollectionNotFound { .. })));
    }

    #[test]
    fn mismatched_record_surfaces_codec_error() {
        let db = create_db();
        db.put("meta_passwords", "p1", vec![0xff, 0x13]).unwrap();

        let passwords = db.typed_collection::<Entry>("meta_passwords").unwrap();
        let result = passwords.get("p1");
        assert!(matches!(result, Err(StoreError::Codec { .. })));
    }
}
