//! # VaultDB Store
//!
//! Schema-versioned collection store for VaultDB.
//!
//! This crate provides the client-resident persistence layer:
//! - Named databases holding named collections of key-addressed records
//! - Atomic transaction scopes (all-or-nothing commits)
//! - Full-collection scans with snapshot-at-open semantics
//! - Additive schema migration: a version upgrade only ever creates
//!   missing collections, so databases written by older builds stay
//!   compatible with newer ones
//!
//! ## Design Principles
//!
//! - Storage backends are **opaque image stores** (load, persist); the
//!   store owns all format interpretation
//! - Records are opaque CBOR bytes at the store boundary; typed access
//!   is layered on top via [`TypedCollection`]
//! - No ambient globals: every `Database` is an explicit, injectable
//!   handle, so independent instances can coexist in one process
//!
//! ## Example
//!
//! ```rust
//! use vaultdb_store::{Database, Schema};
//!
//! let schema = Schema::new(1, ["meta_passwords", "commit_log"]);
//! let db = Database::open_in_memory(&schema).unwrap();
//!
//! db.put("meta_passwords", "p1", vec![1, 2, 3]).unwrap();
//! assert_eq!(db.get("meta_passwords", "p1").unwrap(), Some(vec![1, 2, 3]));
//! assert_eq!(db.scan_all("meta_passwords").unwrap().count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod codec;
mod database;
mod error;
mod file;
mod memory;
mod scan;
mod schema;
mod transaction;
mod typed;

pub use backend::StorageBackend;
pub use codec::{from_cbor, to_cbor};
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use scan::Scan;
pub use schema::Schema;
pub use transaction::Transaction;
pub use typed::{TypedCollection, TypedScan};
