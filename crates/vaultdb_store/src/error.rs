//! Error types for the collection store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in collection store operations.
///
/// Each failure is a distinct, classifiable case so callers can tell
/// "retry the write" (`TransactionAborted`) apart from "reload the whole
/// session" (`StorageUnavailable`). A missing key on `get` is not an
/// error; it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be opened or read.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// Another process holds the exclusive database lock.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// A write transaction failed to commit. The in-memory state is
    /// rolled back; the caller may retry the operation.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Collection creation during a version upgrade failed partway.
    /// The prior version's data is left intact.
    #[error("schema migration failed: {message}")]
    SchemaMigrationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The named collection does not exist at the stored schema version.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// Operation not permitted in the current context, e.g. a write to a
    /// collection outside the transaction's declared scope.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Record encoding or decoding failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a storage unavailable error.
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates a schema migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::SchemaMigrationFailed {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}
