//! Error types for the engine bridge.

use crate::bridge::BridgeStatus;
use thiserror::Error;
use vaultdb_store::StoreError;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// An opaque failure reported by the external engine.
///
/// The engine is a black box; all the bridge can classify is where in
/// its own lifecycle the failure surfaced, so the engine-side cause is
/// carried as a plain message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    /// Creates an engine error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the engine-reported message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur in bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The external engine module failed to load or instantiate.
    #[error("engine module failed to load: {0}")]
    EngineLoadFailed(#[source] EngineError),

    /// The engine's startup handshake failed.
    #[error("engine startup handshake failed: {0}")]
    HandshakeFailed(#[source] EngineError),

    /// A canonical state query against the engine failed.
    #[error("engine state query failed: {0}")]
    QueryFailed(#[source] EngineError),

    /// An operation requiring the `Ready` state was invoked outside it.
    /// Not recoverable without a fresh bridge instance.
    #[error("engine not ready: bridge status is {status:?}")]
    EngineNotReady {
        /// The bridge status at the time of the call.
        status: BridgeStatus,
    },

    /// A collection store failure during bridge operation.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
