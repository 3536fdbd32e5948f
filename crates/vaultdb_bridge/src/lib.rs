//! # VaultDB Bridge
//!
//! Engine bridge and reactive state container for VaultDB.
//!
//! This crate connects three parties:
//! - the externally-loaded, opaque cryptographic engine (loaded once
//!   per process by [`EngineLoader`], reached through the narrow
//!   [`VaultEngine`] surface),
//! - the UI-facing reactive snapshot ([`StateCell`], replaced wholesale
//!   on every refresh),
//! - and the collection store (`vaultdb_store`), which the engine uses
//!   during its startup handshake to restore locally persisted identity
//!   state.
//!
//! ## Key Invariants
//!
//! - At most one engine handle exists per process; the bridge owns it
//! - All engine calls are serialized through a single in-flight slot
//! - `init` is idempotent and never auto-retried after failure
//! - Change notifications coalesce: signals arriving during a refresh
//!   collapse into exactly one follow-up refresh
//!
//! ## Example
//!
//! ```rust
//! use vaultdb_bridge::{EngineLoader, StateBridge, TestEngineModule};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let module = TestEngineModule::new();
//! let bridge = StateBridge::new(EngineLoader::new({
//!     let module = module.clone();
//!     move || {
//!         let module = module.clone();
//!         async move { Ok(module) }
//!     }
//! }));
//!
//! bridge.init().await.unwrap();
//! let state = bridge.get_state().await.unwrap();
//! assert!(state.meta_vault.is_none());
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod engine;
mod error;
mod loader;
pub mod model;
mod notify;
mod state;

pub use bridge::{BridgeStatus, StateBridge};
pub use engine::{EngineModule, TestEngine, TestEngineModule, VaultEngine};
pub use error::{BridgeError, BridgeResult, EngineError};
pub use loader::EngineLoader;
pub use notify::NotificationSink;
pub use state::StateCell;
