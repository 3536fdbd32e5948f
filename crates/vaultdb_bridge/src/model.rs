//! Domain records and the canonical persisted schema.
//!
//! The collection names declared here are an on-disk contract shared
//! with databases written by earlier builds. The set only ever grows
//! across schema versions; removing or renaming a name would strand
//! records written by an older build.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use vaultdb_store::Schema;

/// Vault metadata records (one per local identity).
pub const COL_META_VAULT: &str = "meta_vault";
/// Locally persisted user credentials.
pub const COL_USER_CREDENTIALS: &str = "user_credentials";
/// Distributed password records.
pub const COL_META_PASSWORDS: &str = "meta_passwords";
/// Append-only change log of local data events.
pub const COL_COMMIT_LOG: &str = "commit_log";

/// Current schema version.
///
/// Version 1 declared `meta_passwords` and `commit_log`; version 2
/// added `meta_vault` and `user_credentials`.
pub const SCHEMA_VERSION: u32 = 2;

/// Returns the schema descriptor for the current version.
#[must_use]
pub fn schema() -> Schema {
    Schema::new(
        SCHEMA_VERSION,
        [
            COL_META_VAULT,
            COL_USER_CREDENTIALS,
            COL_META_PASSWORDS,
            COL_COMMIT_LOG,
        ],
    )
}

/// A device participating in a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable device identifier.
    pub device_id: Uuid,
    /// Human-readable device name.
    pub device_name: String,
}

impl DeviceInfo {
    /// Creates a device record with a fresh identifier.
    #[must_use]
    pub fn generate(device_name: impl Into<String>) -> Self {
        Self {
            device_id: Uuid::new_v4(),
            device_name: device_name.into(),
        }
    }
}

/// Local vault registration: which vault this device belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaVault {
    /// Vault name, unique across the system.
    pub vault_name: String,
    /// The local device.
    pub device: DeviceInfo,
}

/// Locally persisted identity material.
///
/// Key strings are opaque engine-produced encodings; the bridge never
/// interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Vault this identity belongs to.
    pub vault_name: String,
    /// The local device.
    pub device: DeviceInfo,
    /// Signing public key.
    pub public_key: String,
    /// Transport (encryption) public key.
    pub transport_public_key: String,
}

/// Canonical vault membership as last reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    /// Vault name.
    pub vault_name: String,
    /// Accepted member devices.
    pub members: Vec<DeviceInfo>,
    /// Devices waiting for join approval.
    pub pending_joins: Vec<DeviceInfo>,
}

/// A distributed password record, stored in `meta_passwords`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordEntry {
    /// Record identifier.
    pub id: String,
    /// Display title.
    pub title: String,
}

/// Addressing key of a change-log event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventKey {
    /// Logical namespace.
    pub ns: String,
    /// Logical store the event belongs to.
    pub store: String,
    /// Record identifier within the store.
    pub id: String,
}

impl EventKey {
    /// Creates an event key.
    pub fn new(
        ns: impl Into<String>,
        store: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            ns: ns.into(),
            store: store.into(),
            id: id.into(),
        }
    }
}

/// One entry of the append-only change log, stored in `commit_log`.
///
/// The value is an opaque JSON payload; [`replay_events`] interprets
/// the entries it knows about and ignores the rest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataEvent {
    /// Addressing key.
    pub key: EventKey,
    /// Opaque event payload.
    pub value: Value,
}

impl DataEvent {
    /// Creates a vault-registration event.
    pub fn meta_vault_updated(meta_vault: &MetaVault) -> Self {
        Self {
            key: EventKey::new("vault_db", "meta_schema", "meta_vault"),
            value: serde_json::to_value(meta_vault).unwrap_or(Value::Null),
        }
    }

    /// Creates a credentials event.
    pub fn credentials_updated(credentials: &UserCredentials) -> Self {
        Self {
            key: EventKey::new("vault_db", "meta_schema", "user_credentials"),
            value: serde_json::to_value(credentials).unwrap_or(Value::Null),
        }
    }
}

/// The latest locally-known identity state, folded from the change log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalSnapshot {
    /// Vault registration, if this device ever created or joined one.
    pub meta_vault: Option<MetaVault>,
    /// Persisted identity material, if any.
    pub credentials: Option<UserCredentials>,
}

/// Folds an ordered change log into the latest local snapshot.
///
/// Later events win over earlier ones. Events with unknown keys or
/// payloads that fail to decode are skipped.
pub fn replay_events<'a, I>(events: I) -> LocalSnapshot
where
    I: IntoIterator<Item = &'a DataEvent>,
{
    let mut snapshot = LocalSnapshot::default();

    for event in events {
        match event.key.id.as_str() {
            "meta_vault" => match serde_json::from_value(event.value.clone()) {
                Ok(meta_vault) => snapshot.meta_vault = Some(meta_vault),
                Err(e) => tracing::warn!(error = %e, "skipping undecodable meta_vault event"),
            },
            "user_credentials" => match serde_json::from_value(event.value.clone()) {
                Ok(credentials) => snapshot.credentials = Some(credentials),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable credentials event");
                }
            },
            _ => {}
        }
    }

    snapshot
}

/// The UI-visible application state snapshot.
///
/// Replaced wholesale on every refresh; the default value is the
/// well-defined "empty" snapshot shown before any secrets are loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaultState {
    /// Whether the UI should offer the join-vault flow.
    pub join_requested: bool,
    /// Local vault registration.
    pub meta_vault: Option<MetaVault>,
    /// Canonical vault membership.
    pub vault: Option<VaultSummary>,
}
