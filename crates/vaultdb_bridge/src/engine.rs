//! External engine contract and an in-memory test double.
//!
//! The real engine is an externally-loaded cryptographic core; the
//! bridge reaches it only through the narrow call surface defined here
//! and treats everything behind it as opaque.

use crate::error::EngineError;
use crate::model::{
    replay_events, DataEvent, DeviceInfo, MetaVault, UserCredentials, VaultState, VaultSummary,
    COL_COMMIT_LOG, COL_META_VAULT, COL_USER_CREDENTIALS,
};
use crate::notify::NotificationSink;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vaultdb_store::Database;

/// A live instance of the external core engine.
///
/// At most one instance exists per process; the bridge owns it and
/// never hands it out. All calls against one instance are serialized by
/// the bridge's in-flight guard, so implementations may assume no two
/// calls run concurrently.
pub trait VaultEngine: Send + Sync + 'static {
    /// Runs the engine's asynchronous startup handshake, e.g. validating
    /// or restoring locally persisted identity state.
    fn handshake(&self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Queries the engine's canonical application state.
    fn fetch_state(&self) -> impl Future<Output = Result<VaultState, EngineError>> + Send;
}

/// A loaded engine module, able to construct the engine handle.
///
/// Loading (fetching/compiling the module) and instantiation (building
/// the handle with its notification sink) are separate steps: the
/// module loads once per process, while instantiation binds the handle
/// to one bridge's sink.
pub trait EngineModule: Send + Sync + 'static {
    /// The engine type this module produces.
    type Engine: VaultEngine;

    /// Constructs the engine handle, registering `sink` as the single
    /// change-notification subscriber.
    fn instantiate(&self, sink: NotificationSink) -> Result<Self::Engine, EngineError>;
}

#[derive(Debug)]
struct TestEngineInner {
    db: Option<Arc<Database>>,
    sink: NotificationSink,
    canonical: RwLock<VaultState>,
    fail_handshake: AtomicBool,
    fetch_delay_ms: AtomicU64,
    fetch_count: AtomicUsize,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
    handshakes: AtomicUsize,
}

/// An in-memory engine double for tests.
///
/// Behaves like the real engine at the bridge boundary: it restores
/// identity state from the collection store during the handshake,
/// serves canonical state queries, and pushes change notifications
/// through its sink. Clones share the same instance, so a test can keep
/// a handle for driving the engine after handing it to the bridge.
#[derive(Debug, Clone)]
pub struct TestEngine {
    inner: Arc<TestEngineInner>,
}

impl TestEngine {
    fn new(db: Option<Arc<Database>>, sink: NotificationSink, fail_handshake: bool) -> Self {
        Self {
            inner: Arc::new(TestEngineInner {
                db,
                sink,
                canonical: RwLock::new(VaultState::default()),
                fail_handshake: AtomicBool::new(fail_handshake),
                fetch_delay_ms: AtomicU64::new(0),
                fetch_count: AtomicUsize::new(0),
                inflight: AtomicUsize::new(0),
                max_inflight: AtomicUsize::new(0),
                handshakes: AtomicUsize::new(0),
            }),
        }
    }

    /// Replaces the canonical state and signals the change.
    pub fn push_update(&self, state: VaultState) {
        *self.inner.canonical.write() = state;
        self.inner.sink.notify();
    }

    /// Signals a change without altering the canonical state.
    pub fn emit_change_notification(&self) {
        self.inner.sink.notify();
    }

    /// Creates a vault registration the way the real engine would:
    /// identity material is written to the store (vault record,
    /// credentials, change-log events) in one transaction, then the
    /// canonical state is updated and the change signalled.
    pub fn create_vault(
        &self,
        vault_name: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Result<(), EngineError> {
        let vault_name = vault_name.into();
        let device = DeviceInfo::generate(device_name);
        let meta_vault = MetaVault {
            vault_name: vault_name.clone(),
            device: device.clone(),
        };
        let credentials = UserCredentials {
            vault_name: vault_name.clone(),
            device: device.clone(),
            public_key: format!("pk-{}", device.device_id.simple()),
            transport_public_key: format!("tpk-{}", device.device_id.simple()),
        };

        if let Some(db) = &self.inner.db {
            let log_len = db
                .scan_all(COL_COMMIT_LOG)
                .map_err(|e| EngineError::new(e.to_string()))?
                .len();

            db.transaction(
                &[COL_META_VAULT, COL_USER_CREDENTIALS, COL_COMMIT_LOG],
                |txn| {
                    txn.put(
                        COL_META_VAULT,
                        "meta_vault",
                        vaultdb_store::to_cbor(&meta_vault)?,
                    )?;
                    txn.put(
                        COL_USER_CREDENTIALS,
                        vault_name.as_str(),
                        vaultdb_store::to_cbor(&credentials)?,
                    )?;

                    let events = [
                        DataEvent::meta_vault_updated(&meta_vault),
                        DataEvent::credentials_updated(&credentials),
                    ];
                    for (i, event) in events.iter().enumerate() {
                        txn.put(
                            COL_COMMIT_LOG,
                            format!("{:08}", log_len + i),
                            vaultdb_store::to_cbor(event)?,
                        )?;
                    }
                    Ok(())
                },
            )
            .map_err(|e| EngineError::new(e.to_string()))?;
        }

        let vault = VaultSummary {
            vault_name,
            members: vec![device],
            pending_joins: Vec::new(),
        };
        self.push_update(VaultState {
            join_requested: false,
            meta_vault: Some(meta_vault),
            vault: Some(vault),
        });
        Ok(())
    }

    /// Makes the next handshake fail.
    pub fn set_fail_handshake(&self, fail: bool) {
        self.inner.fail_handshake.store(fail, Ordering::SeqCst);
    }

    /// Delays every state query, widening race windows for tests.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.inner
            .fetch_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of completed state queries.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_count.load(Ordering::SeqCst)
    }

    /// Highest number of state queries ever observed in flight at once.
    #[must_use]
    pub fn max_concurrent_fetches(&self) -> usize {
        self.inner.max_inflight.load(Ordering::SeqCst)
    }

    /// Number of handshakes run.
    #[must_use]
    pub fn handshake_count(&self) -> usize {
        self.inner.handshakes.load(Ordering::SeqCst)
    }

    fn restore_from_store(&self) -> Result<(), EngineError> {
        let Some(db) = &self.inner.db else {
            return Ok(());
        };

        let log = db
            .typed_collection::<DataEvent>(COL_COMMIT_LOG)
            .and_then(|log| log.scan_all())
            .map_err(|e| EngineError::new(e.to_string()))?;

        let events: Vec<DataEvent> = log
            .filter_map(|(key, record)| match record {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping undecodable change-log record");
                    None
                }
            })
            .collect();

        let snapshot = replay_events(&events);
        if let Some(meta_vault) = snapshot.meta_vault {
            tracing::info!(vault = %meta_vault.vault_name, "restored vault registration");
            self.inner.canonical.write().meta_vault = Some(meta_vault);
        }
        Ok(())
    }
}

impl VaultEngine for TestEngine {
    fn handshake(&self) -> impl Future<Output = Result<(), EngineError>> + Send {
        async move {
            self.inner.handshakes.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_handshake.load(Ordering::SeqCst) {
                return Err(EngineError::new("handshake rejected"));
            }
            self.restore_from_store()
        }
    }

    fn fetch_state(&self) -> impl Future<Output = Result<VaultState, EngineError>> + Send {
        async move {
            let inflight = self.inner.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.max_inflight.fetch_max(inflight, Ordering::SeqCst);

            let delay = self.inner.fetch_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            self.inner.fetch_count.fetch_add(1, Ordering::SeqCst);
            self.inner.inflight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.inner.canonical.read().clone())
        }
    }
}

#[derive(Debug, Default)]
struct ModuleInner {
    db: Option<Arc<Database>>,
    fail_handshake: AtomicBool,
    instantiated: AtomicUsize,
    engine: Mutex<Option<TestEngine>>,
}

/// A loaded-module double producing [`TestEngine`] handles.
///
/// Clones share the same instance so tests can inspect how often the
/// bridge instantiated an engine and drive the produced handle.
#[derive(Debug, Clone, Default)]
pub struct TestEngineModule {
    inner: Arc<ModuleInner>,
}

impl TestEngineModule {
    /// Creates a module whose engines run without a collection store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a module whose engines persist and restore identity
    /// state through `db`.
    #[must_use]
    pub fn with_store(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                db: Some(db),
                ..ModuleInner::default()
            }),
        }
    }

    /// Makes engines produced by this module fail their handshake.
    pub fn set_fail_handshake(&self, fail: bool) {
        self.inner.fail_handshake.store(fail, Ordering::SeqCst);
    }

    /// Number of engine handles this module has produced.
    #[must_use]
    pub fn instantiations(&self) -> usize {
        self.inner.instantiated.load(Ordering::SeqCst)
    }

    /// The most recently produced engine handle, if any.
    #[must_use]
    pub fn engine(&self) -> Option<TestEngine> {
        self.inner.engine.lock().clone()
    }
}

impl EngineModule for TestEngineModule {
    type Engine = TestEngine;

    fn instantiate(&self, sink: NotificationSink) -> Result<TestEngine, EngineError> {
        self.inner.instantiated.fetch_add(1, Ordering::SeqCst);
        let engine = TestEngine::new(
            self.inner.db.clone(),
            sink,
            self.inner.fail_handshake.load(Ordering::SeqCst),
        );
        *self.inner.engine.lock() = Some(engine.clone());
        Ok(engine)
    }
}
