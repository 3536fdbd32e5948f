//! Bridge state machine between the engine and the UI snapshot.

use crate::engine::{EngineModule, VaultEngine};
use crate::error::{BridgeError, BridgeResult};
use crate::loader::EngineLoader;
use crate::model::VaultState;
use crate::notify::{NotificationReceiver, NotificationSink};
use crate::state::StateCell;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{watch, Mutex};

/// The lifecycle state of a [`StateBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    /// `init()` has not been called.
    Uninitialized,
    /// `init()` is running: loading the module, instantiating the
    /// engine, or awaiting the startup handshake.
    Initializing,
    /// The engine is live; state queries are served.
    Ready,
    /// Initialization failed. Nothing leaves this state; a fresh bridge
    /// instance is required to retry.
    Error,
}

impl BridgeStatus {
    /// Returns true if state queries can be served.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, BridgeStatus::Ready)
    }
}

/// Serializes every call against the engine handle and republishes the
/// snapshot after each state query.
struct Refresher<E> {
    engine: Arc<E>,
    /// Single-slot in-flight guard: at most one engine call at a time.
    gate: Mutex<()>,
    state: Arc<StateCell>,
}

impl<E: VaultEngine> Refresher<E> {
    async fn refresh(&self) -> BridgeResult<VaultState> {
        let _slot = self.gate.lock().await;
        let next = self
            .engine
            .fetch_state()
            .await
            .map_err(BridgeError::QueryFailed)?;
        self.state.replace(next.clone());
        Ok(next)
    }
}

/// Owns the engine handle and keeps the UI snapshot consistent with it.
///
/// Lifecycle: `Uninitialized → Initializing → Ready`, with `Error`
/// reachable from `Initializing` on load or handshake failure. `init`
/// is idempotent; concurrent callers share one initialization and both
/// observe the eventual outcome.
///
/// Once `Ready`, the bridge refreshes the snapshot on demand
/// ([`get_state`](StateBridge::get_state)) and on every change
/// notification pushed by the engine. Refreshes are serialized;
/// notifications arriving while one is in flight coalesce into a single
/// follow-up.
pub struct StateBridge<M: EngineModule> {
    loader: EngineLoader<M>,
    status: RwLock<BridgeStatus>,
    refresher: OnceLock<Arc<Refresher<M::Engine>>>,
    state: Arc<StateCell>,
    /// Single-flight guard for `init`.
    init_gate: Mutex<()>,
}

impl<M: EngineModule> StateBridge<M> {
    /// Creates a bridge around an engine loader. No engine work happens
    /// until [`init`](StateBridge::init).
    #[must_use]
    pub fn new(loader: EngineLoader<M>) -> Self {
        Self {
            loader,
            status: RwLock::new(BridgeStatus::Uninitialized),
            refresher: OnceLock::new(),
            state: Arc::new(StateCell::new()),
            init_gate: Mutex::new(()),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn status(&self) -> BridgeStatus {
        *self.status.read()
    }

    /// Returns a clone of the current UI snapshot.
    ///
    /// Valid in every state; before the first refresh this is the empty
    /// default snapshot.
    #[must_use]
    pub fn snapshot(&self) -> VaultState {
        self.state.snapshot()
    }

    /// Subscribes to snapshot replacements.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<VaultState> {
        self.state.subscribe()
    }

    /// Initializes the bridge: loads the engine module, instantiates
    /// the engine handle with its notification sink, runs the startup
    /// handshake, then performs one initial state refresh.
    ///
    /// Idempotent: a call on a `Ready` bridge returns `Ok` immediately,
    /// and concurrent callers await the same initialization. A failed
    /// initialization is terminal; subsequent calls return
    /// [`BridgeError::EngineNotReady`].
    pub async fn init(&self) -> BridgeResult<()> {
        let _gate = self.init_gate.lock().await;

        match self.status() {
            BridgeStatus::Ready => return Ok(()),
            BridgeStatus::Error => {
                return Err(BridgeError::EngineNotReady {
                    status: BridgeStatus::Error,
                })
            }
            BridgeStatus::Uninitialized | BridgeStatus::Initializing => {}
        }

        self.set_status(BridgeStatus::Initializing);
        match self.start_engine().await {
            Ok(refresher) => {
                self.set_status(BridgeStatus::Ready);
                refresher.refresh().await.map_err(|e| {
                    self.set_status(BridgeStatus::Error);
                    e
                })?;
                tracing::info!("state bridge ready");
                Ok(())
            }
            Err(e) => {
                self.set_status(BridgeStatus::Error);
                tracing::warn!(error = %e, "state bridge initialization failed");
                Err(e)
            }
        }
    }

    /// Re-queries the engine's canonical state, replaces the snapshot
    /// wholesale, and returns the new snapshot.
    ///
    /// # Errors
    ///
    /// [`BridgeError::EngineNotReady`] outside the `Ready` state;
    /// [`BridgeError::QueryFailed`] if the engine query fails.
    pub async fn get_state(&self) -> BridgeResult<VaultState> {
        let status = self.status();
        if !status.is_ready() {
            return Err(BridgeError::EngineNotReady { status });
        }
        let refresher = self
            .refresher
            .get()
            .cloned()
            .ok_or(BridgeError::EngineNotReady { status })?;
        refresher.refresh().await
    }

    async fn start_engine(&self) -> BridgeResult<Arc<Refresher<M::Engine>>> {
        let module = self.loader.load().await?;

        let (sink, notifications) = NotificationSink::channel();
        let engine = Arc::new(
            module
                .instantiate(sink)
                .map_err(BridgeError::EngineLoadFailed)?,
        );

        let refresher = Arc::new(Refresher {
            engine,
            gate: Mutex::new(()),
            state: Arc::clone(&self.state),
        });

        // The handshake holds the same in-flight slot every later engine
        // call goes through.
        {
            let _slot = refresher.gate.lock().await;
            refresher
                .engine
                .handshake()
                .await
                .map_err(BridgeError::HandshakeFailed)?;
        }

        // Single-flight init: the slot is written exactly once.
        let _ = self.refresher.set(Arc::clone(&refresher));
        spawn_refresh_listener(&refresher, notifications);
        Ok(refresher)
    }

    fn set_status(&self, status: BridgeStatus) {
        tracing::debug!(?status, "bridge status change");
        *self.status.write() = status;
    }
}

impl<M: EngineModule> std::fmt::Debug for StateBridge<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBridge")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Runs the notification listener until every sink clone is gone.
///
/// Holds only a weak reference so dropping the bridge tears the engine,
/// the sink, and finally this task down.
fn spawn_refresh_listener<E: VaultEngine>(
    refresher: &Arc<Refresher<E>>,
    mut notifications: NotificationReceiver,
) {
    let weak: Weak<Refresher<E>> = Arc::downgrade(refresher);
    tokio::spawn(async move {
        while notifications.recv().await {
            // Signals queued behind this one collapse into this refresh.
            notifications.drain();

            let Some(refresher) = weak.upgrade() else {
                break;
            };
            match refresher.refresh().await {
                Ok(_) => tracing::debug!("snapshot refreshed after engine notification"),
                Err(e) => tracing::warn!(error = %e, "notification refresh failed"),
            }
        }
        tracing::debug!("notification channel closed; refresh listener exiting");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TestEngineModule;
    use crate::error::EngineError;
    use std::time::Duration;

    fn bridge_with(module: TestEngineModule) -> StateBridge<TestEngineModule> {
        StateBridge::new(EngineLoader::new(move || {
            let module = module.clone();
            async move { Ok(module) }
        }))
    }

    #[tokio::test]
    async fn init_reaches_ready_with_empty_snapshot() {
        let module = TestEngineModule::new();
        let bridge = bridge_with(module.clone());
        assert_eq!(bridge.status(), BridgeStatus::Uninitialized);

        bridge.init().await.unwrap();

        assert_eq!(bridge.status(), BridgeStatus::Ready);
        assert_eq!(bridge.snapshot(), VaultState::default());
        // init performed the one initial refresh
        assert_eq!(module.engine().unwrap().fetch_count(), 1);
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let module = TestEngineModule::new();
        let bridge = bridge_with(module.clone());

        bridge.init().await.unwrap();
        bridge.init().await.unwrap();

        assert_eq!(module.instantiations(), 1);
        assert_eq!(module.engine().unwrap().handshake_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_init_creates_one_engine() {
        let module = TestEngineModule::new();
        let bridge = bridge_with(module.clone());

        let (a, b) = tokio::join!(bridge.init(), bridge.init());
        a.unwrap();
        b.unwrap();

        assert_eq!(bridge.status(), BridgeStatus::Ready);
        assert_eq!(module.instantiations(), 1);
        assert_eq!(module.engine().unwrap().handshake_count(), 1);
    }

    #[tokio::test]
    async fn get_state_outside_ready_fails() {
        let bridge = bridge_with(TestEngineModule::new());
        let result = bridge.get_state().await;
        assert!(matches!(
            result,
            Err(BridgeError::EngineNotReady {
                status: BridgeStatus::Uninitialized
            })
        ));
    }

    #[tokio::test]
    async fn load_failure_is_terminal() {
        let bridge: StateBridge<TestEngineModule> = StateBridge::new(EngineLoader::new(|| {
            async { Err(EngineError::new("network down")) }
        }));

        let result = bridge.init().await;
        assert!(matches!(result, Err(BridgeError::EngineLoadFailed(_))));
        assert_eq!(bridge.status(), BridgeStatus::Error);

        // Ready-only operations now fail, and so does re-init.
        assert!(matches!(
            bridge.get_state().await,
            Err(BridgeError::EngineNotReady { .. })
        ));
        assert!(matches!(
            bridge.init().await,
            Err(BridgeError::EngineNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn handshake_failure_is_terminal() {
        let module = TestEngineModule::new();
        module.set_fail_handshake(true);
        let bridge = bridge_with(module);

        let result = bridge.init().await;
        assert!(matches!(result, Err(BridgeError::HandshakeFailed(_))));
        assert_eq!(bridge.status(), BridgeStatus::Error);
    }

    #[tokio::test]
    async fn get_state_replaces_snapshot_wholesale() {
        let module = TestEngineModule::new();
        let bridge = bridge_with(module.clone());
        bridge.init().await.unwrap();

        let engine = module.engine().unwrap();
        let next = VaultState {
            join_requested: true,
            ..VaultState::default()
        };
        engine.push_update(next.clone());

        let fetched = bridge.get_state().await.unwrap();
        assert_eq!(fetched, next);
        assert_eq!(bridge.snapshot(), next);
    }

    #[tokio::test(start_paused = true)]
    async fn notification_triggers_refresh() {
        let module = TestEngineModule::new();
        let bridge = bridge_with(module.clone());
        bridge.init().await.unwrap();

        let engine = module.engine().unwrap();
        let mut rx = bridge.subscribe();

        let next = VaultState {
            join_requested: true,
            ..VaultState::default()
        };
        engine.push_update(next.clone());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), next);
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_coalesce_while_refresh_in_flight() {
        let module = TestEngineModule::new();
        let bridge = bridge_with(module.clone());
        bridge.init().await.unwrap();

        let engine = module.engine().unwrap();
        assert_eq!(engine.fetch_count(), 1);

        engine.set_fetch_delay(Duration::from_millis(50));
        engine.emit_change_notification();
        // Let the listener pick the signal up and start its refresh.
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Two more signals land while that refresh is in flight.
        engine.emit_change_notification();
        engine.emit_change_notification();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // The in-flight refresh plus exactly one coalesced follow-up.
        assert_eq!(engine.fetch_count(), 3);
        assert_eq!(engine.max_concurrent_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_calls_are_serialized() {
        let module = TestEngineModule::new();
        let bridge = bridge_with(module.clone());
        bridge.init().await.unwrap();

        let engine = module.engine().unwrap();
        engine.set_fetch_delay(Duration::from_millis(20));

        let (a, b, ()) = tokio::join!(bridge.get_state(), bridge.get_state(), async {
            engine.emit_change_notification();
        });
        a.unwrap();
        b.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.max_concurrent_fetches(), 1);
    }
}
