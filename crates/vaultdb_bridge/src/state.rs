//! Reactive state container.

use crate::model::VaultState;
use tokio::sync::watch;

/// The UI-visible snapshot cell.
///
/// Single writer (the bridge), many readers. Updates replace the whole
/// snapshot; partial merges do not exist. Readers either grab a clone
/// with [`snapshot`](StateCell::snapshot) or observe replacements
/// through a [`subscribe`](StateCell::subscribe)d watch receiver.
///
/// The initial value is [`VaultState::default()`], the well-defined
/// empty snapshot, so consumers never observe an "absent" state.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<VaultState>,
    // Held so the channel stays open with zero external subscribers.
    _rx: watch::Receiver<VaultState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(VaultState::default());
        Self { tx, _rx: rx }
    }

    /// Returns a clone of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> VaultState {
        self.tx.borrow().clone()
    }

    /// Subscribes to snapshot replacements.
    ///
    /// The receiver observes the value current at subscription time and
    /// every replacement after it.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<VaultState> {
        self.tx.subscribe()
    }

    /// Replaces the snapshot wholesale.
    pub(crate) fn replace(&self, next: VaultState) {
        self.tx.send_replace(next);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceInfo, MetaVault};

    fn registered_state() -> VaultState {
        VaultState {
            join_requested: false,
            meta_vault: Some(MetaVault {
                vault_name: "family".into(),
                device: DeviceInfo::generate("laptop"),
            }),
            vault: None,
        }
    }

    #[test]
    fn starts_with_empty_snapshot() {
        let cell = StateCell::new();
        assert_eq!(cell.snapshot(), VaultState::default());
    }

    #[test]
    fn replace_is_wholesale() {
        let cell = StateCell::new();
        let next = registered_state();

        cell.replace(next.clone());
        assert_eq!(cell.snapshot(), next);

        cell.replace(VaultState::default());
        assert_eq!(cell.snapshot(), VaultState::default());
    }

    #[tokio::test]
    async fn subscriber_observes_replacement() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();

        let next = registered_state();
        cell.replace(next.clone());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), next);
    }
}
