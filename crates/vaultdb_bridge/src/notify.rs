//! Engine-to-bridge change notification channel.
//!
//! The engine receives exactly one [`NotificationSink`] at construction
//! time and invokes it whenever its canonical state changes. The bridge
//! side drains the channel with a coalescing policy: signals that arrive
//! while a refresh is in flight collapse into a single follow-up
//! refresh, never an unbounded queue of refreshes.

use tokio::sync::mpsc;

/// The capability the engine uses to signal a canonical state change.
///
/// Carries no payload: a signal means "re-fetch the state", nothing
/// more. Cloning hands out the same single-subscriber channel.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<()>,
}

impl NotificationSink {
    /// Creates a sink and its receiving half.
    pub(crate) fn channel() -> (Self, NotificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, NotificationReceiver { rx })
    }

    /// Signals that the engine's canonical state changed.
    ///
    /// Never blocks. A signal sent after the bridge is gone is dropped
    /// silently; there is nobody left to refresh for.
    pub fn notify(&self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("state change notification dropped: bridge is gone");
        }
    }
}

/// Receiving half of the notification channel, owned by the bridge.
#[derive(Debug)]
pub(crate) struct NotificationReceiver {
    rx: mpsc::UnboundedReceiver<()>,
}

impl NotificationReceiver {
    /// Waits for the next signal. Returns `false` once every sink clone
    /// has been dropped.
    pub(crate) async fn recv(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Discards every queued signal.
    ///
    /// Called right after `recv` so signals that piled up behind the
    /// received one coalesce into the single refresh about to run.
    pub(crate) fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_is_buffered_until_received() {
        let (sink, mut rx) = NotificationSink::channel();
        sink.notify();
        assert!(rx.recv().await);
    }

    #[tokio::test]
    async fn drain_discards_queued_signals() {
        let (sink, mut rx) = NotificationSink::channel();
        sink.notify();
        sink.notify();
        sink.notify();

        assert!(rx.recv().await);
        rx.drain();

        // Nothing queued; the channel is still open, a later signal
        // arrives normally.
        sink.notify();
        assert!(rx.recv().await);
    }

    #[tokio::test]
    async fn recv_ends_when_sinks_are_dropped() {
        let (sink, mut rx) = NotificationSink::channel();
        drop(sink);
        assert!(!rx.recv().await);
    }

    #[test]
    fn notify_after_receiver_dropped_is_silent() {
        let (sink, rx) = NotificationSink::channel();
        drop(rx);
        sink.notify();
    }
}
