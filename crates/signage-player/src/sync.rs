//! Lead/follower layout-show handshake over an intra-host bus (spec.md §2,
//! §4.8 — optional, out of the critical path: the resolver and renderer
//! both work correctly with no [`SyncBus`] configured).

use async_trait::async_trait;
use tokio::sync::broadcast;

/// A signal exchanged between displays showing the same layout in lockstep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSignal {
    /// The lead display is about to show `layout_id`; followers should show
    /// it in lockstep.
    ShowLayout { layout_id: u64 },
    /// A follower acknowledging it is ready for the next show.
    Ready { follower_id: String },
}

/// The intra-host bus abstraction. A future multi-display shell can swap in
/// a real IPC transport without the core depending on one.
#[async_trait]
pub trait SyncBus: Send + Sync {
    async fn publish(&self, signal: SyncSignal);
    async fn recv(&self) -> Option<SyncSignal>;
}

/// In-process [`SyncBus`] backed by a broadcast channel, suitable for
/// coordinating displays hosted in the same process.
pub struct BroadcastSyncBus {
    tx: broadcast::Sender<SyncSignal>,
    rx: tokio::sync::Mutex<broadcast::Receiver<SyncSignal>>,
}

impl BroadcastSyncBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = broadcast::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// A fresh handle subscribed to the same bus, for a second participant.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncSignal> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSyncBus {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl SyncBus for BroadcastSyncBus {
    async fn publish(&self, signal: SyncSignal) {
        // No active listeners is a normal state (e.g. a single-display
        // deployment); dropping the signal is correct, not an error.
        let _ = self.tx.send(signal);
    }

    async fn recv(&self) -> Option<SyncSignal> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(signal) => return Some(signal),
                Err(broadcast::error::RecvError::Closed) => return None,
                // A slow follower missed some signals; skip ahead rather
                // than returning stale ones.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }
}
