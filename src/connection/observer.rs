//! Connection state observers.

use tokio::sync::watch;

use super::state::ConnectionState;

/// Receives a full snapshot after every state mutation.
///
/// Called while the manager holds its state lock, so implementations must
/// return quickly and must not call back into the manager.
pub trait ConnectionObserver: Send + Sync {
    fn on_connection_state_changed(&self, snapshot: &ConnectionState);
}

/// Publishes snapshots on a [`watch`] channel for any number of readers.
pub struct WatchObserver {
    tx: watch::Sender<ConnectionState>,
}

impl WatchObserver {
    pub fn new() -> (Self, watch::Receiver<ConnectionState>) {
        let (tx, rx) = watch::channel(ConnectionState::default());
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

impl ConnectionObserver for WatchObserver {
    fn on_connection_state_changed(&self, snapshot: &ConnectionState) {
        self.tx.send_replace(snapshot.clone());
    }
}

/// Logs every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn on_connection_state_changed(&self, snapshot: &ConnectionState) {
        match snapshot.error {
            Some(ref error) => tracing::info!(
                status = %snapshot.status,
                kind = ?error.kind,
                "connection state: {}",
                error.message
            ),
            None => tracing::info!(
                status = %snapshot.status,
                connection_id = snapshot.connection_id.as_deref().unwrap_or("-"),
                "connection state changed"
            ),
        }
    }
}
