//! Shared completion signal for an in-flight connect attempt.

use tokio::sync::watch;

type Outcome = Option<Result<(), String>>;

/// Settles once with the attempt's outcome; any number of clones can wait on it.
#[derive(Debug, Clone)]
pub struct ConnectSignal {
    rx: watch::Receiver<Outcome>,
}

/// Settling half, owned by the task driving the attempt.
#[derive(Debug)]
pub struct ConnectSignalSender {
    tx: watch::Sender<Outcome>,
}

/// New unsettled signal.
pub fn connect_signal() -> (ConnectSignalSender, ConnectSignal) {
    let (tx, rx) = watch::channel(None);
    (ConnectSignalSender { tx }, ConnectSignal { rx })
}

impl ConnectSignalSender {
    pub fn settle(self, outcome: Result<(), String>) {
        self.tx.send_replace(Some(outcome));
    }
}

impl ConnectSignal {
    /// Wait for the outcome. A sender dropped without settling counts as failure.
    pub async fn wait(&self) -> Result<(), String> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err("connect attempt ended without an outcome".to_owned()))
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
