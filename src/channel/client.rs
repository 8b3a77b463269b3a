//! Self-healing duplex channel client.
//!
//! One [`DuplexChannel`] owns one logical connection. Opening, retrying,
//! and reading happen on a background driver task; callers observe the
//! results through the [`ChannelEvent`] receiver handed out at
//! construction and through the outcome of [`DuplexChannel::connect`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::backoff::{RetryDecision, RetryPolicy};
use super::error::ChannelError;
use super::event::ChannelEvent;
use super::transport::{
    ABNORMAL_CLOSURE, ChannelConnection, ChannelConnector, FrameSink, InboundFrame, OutboundFrame,
};
use crate::config::ChannelConfig;

/// Receiving half of the channel's event stream.
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

type Outcome = Option<Result<(), ChannelError>>;

struct Driver {
    id: u64,
    token: CancellationToken,
}

struct Shared {
    policy: RetryPolicy,
    connected: bool,
    intentionally_closed: bool,
    permanently_failed: bool,
    driver: Option<Driver>,
    pending: Option<watch::Sender<Outcome>>,
    close_request: Option<(u16, String)>,
}

impl Shared {
    fn settle(&mut self, result: Result<(), ChannelError>) {
        if let Some(tx) = self.pending.take() {
            tx.send_replace(Some(result));
        }
    }

    fn owns_driver(&self, id: u64) -> bool {
        self.driver.as_ref().is_some_and(|d| d.id == id)
    }
}

struct Inner {
    url: String,
    connect_timeout: Duration,
    connector: Arc<dyn ChannelConnector>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    shared: Mutex<Shared>,
    /// Sink of the live session, tagged with the driver that opened it.
    writer: tokio::sync::Mutex<Option<(u64, FrameSink)>>,
    next_driver_id: AtomicU64,
}

enum SessionEnd {
    Cancelled,
    Lost { code: u16, reason: String },
}

/// Reconnecting client for the upstream control channel.
#[derive(Clone)]
pub struct DuplexChannel {
    inner: Arc<Inner>,
}

impl DuplexChannel {
    /// Create a channel and the receiver for its events.
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called.
    pub fn new(config: &ChannelConfig, connector: Arc<dyn ChannelConnector>) -> (Self, ChannelEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            url: config.url.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            connector,
            events,
            shared: Mutex::new(Shared {
                policy: RetryPolicy::new(
                    config.max_retries,
                    config.initial_delay_ms,
                    config.backoff_factor,
                ),
                connected: false,
                intentionally_closed: false,
                permanently_failed: false,
                driver: None,
                pending: None,
                close_request: None,
            }),
            writer: tokio::sync::Mutex::new(None),
            next_driver_id: AtomicU64::new(1),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state().map(|s| s.connected).unwrap_or(false)
    }

    /// Open the channel, retrying with backoff.
    ///
    /// Resolves immediately when already open and joins the outcome of an
    /// attempt that is already in flight instead of starting another one.
    ///
    /// # Errors
    ///
    /// [`ChannelError::RetriesExhausted`] once the retry budget is spent and
    /// [`ChannelError::Cancelled`] when [`close`](Self::close) interrupts
    /// the attempt.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let mut outcome = {
            let mut shared = self.inner.state()?;
            if shared.connected {
                return Ok(());
            }
            let joined = shared.pending.as_ref().map(watch::Sender::subscribe);
            match joined {
                Some(rx) => rx,
                None => {
                    let (tx, rx) = watch::channel(None);
                    shared.pending = Some(tx);
                    shared.policy.reset();
                    shared.permanently_failed = false;

                    let running = shared
                        .driver
                        .as_ref()
                        .is_some_and(|d| !d.token.is_cancelled());
                    if !running {
                        shared.intentionally_closed = false;
                        let id = self.inner.next_driver_id.fetch_add(1, Ordering::Relaxed);
                        let token = CancellationToken::new();
                        shared.driver = Some(Driver {
                            id,
                            token: token.clone(),
                        });
                        tokio::spawn(run_driver(Arc::clone(&self.inner), id, token));
                    }
                    rx
                }
            }
        };
        wait_outcome(&mut outcome).await
    }

    /// Serialize `message` as JSON and send it as one text frame.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NotConnected`] if the channel is not open.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ChannelError> {
        let text = serde_json::to_string(message)
            .map_err(|e| ChannelError::Serialization(e.to_string()))?;
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        let mut writer = self.inner.writer.lock().await;
        let (_, sink) = writer.as_mut().ok_or(ChannelError::NotConnected)?;
        sink.send(OutboundFrame::Text(text)).await
    }

    /// Close the channel on purpose.
    ///
    /// Cancels any pending retry, tears the transport down, and settles an
    /// in-flight [`connect`](Self::connect) as cancelled. Calling it again
    /// is a no-op.
    pub fn close(&self, code: u16, reason: &str) {
        let Ok(mut shared) = self.inner.state() else {
            return;
        };
        if shared.intentionally_closed {
            return;
        }
        tracing::info!(code, reason, "closing channel");
        shared.intentionally_closed = true;
        shared.connected = false;
        shared.close_request = Some((code, reason.to_owned()));
        let token = shared.driver.as_ref().map(|d| d.token.clone());
        match token {
            Some(token) => token.cancel(),
            None => shared.settle(Err(ChannelError::Cancelled(format!(
                "channel closed (code {code}): {reason}"
            )))),
        }
    }
}

impl Inner {
    fn state(&self) -> Result<MutexGuard<'_, Shared>, ChannelError> {
        self.shared
            .lock()
            .map_err(|_| ChannelError::Transport("channel state lock poisoned".into()))
    }

    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("channel event receiver dropped");
        }
    }

    fn deliver(&self, text: &str) {
        match serde_json::from_str(text) {
            Ok(value) => self.emit(ChannelEvent::Message(value)),
            Err(e) => tracing::warn!("dropping inbound frame that is not JSON: {e}"),
        }
    }

    async fn run_session(
        &self,
        id: u64,
        connection: ChannelConnection,
        token: &CancellationToken,
    ) -> SessionEnd {
        let ChannelConnection { sink, mut stream } = connection;
        {
            let mut writer = self.writer.lock().await;
            let close_request = match self.state() {
                Ok(mut shared) if shared.owns_driver(id) && !token.is_cancelled() => {
                    shared.connected = true;
                    shared.policy.reset();
                    shared.settle(Ok(()));
                    shared.close_request.clone()
                }
                _ => return SessionEnd::Cancelled,
            };
            // The previous session was closed but its driver has not unwound yet.
            if let Some((_, stale)) = writer.replace((id, sink)) {
                send_close(stale, close_request).await;
            }
        }
        tracing::info!(url = %self.url, "channel connected");
        self.emit(ChannelEvent::Connected);

        let end = loop {
            tokio::select! {
                _ = token.cancelled() => break SessionEnd::Cancelled,
                frame = stream.next() => match frame {
                    Some(Ok(InboundFrame::Text(text))) => self.deliver(&text),
                    Some(Ok(InboundFrame::Other)) => {}
                    Some(Ok(InboundFrame::Close { code, reason })) => {
                        break SessionEnd::Lost { code, reason };
                    }
                    Some(Err(e)) => {
                        break SessionEnd::Lost { code: ABNORMAL_CLOSURE, reason: e.to_string() };
                    }
                    None => {
                        break SessionEnd::Lost {
                            code: ABNORMAL_CLOSURE,
                            reason: "stream ended".into(),
                        };
                    }
                },
            }
        };

        // A newer driver may already own the slot after close() + connect().
        let mut slot = self.writer.lock().await;
        let (owner, close_request) = match self.state() {
            Ok(mut shared) => {
                let owner = shared.owns_driver(id);
                if owner {
                    shared.connected = false;
                }
                (owner, shared.close_request.clone())
            }
            Err(_) => (false, None),
        };
        let writer = match slot.take() {
            Some((session, sink)) if session == id => Some(sink),
            other => {
                *slot = other;
                None
            }
        };
        drop(slot);

        match end {
            SessionEnd::Cancelled => {
                if let Some(sink) = writer {
                    send_close(sink, close_request).await;
                }
            }
            SessionEnd::Lost { .. } if !owner => {}
            SessionEnd::Lost { code, ref reason } => {
                tracing::warn!(code, reason = %reason, "channel closed unexpectedly");
                self.emit(ChannelEvent::Closed {
                    code,
                    reason: reason.clone(),
                    intentional: false,
                });
            }
        }
        end
    }

    fn finish_cancelled(&self, id: u64) {
        let (code, reason) = match self.state() {
            Ok(mut shared) => {
                if !shared.owns_driver(id) {
                    return;
                }
                shared.driver = None;
                shared.connected = false;
                let request = shared
                    .close_request
                    .clone()
                    .unwrap_or((1000, String::new()));
                shared.settle(Err(ChannelError::Cancelled(format!(
                    "channel closed (code {}): {}",
                    request.0, request.1
                ))));
                request
            }
            Err(_) => return,
        };
        self.emit(ChannelEvent::Closed {
            code,
            reason,
            intentional: true,
        });
    }
}

/// Attempt loop: open, read until the session ends, back off, repeat.
async fn run_driver(inner: Arc<Inner>, id: u64, token: CancellationToken) {
    loop {
        let (attempt, max) = match inner.state() {
            Ok(shared) => (shared.policy.next_attempt(), shared.policy.max_retries),
            Err(_) => break,
        };
        tracing::info!(url = %inner.url, attempt, max, "attempting channel connection");
        inner.emit(ChannelEvent::Attempting { attempt, max });

        let opened = tokio::select! {
            _ = token.cancelled() => break,
            result = tokio::time::timeout(inner.connect_timeout, inner.connector.open(&inner.url)) => {
                result.unwrap_or(Err(ChannelError::Timeout(inner.connect_timeout)))
            }
        };

        let failure = match opened {
            Ok(connection) => match inner.run_session(id, connection, &token).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Lost { code, reason } => {
                    format!("connection closed unexpectedly (code {code}): {reason}")
                }
            },
            Err(e) => e.to_string(),
        };

        let decision = match inner.state() {
            Ok(mut shared) => {
                if shared.intentionally_closed
                    || shared.permanently_failed
                    || !shared.owns_driver(id)
                {
                    break;
                }
                shared.policy.record_failure()
            }
            Err(_) => break,
        };

        match decision {
            RetryDecision::Retry { attempt, delay_ms } => {
                tracing::warn!(attempt, max, delay_ms, error = %failure, "channel connection failed, retrying");
                inner.emit(ChannelEvent::Retrying {
                    attempt,
                    max,
                    delay_ms,
                    reason: failure,
                });
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
            }
            RetryDecision::Exhausted { attempts } => {
                let error = ChannelError::RetriesExhausted {
                    attempts,
                    last_error: failure,
                };
                tracing::error!(max, "channel permanently failed: {error}");
                if let Ok(mut shared) = inner.state() {
                    shared.permanently_failed = true;
                    if shared.owns_driver(id) {
                        shared.driver = None;
                    }
                    shared.settle(Err(error.clone()));
                }
                inner.emit(ChannelEvent::PermanentFailure { error });
                return;
            }
        }
    }
    inner.finish_cancelled(id);
}

async fn send_close(mut sink: FrameSink, request: Option<(u16, String)>) {
    let (code, reason) = request.unwrap_or((1000, String::new()));
    if let Err(e) = sink.send(OutboundFrame::Close { code, reason }).await {
        tracing::debug!("close frame not delivered: {e}");
    }
    let _ = sink.close().await;
}

async fn wait_outcome(rx: &mut watch::Receiver<Outcome>) -> Result<(), ChannelError> {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return result;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone().unwrap_or_else(|| {
                Err(ChannelError::Cancelled("connection attempt abandoned".into()))
            });
        }
    }
}
