//! Application-level connection state machine.
//!
//! [`ConnectionManager`] owns the [`DuplexChannel`] and turns its events
//! into [`ConnectionState`] transitions:
//!
//! ```text
//! disconnected --initialize()--> initializing --attempting--> connecting
//! connecting --connected--> connected --connection_established--> registered
//! connecting --permanent_failure--> error
//! registered|connected|connecting --unexpected close--> disconnected (with error)
//! any --shutdown()--> disconnected
//! ```
//!
//! Inbound `tool_call` envelopes are dispatched through the [`ToolRouter`]
//! on their own tasks, and every call is answered with exactly one
//! `tool_response` carrying the same `tool_call_id`.

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use super::envelope::{self, InboundEnvelope, ProtocolError, ToolCallEnvelope, ToolResponseEnvelope};
use super::observer::ConnectionObserver;
use super::state::{ConnectionErrorInfo, ConnectionState, ConnectionStatus, ErrorKind};
use crate::channel::{ChannelConnector, ChannelError, ChannelEvent, ChannelEvents, DuplexChannel};
use crate::config::ChannelConfig;
use crate::tools::ToolRouter;

struct ManagerInner {
    channel: DuplexChannel,
    router: Arc<ToolRouter>,
    observer: Option<Arc<dyn ConnectionObserver>>,
    state: Mutex<ConnectionState>,
    close_code: u16,
    close_reason: String,
}

/// Owner of the upstream connection and its observable state.
///
/// Must be created inside a Tokio runtime: construction spawns the task
/// that consumes channel events.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        config: &ChannelConfig,
        connector: Arc<dyn ChannelConnector>,
        router: Arc<ToolRouter>,
        observer: Option<Arc<dyn ConnectionObserver>>,
    ) -> Self {
        let (channel, events) = DuplexChannel::new(config, connector);
        let inner = Arc::new(ManagerInner {
            channel,
            router,
            observer,
            state: Mutex::new(ConnectionState::default()),
            close_code: config.close_code,
            close_reason: config.close_reason.clone(),
        });
        tokio::spawn(pump_events(Arc::downgrade(&inner), events));
        Self { inner }
    }

    /// Current state snapshot.
    pub fn get_state(&self) -> ConnectionState {
        self.inner.lock_state().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.inner.lock_state().is_registered()
    }

    /// Start connecting. A no-op unless the status is `disconnected` or `error`.
    ///
    /// Returns once the transport is open (registration follows
    /// asynchronously) or the attempt has definitively failed, in which
    /// case the state is `error`.
    ///
    /// # Errors
    ///
    /// The channel's connect error. [`ChannelError::Cancelled`] means
    /// [`shutdown`](Self::shutdown) ran meanwhile.
    pub async fn initialize(&self) -> Result<(), ChannelError> {
        let started = self.inner.update_state_if(|s| {
            if !s.status.can_initialize() {
                return false;
            }
            s.status = ConnectionStatus::Initializing;
            s.error = None;
            s.clear_attempts();
            true
        });
        if !started {
            tracing::info!(
                status = %self.inner.lock_state().status,
                "initialize ignored: connection already active"
            );
            return Ok(());
        }

        tracing::info!(url = %self.inner.channel.url(), "initializing upstream connection");
        match self.inner.channel.connect().await {
            Ok(()) => {
                self.inner.update_state_if(|s| {
                    if !matches!(
                        s.status,
                        ConnectionStatus::Initializing | ConnectionStatus::Connecting
                    ) {
                        return false;
                    }
                    s.status = ConnectionStatus::Connected;
                    s.error = None;
                    true
                });
                tracing::info!("transport open, waiting for registration");
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!("connect cancelled: {e}");
                Err(e)
            }
            Err(e) => {
                let message = e.to_string();
                let code = e.code();
                self.inner.update_state_if(|s| {
                    if s.status == ConnectionStatus::Error {
                        return false;
                    }
                    s.status = ConnectionStatus::Error;
                    s.error = Some(
                        ConnectionErrorInfo::new(
                            ErrorKind::Initialization,
                            format!("Connection permanently failed: {message}"),
                        )
                        .with_code(code),
                    );
                    true
                });
                tracing::error!("upstream connection failed: {e}");
                Err(e)
            }
        }
    }

    /// Close the channel and force `disconnected`.
    pub fn shutdown(&self) {
        tracing::info!("shutting down upstream connection");
        self.inner
            .channel
            .close(self.inner.close_code, &self.inner.close_reason);
        self.inner.update_state(|s| {
            s.status = ConnectionStatus::Disconnected;
            s.error = None;
            s.connection_id = None;
            s.clear_attempts();
        });
    }

    /// Send an application message upstream as-is.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NotConnected`] when the channel is not open.
    pub async fn send_raw(&self, message: &Value) -> Result<(), ChannelError> {
        self.inner.channel.send(message).await
    }
}

impl ManagerInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_state(&self, change: impl FnOnce(&mut ConnectionState)) {
        self.update_state_if(|s| {
            change(s);
            true
        });
    }

    /// Apply `change` under the state lock. When it returns `true` the
    /// invariants are re-applied and observers get the new snapshot.
    fn update_state_if(&self, change: impl FnOnce(&mut ConnectionState) -> bool) -> bool {
        let mut state = self.lock_state();
        if !change(&mut state) {
            return false;
        }
        state.normalize();
        if let Some(ref observer) = self.observer {
            observer.on_connection_state_changed(&state);
        }
        true
    }

    fn handle_event(self: &Arc<Self>, event: ChannelEvent) {
        tracing::trace!(event = event.name(), "channel event");
        match event {
            ChannelEvent::Attempting { attempt, max } => {
                self.update_state(|s| {
                    s.status = ConnectionStatus::Connecting;
                    s.attempt = Some(attempt);
                    s.max_attempts = Some(max);
                    s.retry_delay_ms = None;
                    s.error = None;
                });
            }
            ChannelEvent::Retrying {
                attempt,
                max,
                delay_ms,
                reason,
            } => {
                tracing::warn!(attempt, max, delay_ms, "connection attempt failed: {reason}");
                self.update_state(|s| {
                    s.status = ConnectionStatus::Connecting;
                    s.attempt = Some(attempt);
                    s.max_attempts = Some(max);
                    s.retry_delay_ms = Some(delay_ms);
                    s.error = Some(ConnectionErrorInfo::new(
                        ErrorKind::Transport,
                        format!(
                            "Connection attempt {attempt} failed. Retrying in {delay_ms}ms. Error: {reason}"
                        ),
                    ));
                });
            }
            ChannelEvent::Connected => {
                self.update_state_if(|s| {
                    if s.status == ConnectionStatus::Registered {
                        return false;
                    }
                    s.status = ConnectionStatus::Connected;
                    s.error = None;
                    true
                });
            }
            ChannelEvent::PermanentFailure { error } => {
                let message = match error {
                    ChannelError::RetriesExhausted {
                        attempts,
                        ref last_error,
                    } => format!("Failed to connect after {attempts} attempts: {last_error}"),
                    ref other => other.to_string(),
                };
                tracing::error!("{message}");
                self.update_state(|s| {
                    s.status = ConnectionStatus::Error;
                    s.error = Some(
                        ConnectionErrorInfo::new(ErrorKind::Transport, message).with_code(error.code()),
                    );
                });
            }
            ChannelEvent::Closed {
                code,
                reason,
                intentional,
            } => {
                if intentional {
                    // shutdown() already published `disconnected`; a late event
                    // must not clobber a connection started after it.
                    tracing::debug!(code, "channel closed on request");
                } else {
                    tracing::warn!(code, "channel closed unexpectedly: {reason}");
                    self.update_state(|s| {
                        s.status = ConnectionStatus::Disconnected;
                        s.error = Some(ConnectionErrorInfo::new(
                            ErrorKind::Transport,
                            format!("Connection closed unexpectedly (code {code}): {reason}"),
                        ));
                    });
                }
            }
            ChannelEvent::Message(value) => self.handle_message(&value),
        }
    }

    fn handle_message(self: &Arc<Self>, value: &Value) {
        match envelope::decode(value) {
            Ok(InboundEnvelope::ConnectionEstablished { connection_id }) => {
                tracing::info!(connection_id = %connection_id, "registered with agent server");
                self.update_state(|s| {
                    s.status = ConnectionStatus::Registered;
                    s.connection_id = Some(connection_id);
                    s.error = None;
                });
            }
            Ok(InboundEnvelope::ToolCall(call)) => self.dispatch(call),
            Ok(InboundEnvelope::Ignored { kind }) => {
                tracing::debug!(kind = kind.as_deref().unwrap_or("<none>"), "ignoring message");
            }
            Err(e) => self.protocol_error(e),
        }
    }

    fn protocol_error(self: &Arc<Self>, error: ProtocolError) {
        tracing::warn!(code = error.code(), "protocol error: {error}");
        let message = error.to_string();
        self.update_state(|s| {
            s.status = ConnectionStatus::Error;
            s.error = Some(
                ConnectionErrorInfo::new(ErrorKind::MessageProcessing, message)
                    .with_code(error.code()),
            );
        });

        if let ProtocolError::MalformedToolCall {
            tool_call_id: Some(ref id),
            ..
        } = error
        {
            let response = ToolResponseEnvelope::error(id.clone(), error.to_string());
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.respond(response).await });
        }
    }

    fn dispatch(self: &Arc<Self>, call: ToolCallEnvelope) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let ToolCallEnvelope {
                tool_call_id,
                tool_name,
                arguments,
            } = call;
            tracing::info!(tool = %tool_name, tool_call_id = %tool_call_id, "tool call");

            let router = Arc::clone(&inner.router);
            let name = tool_name.clone();
            // A nested task so a panicking tool surfaces as a JoinError.
            let execution = tokio::spawn(async move { router.invoke(&name, arguments).await });

            let response = match execution.await {
                Ok(Ok(result)) => ToolResponseEnvelope::success(tool_call_id, result),
                Ok(Err(e)) => {
                    tracing::warn!(tool = %tool_name, code = e.code(), "tool call failed: {e}");
                    ToolResponseEnvelope::error(tool_call_id, e.to_string())
                }
                Err(e) => {
                    tracing::error!(tool = %tool_name, "tool task aborted: {e}");
                    ToolResponseEnvelope::error(
                        tool_call_id,
                        format!("Tool '{tool_name}' failed unexpectedly: {e}"),
                    )
                }
            };
            inner.respond(response).await;
        });
    }

    /// Send one response. Not retried.
    async fn respond(&self, response: ToolResponseEnvelope) {
        match self.channel.send(&response).await {
            Ok(()) => tracing::debug!(
                tool_call_id = %response.tool_call_id,
                success = response.is_success(),
                "tool response sent"
            ),
            Err(e) => tracing::warn!(
                tool_call_id = %response.tool_call_id,
                "failed to send tool response: {e}"
            ),
        }
    }
}

async fn pump_events(inner: Weak<ManagerInner>, mut events: ChannelEvents) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
    tracing::debug!("channel event stream ended");
}
