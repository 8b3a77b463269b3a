//! Observable connection state.

use serde::{Deserialize, Serialize};

/// Lifecycle of the upstream connection as the UI sees it.
///
/// `Registered` is the only state in which the agent server can route
/// tool calls to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Initializing,
    Connecting,
    Connected,
    Registering,
    Registered,
    Error,
}

impl ConnectionStatus {
    /// Whether `initialize()` may start a new connection from this state.
    pub fn can_initialize(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// States that keep retry bookkeeping (`attempt`, `max_attempts`, `retry_delay_ms`).
    pub fn keeps_attempt_fields(self) -> bool {
        matches!(self, Self::Connecting | Self::Error)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Initializing => "initializing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Category attached to a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Initialization,
    Transport,
    MessageProcessing,
    Integration,
    Unknown,
}

/// Human-readable error carried in a [`ConnectionState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionErrorInfo {
    pub message: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ConnectionErrorInfo {
    /// New error stamped with the current time.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            code: None,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Snapshot of the connection published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ConnectionErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            connection_id: None,
            error: None,
            attempt: None,
            max_attempts: None,
            retry_delay_ms: None,
        }
    }
}

impl ConnectionState {
    pub fn is_registered(&self) -> bool {
        self.status == ConnectionStatus::Registered
    }

    /// Re-establish the field invariants after a mutation.
    ///
    /// `connection_id` only survives in `Registered`; retry bookkeeping only
    /// survives in `Connecting` and `Error`.
    pub fn normalize(&mut self) {
        if self.status != ConnectionStatus::Registered {
            self.connection_id = None;
        }
        if !self.status.keeps_attempt_fields() {
            self.attempt = None;
            self.max_attempts = None;
            self.retry_delay_ms = None;
        }
    }

    pub fn clear_attempts(&mut self) {
        self.attempt = None;
        self.max_attempts = None;
        self.retry_delay_ms = None;
    }
}
