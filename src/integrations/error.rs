//! Remote integration errors.

/// Stable error codes for integration failures.
pub mod error_codes {
    pub const CONFIG: &str = "INTEGRATION_CONFIG";
    pub const NOT_CONFIGURED: &str = "INTEGRATION_NOT_CONFIGURED";
    pub const DISABLED: &str = "INTEGRATION_DISABLED";
    pub const NOT_CONNECTED: &str = "INTEGRATION_NOT_CONNECTED";
    pub const CONNECT: &str = "INTEGRATION_CONNECT";
    pub const TRANSPORT: &str = "INTEGRATION_TRANSPORT";
    pub const TOOL_CALL: &str = "INTEGRATION_TOOL_CALL";
    pub const STORAGE: &str = "INTEGRATION_STORAGE";
}

/// Failure of a remote integration operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntegrationError {
    /// Invalid configuration request, e.g. a duplicate slug.
    #[error("integration config error: {0}")]
    Config(String),

    #[error("remote integration '{0}' is not configured")]
    NotConfigured(String),

    #[error("remote integration '{0}' is disabled")]
    Disabled(String),

    /// No live connection with loaded tools.
    #[error("remote integration '{0}' is not connected")]
    NotConnected(String),

    /// Handshake or tool-load failure, or an attempt cancelled by disconnect.
    #[error("failed to connect remote integration: {0}")]
    Connect(String),

    /// Request-level failure talking to a remote server.
    #[error("remote transport error: {0}")]
    Transport(String),

    /// The remote tool ran and reported an error.
    #[error("remote tool error: {0}")]
    ToolCall(String),

    /// The configuration store could not be read or written.
    #[error("integration storage error: {0}")]
    Storage(String),
}

impl IntegrationError {
    /// Stable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG,
            Self::NotConfigured(_) => error_codes::NOT_CONFIGURED,
            Self::Disabled(_) => error_codes::DISABLED,
            Self::NotConnected(_) => error_codes::NOT_CONNECTED,
            Self::Connect(_) => error_codes::CONNECT,
            Self::Transport(_) => error_codes::TRANSPORT,
            Self::ToolCall(_) => error_codes::TOOL_CALL,
            Self::Storage(_) => error_codes::STORAGE,
        }
    }
}
