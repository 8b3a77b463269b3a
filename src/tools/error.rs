//! Tool routing and execution errors.

/// Stable error codes for routing failures.
pub mod error_codes {
    pub const MALFORMED_NAME: &str = "ROUTING_MALFORMED_NAME";
    pub const UNKNOWN_NAMESPACE: &str = "ROUTING_UNKNOWN_NAMESPACE";
    pub const UNKNOWN_SCOPE: &str = "ROUTING_UNKNOWN_SCOPE";
    pub const REMOTE_SCOPE_UNKNOWN: &str = "ROUTING_REMOTE_SCOPE_UNKNOWN";
    pub const SCOPE_NOT_CONNECTED: &str = "ROUTING_SCOPE_NOT_CONNECTED";
    pub const LOCAL_TOOL_FAILED: &str = "ROUTING_LOCAL_TOOL_FAILED";
    pub const REMOTE_TOOL_FAILED: &str = "ROUTING_REMOTE_TOOL_FAILED";
}

/// Failure reported by a local capability provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolExecutionError {
    /// No provider is registered under the scope.
    #[error("unknown scope '{0}'")]
    UnknownScope(String),

    /// The scope exists but has no tool of that name, or it is disabled.
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// Structured failure returned by [`ToolRouter::invoke`](super::ToolRouter::invoke).
///
/// Every variant renders to a message suitable for the `error` field of a
/// tool response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("Malformed tool name '{name}': expected <namespace>__<scope>__<tool>")]
    MalformedName { name: String },

    #[error("Tool name '{name}' has unknown namespace '{namespace}' (expected local or remote)")]
    UnknownNamespace { namespace: String, name: String },

    #[error("No local provider registered for scope '{scope}' (tool '{tool}')")]
    UnknownScope { scope: String, tool: String },

    #[error("No remote integration configured for scope '{scope}' (tool '{tool}')")]
    RemoteScopeUnknown { scope: String, tool: String },

    #[error("Remote integration '{scope}' is not connected (tool '{tool}')")]
    ScopeNotConnected { scope: String, tool: String },

    #[error("Local tool '{tool}' in scope '{scope}' failed: {message}")]
    LocalToolFailed {
        tool: String,
        scope: String,
        message: String,
    },

    #[error("Remote tool '{tool}' on integration '{scope}' failed: {message}")]
    RemoteToolFailed {
        tool: String,
        scope: String,
        message: String,
    },
}

impl RoutingError {
    /// Stable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedName { .. } => error_codes::MALFORMED_NAME,
            Self::UnknownNamespace { .. } => error_codes::UNKNOWN_NAMESPACE,
            Self::UnknownScope { .. } => error_codes::UNKNOWN_SCOPE,
            Self::RemoteScopeUnknown { .. } => error_codes::REMOTE_SCOPE_UNKNOWN,
            Self::ScopeNotConnected { .. } => error_codes::SCOPE_NOT_CONNECTED,
            Self::LocalToolFailed { .. } => error_codes::LOCAL_TOOL_FAILED,
            Self::RemoteToolFailed { .. } => error_codes::REMOTE_TOOL_FAILED,
        }
    }
}
