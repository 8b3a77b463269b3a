//! Errors raised by the duplex channel.

use std::time::Duration;

/// Stable error codes for channel failures.
pub mod error_codes {
    pub const NOT_CONNECTED: &str = "CHANNEL_NOT_CONNECTED";
    pub const TRANSPORT: &str = "CHANNEL_TRANSPORT";
    pub const TIMEOUT: &str = "CHANNEL_TIMEOUT";
    pub const RETRIES_EXHAUSTED: &str = "CHANNEL_RETRIES_EXHAUSTED";
    pub const CANCELLED: &str = "CHANNEL_CANCELLED";
    pub const SERIALIZATION: &str = "CHANNEL_SERIALIZATION";
}

/// Failure of a channel operation.
///
/// Cloneable so that one connect outcome can be handed to every caller
/// joined on the same attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// `send` was called while the channel was not open.
    #[error("channel is not connected")]
    NotConnected,

    /// The underlying transport failed to open, read, or write.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single open attempt did not complete in time.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Every allowed attempt failed.
    #[error("failed to connect after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of open attempts made.
        attempts: u32,
        /// Failure reported by the final attempt.
        last_error: String,
    },

    /// The connect outcome was abandoned because the channel was closed.
    #[error("connection cancelled: {0}")]
    Cancelled(String),

    /// An outbound message could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ChannelError {
    /// Stable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => error_codes::NOT_CONNECTED,
            Self::Transport(_) => error_codes::TRANSPORT,
            Self::Timeout(_) => error_codes::TIMEOUT,
            Self::RetriesExhausted { .. } => error_codes::RETRIES_EXHAUSTED,
            Self::Cancelled(_) => error_codes::CANCELLED,
            Self::Serialization(_) => error_codes::SERIALIZATION,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
