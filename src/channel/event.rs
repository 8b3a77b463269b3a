use serde_json::Value;

use super::error::ChannelError;

/// Everything the channel reports to its owner, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// An open attempt is starting.
    Attempting { attempt: u32, max: u32 },
    /// Attempt `attempt` failed; the next one starts after `delay_ms`.
    Retrying {
        attempt: u32,
        max: u32,
        delay_ms: u64,
        reason: String,
    },
    /// The transport is open.
    Connected,
    /// Retries are exhausted. Emitted at most once per connect cycle.
    PermanentFailure { error: ChannelError },
    /// The transport closed. `intentional` is true only after `close()`.
    Closed {
        code: u16,
        reason: String,
        intentional: bool,
    },
    /// An inbound JSON message.
    Message(Value),
}

impl ChannelEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Attempting { .. } => "attempting",
            Self::Retrying { .. } => "retrying",
            Self::Connected => "connected",
            Self::PermanentFailure { .. } => "permanent_failure",
            Self::Closed { .. } => "closed",
            Self::Message(_) => "message",
        }
    }
}
