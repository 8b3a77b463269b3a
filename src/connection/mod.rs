//! Upstream connection management.
//!
//! - [`ConnectionManager`]: drives the channel, tracks [`ConnectionState`],
//!   and answers tool calls
//! - [`envelope`]: wire envelopes exchanged with the agent server
//! - [`ConnectionObserver`]: snapshot sink for UIs and logs

pub mod envelope;
pub mod manager;
pub mod observer;
pub mod state;

pub use envelope::{
    InboundEnvelope, ProtocolError, ToolCallEnvelope, ToolResponse, ToolResponseEnvelope,
};
pub use manager::ConnectionManager;
pub use observer::{ConnectionObserver, TracingObserver, WatchObserver};
pub use state::{ConnectionErrorInfo, ConnectionState, ConnectionStatus, ErrorKind};
