//! Reconnecting duplex channel to the upstream agent server.
//!
//! - [`DuplexChannel`]: connect / send / close with exponential backoff
//! - [`ChannelEvent`]: the ordered event stream the owner consumes
//! - [`ChannelConnector`]: transport seam, with [`WebSocketConnector`] for production

pub mod backoff;
pub mod client;
pub mod error;
pub mod event;
pub mod transport;

pub use backoff::{RetryDecision, RetryPolicy};
pub use client::{ChannelEvents, DuplexChannel};
pub use error::ChannelError;
pub use event::ChannelEvent;
pub use transport::{
    ChannelConnection, ChannelConnector, FrameSink, FrameStream, InboundFrame, OutboundFrame,
    WebSocketConnector,
};
