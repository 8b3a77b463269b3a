//! Transport seam for the duplex channel.
//!
//! The channel only needs a way to open a connection that yields a frame
//! sink and a frame stream. [`WebSocketConnector`] provides that over
//! `tokio-tungstenite`; tests plug in in-memory connectors.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::error::ChannelError;

/// Close code used when the peer drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Frame received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Close { code: u16, reason: String },
    /// Binary, ping, and pong frames; the channel ignores these.
    Other,
}

/// Frame sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<OutboundFrame, Error = ChannelError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<InboundFrame, ChannelError>> + Send>>;

/// An open connection, split into its write and read halves.
pub struct ChannelConnection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens connections to the upstream endpoint.
#[async_trait]
pub trait ChannelConnector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<ChannelConnection, ChannelError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<ChannelConnection, ChannelError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ChannelError::Transport(format!("connect: {e}")))?;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| ChannelError::Transport(format!("send: {e}")))
            .with(|frame: OutboundFrame| {
                futures::future::ready(Ok::<_, ChannelError>(into_message(frame)))
            });

        let stream = read.map(|item| match item {
            Ok(Message::Text(text)) => Ok(InboundFrame::Text(text)),
            Ok(Message::Close(Some(frame))) => Ok(InboundFrame::Close {
                code: u16::from(frame.code),
                reason: frame.reason.into_owned(),
            }),
            Ok(Message::Close(None)) => Ok(InboundFrame::Close {
                code: 1005,
                reason: String::new(),
            }),
            Ok(_) => Ok(InboundFrame::Other),
            Err(e) => Err(ChannelError::Transport(format!("read: {e}"))),
        });

        Ok(ChannelConnection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn into_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::Text(text),
        OutboundFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}
