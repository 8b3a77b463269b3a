//! aios-client: desktop orchestration client for the aios agent server.
//!
//! The client keeps one long-lived control channel open to the agent
//! server, receives tool-call requests over it, runs them locally or on a
//! remote integration, and sends the results back.
//!
//! # Architecture
//!
//! - **Channel** ([`channel`]): reconnecting WebSocket with exponential backoff
//! - **Connection** ([`connection`]): state machine from transport events to
//!   registration, plus tool-call dispatch
//! - **Tools** ([`tools`]): `<namespace>__<scope>__<tool>` routing to local
//!   providers or remote integrations
//! - **Integrations** ([`integrations`]): persisted remote integrations,
//!   catalog discovery, and per-integration connection lifecycle
//!
//! Inbound message → channel → connection manager → tool router →
//! {local provider | remote integration} → connection manager → outbound
//! response.

pub mod app_dirs;
pub mod channel;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod integrations;
pub mod tools;

pub use channel::{ChannelEvent, DuplexChannel, WebSocketConnector};
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionObserver, ConnectionState, ConnectionStatus};
pub use error::{ClientError, Result};
pub use integrations::{EnableOutcome, RemoteIntegrationManager};
pub use tools::{LocalToolRegistry, ToolRouter};
