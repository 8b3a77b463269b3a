//! Remote integrations: configuration, discovery, and live connections.
//!
//! - [`RemoteIntegrationManager`]: lifecycle and aggregated tool listings
//! - [`ConfigStore`] / [`JsonFileStore`]: whole-collection persistence
//! - [`RemoteTransport`] / [`RemoteTransportFactory`]: transport seam, with
//!   [`HttpMcpTransport`] for MCP streamable HTTP

pub mod error;
pub mod manager;
pub mod mcp_http;
pub mod signal;
pub mod store;
pub mod transport;
pub mod types;

pub use error::IntegrationError;
pub use manager::RemoteIntegrationManager;
pub use mcp_http::{HttpMcpTransport, HttpMcpTransportFactory};
pub use signal::{ConnectSignal, connect_signal};
pub use store::{ConfigStore, IntegrationMap, JsonFileStore};
pub use transport::{RemoteTransport, RemoteTransportFactory};
pub use types::{
    EnableOutcome, IntegrationStatus, PersistedIntegrationConfig, RuntimeDetails, ServiceType,
};
