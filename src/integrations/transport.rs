//! Transport seam for remote tool servers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::IntegrationError;
use super::types::RuntimeDetails;
use crate::tools::ToolDescriptor;

/// One session with a remote tool server.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Open the session (handshake).
    async fn connect(&self) -> Result<(), IntegrationError>;

    /// Tools the server exposes, with their unqualified names.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, IntegrationError>;

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, IntegrationError>;

    /// End the session. Must be safe to call more than once.
    async fn close(&self) -> Result<(), IntegrationError>;
}

/// Builds transports for resolved integrations.
pub trait RemoteTransportFactory: Send + Sync {
    fn create(
        &self,
        endpoint: &str,
        details: &RuntimeDetails,
    ) -> Result<Arc<dyn RemoteTransport>, IntegrationError>;
}
