//! Dispatch of namespaced tool calls.

use std::sync::Arc;

use serde_json::Value;

use super::error::{RoutingError, ToolExecutionError};
use super::local::LocalCapabilityProvider;
use super::name::{Namespace, ToolName};
use super::types::ToolDescriptor;
use crate::integrations::{IntegrationError, RemoteIntegrationManager};

/// Routes `local__…` names to the local provider and `remote__…` names to
/// the matching live integration.
///
/// Holds no state of its own. Every failure comes back as a
/// [`RoutingError`].
#[derive(Clone)]
pub struct ToolRouter {
    local: Arc<dyn LocalCapabilityProvider>,
    remote: RemoteIntegrationManager,
}

impl ToolRouter {
    pub fn new(local: Arc<dyn LocalCapabilityProvider>, remote: RemoteIntegrationManager) -> Self {
        Self { local, remote }
    }

    pub fn remote(&self) -> &RemoteIntegrationManager {
        &self.remote
    }

    /// Invoke a tool by qualified name.
    ///
    /// # Errors
    ///
    /// A [`RoutingError`] describing the malformed name, the missing or
    /// disconnected scope, or the tool's own failure.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, RoutingError> {
        let ToolName {
            namespace,
            scope,
            local,
        } = ToolName::parse(name)?;

        match namespace {
            Namespace::Local => self
                .local
                .invoke(&scope, &local, args)
                .await
                .map_err(|e| match e {
                    ToolExecutionError::UnknownScope(_) => RoutingError::UnknownScope {
                        scope,
                        tool: local,
                    },
                    other => RoutingError::LocalToolFailed {
                        message: other.to_string(),
                        tool: local,
                        scope,
                    },
                }),
            Namespace::Remote => self
                .remote
                .call_tool(&scope, &local, args)
                .await
                .map_err(|e| match e {
                    IntegrationError::NotConfigured(_) => {
                        RoutingError::RemoteScopeUnknown { scope, tool: local }
                    }
                    IntegrationError::NotConnected(_) => {
                        RoutingError::ScopeNotConnected { scope, tool: local }
                    }
                    other => RoutingError::RemoteToolFailed {
                        message: other.to_string(),
                        tool: local,
                        scope,
                    },
                }),
        }
    }

    /// Local tools followed by every ready remote tool, all qualified.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = self.local.list_active_tools().await;
        tools.extend(self.remote.all_active_tools());
        tools
    }
}
