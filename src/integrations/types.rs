//! Integration records, runtime details, and status types.

use aios_catalog::AppMetadata;
use serde::{Deserialize, Serialize};

/// Hosting service behind an integration. Selects the endpoint template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[default]
    Pipedream,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipedream => "pipedream",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record for one configured integration, keyed by `name_slug`.
///
/// The catalog metadata is stored flattened next to the client's own fields
/// so the file stays readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIntegrationConfig {
    #[serde(flatten)]
    pub app: AppMetadata,
    pub enabled: bool,
    #[serde(default, rename = "serviceType")]
    pub service_type: ServiceType,
}

impl PersistedIntegrationConfig {
    /// New, disabled record for a catalog app.
    pub fn new(app: AppMetadata, service_type: ServiceType) -> Self {
        Self {
            app,
            enabled: false,
            service_type,
        }
    }

    pub fn slug(&self) -> &str {
        &self.app.name_slug
    }

    /// Problems that make a stored entry unusable under `key`.
    pub fn validate(&self, key: &str) -> Result<(), String> {
        if self.app.name_slug.is_empty() {
            return Err("empty name_slug".to_owned());
        }
        if self.app.name_slug != key {
            return Err(format!("key '{key}' does not match name_slug '{}'", self.app.name_slug));
        }
        if self.app.id.is_empty() {
            return Err("empty id".to_owned());
        }
        if self.app.name.is_empty() {
            return Err("empty name".to_owned());
        }
        Ok(())
    }
}

/// Resolved view of an integration for one user, built at connect time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDetails {
    pub app_id: String,
    pub name_slug: String,
    pub service_type: ServiceType,
    pub user_id: String,
    pub enabled: bool,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Fully substituted endpoint URL.
    pub endpoint: String,
}

/// Coarse per-integration connection status for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Disconnected,
    /// An attempt is registered but tools are not loaded yet.
    Connecting,
    Connected,
}

/// What `set_enabled` ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnableOutcome {
    /// Flag already had the requested value and nothing else was needed.
    Unchanged,
    /// Enabled; a connection was already live or in flight.
    Enabled,
    /// Enabled and freshly connected.
    Connected,
    /// Enabled, but the connection attempt failed.
    ConnectFailed { reason: String },
    /// Enabled, but no user id was given so no connection was attempted.
    IdentityRequired,
    /// Disabled; any live connection was torn down.
    Disabled,
}

impl EnableOutcome {
    /// Whether the integration is enabled after the call.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}
