//! Client configuration.
//!
//! Loaded from `config.toml`; every section and field has a default so a
//! partial (or empty) file is valid. Environment overrides are applied on
//! top with [`ClientConfig::apply_env_overrides`].

pub mod persist;

use std::path::{Path, PathBuf};

use aios_catalog::CatalogConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Upstream WebSocket endpoint override.
pub const ENV_WEBSOCKET_URL: &str = "AIOS_WEBSOCKET_URL";
/// Catalog API root override.
pub const ENV_CATALOG_BASE_URL: &str = "AIOS_CATALOG_BASE_URL";
/// Catalog bearer token.
pub const ENV_CATALOG_TOKEN: &str = "AIOS_CATALOG_TOKEN";
/// Remote integration endpoint template override.
pub const ENV_MCP_URL_TEMPLATE: &str = "AIOS_MCP_URL_TEMPLATE";
/// Log filter override, same syntax as `RUST_LOG`.
pub const ENV_LOG: &str = "AIOS_LOG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub channel: ChannelConfig,
    pub integrations: IntegrationsConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

/// Upstream control channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket URL of the agent server.
    pub url: String,
    /// Retries after the first failed open before giving up.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay for each further retry.
    pub backoff_factor: f64,
    /// Upper bound for a single open attempt.
    pub connect_timeout_secs: u64,
    /// Close code sent on shutdown.
    pub close_code: u16,
    /// Close reason sent on shutdown.
    pub close_reason: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:2024/ws".to_owned(),
            max_retries: 5,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            connect_timeout_secs: 10,
            close_code: 1000,
            close_reason: "Client shutting down".to_owned(),
        }
    }
}

/// Remote integration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Where configured integrations are persisted. Defaults to
    /// `<data_dir>/remote-integrations.json`.
    pub store_file: Option<PathBuf>,
    /// Endpoint template for hosted integrations; `{user_id}` and `{slug}`
    /// are substituted.
    pub endpoint_template: String,
    /// How long `disconnect` waits for an in-flight connect to settle.
    pub disconnect_timeout_ms: u64,
    /// Pause between disconnect and connect during a reconnect.
    pub reconnect_settle_ms: u64,
    /// Per-request timeout for remote transports.
    pub request_timeout_secs: u64,
    /// Client name announced to remote servers.
    pub client_name: String,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            store_file: None,
            endpoint_template: "http://127.0.0.1:3010/v1/{user_id}/{slug}".to_owned(),
            disconnect_timeout_ms: 5000,
            reconnect_settle_ms: 250,
            request_timeout_secs: 30,
            client_name: "aios-desktop".to_owned(),
        }
    }
}

impl IntegrationsConfig {
    /// Resolved store path.
    pub fn store_path(&self) -> PathBuf {
        self.store_file
            .clone()
            .unwrap_or_else(|| crate::app_dirs::data_dir().join("remote-integrations.json"))
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when neither `AIOS_LOG` nor `RUST_LOG` is set.
    pub level: String,
    /// Also write daily-rotated log files under the logs directory.
    pub log_to_file: bool,
    /// File name prefix for rotated logs.
    pub file_prefix: String,
    /// Rotated files kept on startup; older ones are deleted.
    pub max_log_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            log_to_file: false,
            file_prefix: "aios".to_owned(),
            max_log_files: 10,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse '{}': {e}", path.display()))
        })
    }

    /// Load from `path` if it exists, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration atomically, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))?;
        persist::write_atomic(path, &content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_dir().join("config.toml")
    }

    /// Apply `AIOS_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_WEBSOCKET_URL) {
            self.channel.url = url;
        }
        if let Some(base) = get(ENV_CATALOG_BASE_URL) {
            self.catalog.base_url = base;
        }
        if let Some(token) = get(ENV_CATALOG_TOKEN) {
            self.catalog.api_token = Some(token);
        }
        if let Some(template) = get(ENV_MCP_URL_TEMPLATE) {
            self.integrations.endpoint_template = template;
        }
        if let Some(level) = get(ENV_LOG) {
            self.logging.level = level;
        }
    }

    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.channel.url).map_err(|e| {
            ClientError::Config(format!("invalid channel.url '{}': {e}", self.channel.url))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::Config(format!(
                "channel.url must use ws or wss, got '{}'",
                url.scheme()
            )));
        }
        if self.channel.backoff_factor.is_nan() || self.channel.backoff_factor < 1.0 {
            return Err(ClientError::Config(
                "channel.backoff_factor must be at least 1.0".into(),
            ));
        }
        if self.channel.connect_timeout_secs == 0 {
            return Err(ClientError::Config(
                "channel.connect_timeout_secs must be greater than 0".into(),
            ));
        }
        let template = &self.integrations.endpoint_template;
        if !template.contains("{user_id}") || !template.contains("{slug}") {
            return Err(ClientError::Config(
                "integrations.endpoint_template must contain {user_id} and {slug}".into(),
            ));
        }
        if self.integrations.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "integrations.request_timeout_secs must be greater than 0".into(),
            ));
        }
        self.catalog.validate()?;
        Ok(())
    }
}
