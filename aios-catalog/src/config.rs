//! Catalog client configuration with sensible defaults.
//!
//! [`CatalogConfig`] controls the catalog endpoint, authentication, request
//! timeout, and how missing app icons are filled in.

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Default catalog API root.
pub const DEFAULT_BASE_URL: &str = "https://mcp.pipedream.com/api";

/// Default logo URL template; `{app_hid}` is replaced with the app's hash id.
pub const DEFAULT_LOGO_URL_TEMPLATE: &str = "https://pipedream.com/s.v0/{app_hid}/logo/orig";

/// Configuration for the integration catalog client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// API root, without a trailing `/apps`.
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub api_token: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Template used to build an icon URL when the catalog omits `img_src`.
    pub logo_url_template: String,
    /// Custom User-Agent string. Defaults to `aios-catalog/<version>`.
    pub user_agent: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_token: None,
            timeout_seconds: 15,
            logo_url_template: DEFAULT_LOGO_URL_TEMPLATE.to_owned(),
            user_agent: None,
        }
    }
}

impl CatalogConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `base_url` must parse as an http(s) URL
    /// - `timeout_seconds` must be greater than 0
    /// - `logo_url_template` must contain `{app_hid}`
    pub fn validate(&self) -> Result<(), CatalogError> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| CatalogError::Config(format!("invalid base_url '{}': {e}", self.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CatalogError::Config(format!(
                "base_url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(CatalogError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if !self.logo_url_template.contains("{app_hid}") {
            return Err(CatalogError::Config(
                "logo_url_template must contain {app_hid}".into(),
            ));
        }
        Ok(())
    }

    /// Build the fallback icon URL for an app hash id.
    pub fn logo_url(&self, app_hid: &str) -> String {
        self.logo_url_template.replace("{app_hid}", app_hid)
    }
}
