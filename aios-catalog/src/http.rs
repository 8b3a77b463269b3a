//! Shared HTTP client for catalog requests.

use std::time::Duration;

use crate::config::CatalogConfig;
use crate::error::CatalogError;

/// User-Agent sent when the config does not override it.
pub const DEFAULT_USER_AGENT: &str = concat!("aios-catalog/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] configured for catalog requests.
///
/// # Errors
///
/// Returns [`CatalogError::Http`] if the client cannot be constructed.
pub fn build_client(config: &CatalogConfig) -> Result<reqwest::Client, CatalogError> {
    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| CatalogError::Http(format!("failed to build HTTP client: {e}")))
}
