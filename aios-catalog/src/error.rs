//! Error types for the aios-catalog crate.
//!
//! Messages never include the configured API token.

/// Errors that can occur while talking to the integration catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The catalog answered with a non-success status code.
    #[error("catalog returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Short description of the failed request.
        message: String,
    },

    /// The catalog response did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid catalog configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl CatalogError {
    /// Whether this error came from the network rather than from configuration.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}

/// Convenience type alias for aios-catalog results.
pub type Result<T> = std::result::Result<T, CatalogError>;
