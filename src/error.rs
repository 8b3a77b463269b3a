//! Error types for the aios client.

use crate::channel::ChannelError;
use crate::integrations::IntegrationError;

/// Top-level error type for the desktop orchestration client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration could not be loaded, saved, or validated.
    #[error("config error: {0}")]
    Config(String),

    /// Upstream control channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Remote integration management error.
    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),

    /// Integration catalog error.
    #[error("catalog error: {0}")]
    Catalog(#[from] aios_catalog::CatalogError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ClientError>;
