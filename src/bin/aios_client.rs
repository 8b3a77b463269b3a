//! Headless aios client.
//!
//! Usage: `aios-client [CONFIG_PATH]`
//!
//! Connects to the agent server, answers tool calls until ctrl-c, then
//! shuts down cleanly. Set `AIOS_USER_ID` to also connect every enabled
//! remote integration at startup.

use std::path::PathBuf;
use std::sync::Arc;

use aios_catalog::HttpCatalog;
use aios_client::config::ClientConfig;
use aios_client::connection::{ConnectionManager, TracingObserver};
use aios_client::integrations::{HttpMcpTransportFactory, JsonFileStore, RemoteIntegrationManager};
use aios_client::tools::{LocalToolRegistry, ToolRouter};
use aios_client::{WebSocketConnector, diagnostics};
use anyhow::Context;

const ENV_USER_ID: &str = "AIOS_USER_ID";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(ClientConfig::default_config_path);

    let mut config = ClientConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;

    let _log_guard = diagnostics::init_tracing(&config.logging)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "aios-client starting"
    );

    let catalog = Arc::new(HttpCatalog::new(config.catalog.clone())?);
    let store = Arc::new(JsonFileStore::new(config.integrations.store_path()));
    let transports = Arc::new(HttpMcpTransportFactory::new(&config.integrations)?);
    let integrations =
        RemoteIntegrationManager::load(config.integrations.clone(), store, catalog, transports)
            .await
            .context("failed to load remote integrations")?;

    let local = Arc::new(LocalToolRegistry::new());
    let router = Arc::new(ToolRouter::new(local, integrations.clone()));
    let connection = ConnectionManager::new(
        &config.channel,
        Arc::new(WebSocketConnector),
        router,
        Some(Arc::new(TracingObserver)),
    );

    if let Err(e) = connection.initialize().await {
        tracing::error!("upstream connection failed: {e}");
    }

    if let Some(user_id) = std::env::var(ENV_USER_ID).ok().filter(|u| !u.trim().is_empty()) {
        let results = integrations.connect_all_enabled(&user_id).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(
            connected = results.len() - failed,
            failed,
            "remote integrations started"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");

    connection.shutdown();
    integrations.disconnect_all().await;

    tracing::info!("aios-client shut down cleanly");
    Ok(())
}
