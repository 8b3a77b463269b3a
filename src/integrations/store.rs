//! Durable storage for configured integrations.
//!
//! The store only ever reads or writes the whole collection; there is no
//! per-record update.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::error::IntegrationError;
use super::types::PersistedIntegrationConfig;
use crate::config::persist::write_atomic;

/// All configured integrations, keyed by slug.
pub type IntegrationMap = BTreeMap<String, PersistedIntegrationConfig>;

/// Whole-collection persistence for integration records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_all(&self) -> Result<IntegrationMap, IntegrationError>;

    async fn save_all(&self, configs: &IntegrationMap) -> Result<(), IntegrationError>;
}

/// Stores the map as one pretty-printed JSON object.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move an unreadable file aside so the next save does not destroy it.
    async fn quarantine(&self) {
        let mut aside = self.path.clone().into_os_string();
        aside.push(".corrupt");
        match tokio::fs::rename(&self.path, &aside).await {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                "moved unreadable integration store to {}",
                PathBuf::from(aside).display()
            ),
            Err(e) => tracing::warn!(path = %self.path.display(), "could not move unreadable store aside: {e}"),
        }
    }
}

/// Keep the entries that parse and validate; log the rest.
fn decode_entries(raw: BTreeMap<String, Value>) -> IntegrationMap {
    let mut configs = IntegrationMap::new();
    for (key, value) in raw {
        let record: PersistedIntegrationConfig = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(slug = %key, "skipping unparseable integration entry: {e}");
                continue;
            }
        };
        if let Err(reason) = record.validate(&key) {
            tracing::warn!(slug = %key, "skipping invalid integration entry: {reason}");
            continue;
        }
        configs.insert(key, record);
    }
    configs
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load_all(&self) -> Result<IntegrationMap, IntegrationError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no integration store yet");
                return Ok(IntegrationMap::new());
            }
            Err(e) => {
                return Err(IntegrationError::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if data.trim().is_empty() {
            return Ok(IntegrationMap::new());
        }

        let raw: BTreeMap<String, Value> = match serde_json::from_str(&data) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "integration store is not a JSON object: {e}");
                self.quarantine().await;
                return Ok(IntegrationMap::new());
            }
        };

        let configs = decode_entries(raw);
        tracing::info!(count = configs.len(), "loaded configured integrations");
        Ok(configs)
    }

    async fn save_all(&self, configs: &IntegrationMap) -> Result<(), IntegrationError> {
        let json = serde_json::to_string_pretty(configs)
            .map_err(|e| IntegrationError::Storage(format!("failed to serialize integrations: {e}")))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| IntegrationError::Storage(format!("store writer task failed: {e}")))?
            .map_err(|e| IntegrationError::Storage(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), count = configs.len(), "saved integrations");
        Ok(())
    }
}
