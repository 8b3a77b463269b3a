//! Remote integration lifecycle.
//!
//! [`RemoteIntegrationManager`] owns two collections:
//!
//! - the configured integrations, persisted through a [`ConfigStore`]
//! - the active connections, in memory only
//!
//! Per integration there is at most one connect attempt in flight. A second
//! `connect` for the same slug joins the first attempt's [`ConnectSignal`]
//! instead of opening another transport. `disconnect` removes the map entry
//! before it waits on anything, and every attempt re-checks on completion
//! that it still owns its entry, so a settled attempt never resurrects an
//! integration that was disconnected underneath it.
//!
//! Both collections sit behind plain mutexes that are never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use aios_catalog::{AppMetadata, CatalogService, DiscoveryPage, MetadataCache, PageInfo};
use futures::future::join_all;
use serde_json::Value;

use super::error::IntegrationError;
use super::signal::{ConnectSignal, ConnectSignalSender, connect_signal};
use super::store::{ConfigStore, IntegrationMap};
use super::transport::{RemoteTransport, RemoteTransportFactory};
use super::types::{
    EnableOutcome, IntegrationStatus, PersistedIntegrationConfig, RuntimeDetails, ServiceType,
};
use crate::config::IntegrationsConfig;
use crate::tools::{Namespace, ToolDescriptor, ToolName};

/// One entry of the active-connections map.
#[derive(Clone)]
struct ActiveConnection {
    attempt_id: u64,
    details: RuntimeDetails,
    transport: Arc<dyn RemoteTransport>,
    /// Empty until the attempt finalizes; non-empty means ready.
    tools: Vec<ToolDescriptor>,
    signal: ConnectSignal,
}

enum Registration {
    Join(ConnectSignal),
    Start {
        attempt_id: u64,
        transport: Arc<dyn RemoteTransport>,
        tx: ConnectSignalSender,
        signal: ConnectSignal,
    },
}

struct Inner {
    settings: IntegrationsConfig,
    store: Arc<dyn ConfigStore>,
    catalog: Arc<dyn CatalogService>,
    transports: Arc<dyn RemoteTransportFactory>,
    metadata: MetadataCache,
    configured: Mutex<IntegrationMap>,
    active: Mutex<HashMap<String, ActiveConnection>>,
    next_attempt: AtomicU64,
    /// Serializes load-modify-save of the configured map.
    persist_lock: tokio::sync::Mutex<()>,
}

/// Configured remote integrations and their live connections.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RemoteIntegrationManager {
    inner: Arc<Inner>,
}

impl RemoteIntegrationManager {
    /// Build a manager from the records currently in `store`.
    ///
    /// # Errors
    ///
    /// [`IntegrationError::Storage`] if the store cannot be read.
    pub async fn load(
        settings: IntegrationsConfig,
        store: Arc<dyn ConfigStore>,
        catalog: Arc<dyn CatalogService>,
        transports: Arc<dyn RemoteTransportFactory>,
    ) -> Result<Self, IntegrationError> {
        let configured = store.load_all().await?;
        tracing::info!(count = configured.len(), "remote integration manager ready");
        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                store,
                catalog,
                transports,
                metadata: MetadataCache::new(),
                configured: Mutex::new(configured),
                active: Mutex::new(HashMap::new()),
                next_attempt: AtomicU64::new(1),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    fn configured(&self) -> MutexGuard<'_, IntegrationMap> {
        self.inner.configured.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, ActiveConnection>> {
        self.inner.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_enabled(&self, slug: &str) -> bool {
        self.configured().get(slug).is_some_and(|c| c.enabled)
    }

    fn is_active(&self, slug: &str) -> bool {
        self.active().contains_key(slug)
    }

    fn take_active(&self, slug: &str) -> Option<ActiveConnection> {
        self.active().remove(slug)
    }

    fn remove_if_current(&self, slug: &str, attempt_id: u64) {
        let mut active = self.active();
        if active.get(slug).is_some_and(|e| e.attempt_id == attempt_id) {
            active.remove(slug);
        }
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Apply `change` to the configured map and persist the result.
    ///
    /// Nothing is written when the map is unchanged. A failed save restores
    /// the previous map.
    async fn mutate_config<R>(
        &self,
        change: impl FnOnce(&mut IntegrationMap) -> Result<R, IntegrationError>,
    ) -> Result<R, IntegrationError> {
        let _persist = self.inner.persist_lock.lock().await;

        let (previous, snapshot, result) = {
            let mut configured = self.configured();
            let previous = configured.clone();
            let result = change(&mut configured)?;
            (previous, configured.clone(), result)
        };
        if snapshot == previous {
            return Ok(result);
        }

        if let Err(e) = self.inner.store.save_all(&snapshot).await {
            *self.configured() = previous;
            tracing::warn!("integration config save failed, change rolled back: {e}");
            return Err(match e {
                IntegrationError::Storage(_) => e,
                other => IntegrationError::Storage(other.to_string()),
            });
        }
        Ok(result)
    }

    /// Configure a new integration from catalog metadata. It starts disabled.
    ///
    /// # Errors
    ///
    /// [`IntegrationError::Config`] if the app lacks a slug, id or name, or the
    /// slug is already configured,
    /// [`IntegrationError::Storage`] if the save fails.
    pub async fn add_integration(
        &self,
        app: AppMetadata,
    ) -> Result<PersistedIntegrationConfig, IntegrationError> {
        let slug = app.name_slug.clone();
        let record = PersistedIntegrationConfig::new(app, ServiceType::default());
        // Same check the store applies on load, so nothing saved here is dropped later.
        record.validate(&slug).map_err(|reason| {
            IntegrationError::Config(format!("invalid integration '{slug}': {reason}"))
        })?;
        self.inner.metadata.insert(record.app.clone()).await;

        let record = self
            .mutate_config(|configured| {
                if configured.contains_key(&slug) {
                    return Err(IntegrationError::Config(format!(
                        "integration '{slug}' already exists"
                    )));
                }
                configured.insert(slug.clone(), record.clone());
                Ok(record)
            })
            .await?;

        tracing::info!(slug = %slug, name = %record.app.name, "added remote integration");
        Ok(record)
    }

    /// Disconnect (if live) and forget an integration. Unknown slugs are a
    /// logged no-op.
    ///
    /// # Errors
    ///
    /// [`IntegrationError::Storage`] if the save fails.
    pub async fn remove_integration(&self, slug: &str) -> Result<(), IntegrationError> {
        let known = self.configured().contains_key(slug);
        if !known {
            tracing::warn!(slug = %slug, "cannot remove unknown remote integration");
            return Ok(());
        }

        let live = self.is_active(slug);
        if live {
            self.disconnect(slug).await;
        }

        self.mutate_config(|configured| {
            configured.remove(slug);
            Ok(())
        })
        .await?;
        tracing::info!(slug = %slug, "removed remote integration");
        Ok(())
    }

    /// Persist the enabled flag, then connect or disconnect to match.
    ///
    /// Connection failures after a successful save are reported through
    /// [`EnableOutcome::ConnectFailed`]; the flag change itself stands.
    ///
    /// # Errors
    ///
    /// [`IntegrationError::NotConfigured`] for unknown slugs,
    /// [`IntegrationError::Storage`] if the save fails.
    pub async fn set_enabled(
        &self,
        slug: &str,
        enabled: bool,
        user_id: Option<&str>,
    ) -> Result<EnableOutcome, IntegrationError> {
        let changed = self
            .mutate_config(|configured| {
                let record = configured
                    .get_mut(slug)
                    .ok_or_else(|| IntegrationError::NotConfigured(slug.to_owned()))?;
                let changed = record.enabled != enabled;
                record.enabled = enabled;
                Ok(changed)
            })
            .await?;

        if !enabled {
            if !changed {
                tracing::debug!(slug = %slug, "remote integration already disabled");
                return Ok(EnableOutcome::Unchanged);
            }
            tracing::info!(slug = %slug, "disabled remote integration");
            let live = self.is_active(slug);
            if live {
                self.disconnect(slug).await;
            }
            return Ok(EnableOutcome::Disabled);
        }

        if changed {
            tracing::info!(slug = %slug, "enabled remote integration");
        }

        let Some(user_id) = user_id.map(str::trim).filter(|u| !u.is_empty()) else {
            tracing::warn!(slug = %slug, "enabled without a user id; not connecting");
            return Ok(EnableOutcome::IdentityRequired);
        };

        let live = self.is_active(slug);
        if live {
            tracing::debug!(slug = %slug, "remote integration already connected or connecting");
            return Ok(if changed {
                EnableOutcome::Enabled
            } else {
                EnableOutcome::Unchanged
            });
        }

        match self.connect(slug, user_id).await {
            Ok(()) => Ok(EnableOutcome::Connected),
            Err(e) => {
                tracing::warn!(slug = %slug, "connect after enable failed: {e}");
                Ok(EnableOutcome::ConnectFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn configured_integrations(&self) -> Vec<PersistedIntegrationConfig> {
        self.configured().values().cloned().collect()
    }

    pub fn configured_integration(&self, slug: &str) -> Option<PersistedIntegrationConfig> {
        self.configured().get(slug).cloned()
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Search the catalog and cache what comes back.
    ///
    /// Never fails: an unreachable catalog yields an empty page with
    /// `has_more: false`.
    pub async fn discover(
        &self,
        term: Option<&str>,
        page: u32,
        category: Option<&str>,
    ) -> DiscoveryPage {
        let page = page.max(1);
        match self.inner.catalog.search(term, page, category).await {
            Ok(result) => {
                let page_info =
                    PageInfo::from_provider(&result.provider_page_info, page, result.items.len());
                self.inner.metadata.extend(result.items.clone()).await;
                tracing::debug!(
                    page,
                    items = result.items.len(),
                    has_more = page_info.has_more,
                    "catalog discovery"
                );
                DiscoveryPage {
                    items: result.items,
                    page_info,
                }
            }
            Err(e) => {
                tracing::warn!(page, "catalog discovery failed: {e}");
                DiscoveryPage::empty(page)
            }
        }
    }

    /// Fetch one app's metadata from the catalog and cache it.
    ///
    /// Failures are logged and reported as `None`.
    pub async fn fetch_app_metadata(&self, id_or_slug: &str) -> Option<AppMetadata> {
        match self.inner.catalog.fetch_detail(id_or_slug).await {
            Ok(Some(app)) => {
                self.inner.metadata.insert(app.clone()).await;
                Some(app)
            }
            Ok(None) => {
                tracing::debug!(app = %id_or_slug, "catalog has no such app");
                None
            }
            Err(e) => {
                tracing::warn!(app = %id_or_slug, "catalog detail fetch failed: {e}");
                None
            }
        }
    }

    /// Cached metadata by slug or id, without touching the catalog.
    pub async fn cached_metadata(&self, id_or_slug: &str) -> Option<AppMetadata> {
        self.inner.metadata.get(id_or_slug).await
    }

    // ── Connections ──────────────────────────────────────────────────

    fn endpoint_for(&self, service_type: ServiceType, user_id: &str, slug: &str) -> String {
        match service_type {
            ServiceType::Pipedream => self
                .inner
                .settings
                .endpoint_template
                .replace("{user_id}", &urlencoding::encode(user_id))
                .replace("{slug}", &urlencoding::encode(slug)),
        }
    }

    /// Resolve display metadata (cache, then catalog, then the stored
    /// record) and the endpoint for `user_id`.
    async fn runtime_details(
        &self,
        record: &PersistedIntegrationConfig,
        user_id: &str,
    ) -> RuntimeDetails {
        let slug = record.slug();
        let mut meta = self.inner.metadata.get(slug).await;
        if meta.is_none() && !record.app.id.is_empty() {
            meta = self.inner.metadata.get(&record.app.id).await;
        }
        if meta.is_none() {
            let key = if record.app.id.is_empty() {
                slug
            } else {
                record.app.id.as_str()
            };
            meta = self.fetch_app_metadata(key).await;
        }

        let stored = &record.app;
        let display_name = meta
            .as_ref()
            .map(|m| m.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| stored.name.clone());
        let description = meta.as_ref().and_then(|m| m.description.clone());
        let app_hid = meta
            .as_ref()
            .and_then(|m| m.app_hid.clone())
            .or_else(|| stored.app_hid.clone());
        let icon_url = meta
            .as_ref()
            .and_then(|m| m.img_src.clone())
            .or_else(|| stored.img_src.clone())
            .or_else(|| app_hid.as_deref().and_then(|hid| self.inner.catalog.logo_url(hid)));
        let categories = meta
            .map(|m| m.categories)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| stored.categories.clone());

        RuntimeDetails {
            app_id: stored.id.clone(),
            name_slug: slug.to_owned(),
            service_type: record.service_type,
            user_id: user_id.to_owned(),
            enabled: record.enabled,
            display_name,
            description,
            icon_url,
            categories,
            endpoint: self.endpoint_for(record.service_type, user_id, slug),
        }
    }

    /// Connect an enabled integration for `user_id`.
    ///
    /// Disabled integrations return `Ok` without connecting. If an attempt
    /// for this slug is already registered, this waits for that attempt's
    /// outcome instead of starting another.
    ///
    /// # Errors
    ///
    /// [`IntegrationError::NotConfigured`] for unknown slugs,
    /// [`IntegrationError::Config`] for an empty user id, and
    /// [`IntegrationError::Connect`] when the handshake or tool load fails
    /// or the attempt is cancelled by a disconnect.
    pub async fn connect(&self, slug: &str, user_id: &str) -> Result<(), IntegrationError> {
        let record = self
            .configured_integration(slug)
            .ok_or_else(|| IntegrationError::NotConfigured(slug.to_owned()))?;
        if user_id.trim().is_empty() {
            return Err(IntegrationError::Config(format!(
                "a user id is required to connect '{slug}'"
            )));
        }
        if !record.enabled {
            tracing::info!(slug = %slug, "remote integration is disabled; not connecting");
            return Ok(());
        }

        let existing = self.active().get(slug).map(|e| e.signal.clone());
        if let Some(signal) = existing {
            tracing::debug!(slug = %slug, "joining in-flight connect");
            return signal.wait().await.map_err(IntegrationError::Connect);
        }

        let details = self.runtime_details(&record, user_id).await;
        let registration = self.register_attempt(slug, &details)?;

        match registration {
            Registration::Join(signal) => {
                tracing::debug!(slug = %slug, "joining in-flight connect");
                signal.wait().await.map_err(IntegrationError::Connect)
            }
            Registration::Start {
                attempt_id,
                transport,
                tx,
                signal,
            } => {
                tracing::info!(
                    slug = %slug,
                    name = %details.display_name,
                    endpoint = %details.endpoint,
                    attempt_id,
                    "connecting remote integration"
                );
                let manager = self.clone();
                let slug = slug.to_owned();
                // Detached so a caller dropping its future does not abort the
                // attempt for joined waiters.
                tokio::spawn(async move {
                    manager.run_attempt(slug, attempt_id, transport, tx).await;
                });
                signal.wait().await.map_err(IntegrationError::Connect)
            }
        }
    }

    /// Join the registered attempt, or register a new one. Atomic with
    /// respect to other callers.
    fn register_attempt(
        &self,
        slug: &str,
        details: &RuntimeDetails,
    ) -> Result<Registration, IntegrationError> {
        let mut active = self.active();
        if let Some(existing) = active.get(slug) {
            return Ok(Registration::Join(existing.signal.clone()));
        }

        let transport = self.inner.transports.create(&details.endpoint, details)?;
        let attempt_id = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed);
        let (tx, signal) = connect_signal();
        active.insert(
            slug.to_owned(),
            ActiveConnection {
                attempt_id,
                details: details.clone(),
                transport: Arc::clone(&transport),
                tools: Vec::new(),
                signal: signal.clone(),
            },
        );
        Ok(Registration::Start {
            attempt_id,
            transport,
            tx,
            signal,
        })
    }

    async fn run_attempt(
        self,
        slug: String,
        attempt_id: u64,
        transport: Arc<dyn RemoteTransport>,
        tx: ConnectSignalSender,
    ) {
        let outcome = match handshake(transport.as_ref()).await {
            Ok(tools) => self.finalize(&slug, attempt_id, tools),
            Err(e) => Err(format!("remote integration '{slug}': {e}")),
        };

        match outcome {
            Ok(tool_count) => {
                tracing::info!(slug = %slug, tools = tool_count, "remote integration connected");
                tx.settle(Ok(()));
            }
            Err(message) => {
                self.remove_if_current(&slug, attempt_id);
                if let Err(e) = transport.close().await {
                    tracing::debug!(slug = %slug, "closing failed transport: {e}");
                }
                tracing::warn!(slug = %slug, attempt_id, "{message}");
                tx.settle(Err(message));
            }
        }
    }

    /// Install the loaded tools if this attempt still owns the entry and
    /// the integration is still enabled.
    fn finalize(
        &self,
        slug: &str,
        attempt_id: u64,
        tools: Vec<ToolDescriptor>,
    ) -> Result<usize, String> {
        let enabled = self.is_enabled(slug);
        let mut active = self.active();
        match active.get_mut(slug) {
            Some(entry) if entry.attempt_id == attempt_id && enabled => {
                let count = tools.len();
                entry.tools = tools;
                Ok(count)
            }
            _ => Err(format!("connection attempt for '{slug}' was cancelled")),
        }
    }

    /// Drop the live connection for `slug`, if any.
    ///
    /// The entry is removed before anything is awaited. An in-flight attempt
    /// gets a bounded wait to settle; the transport is closed either way.
    pub async fn disconnect(&self, slug: &str) {
        let Some(entry) = self.take_active(slug) else {
            tracing::debug!(slug = %slug, "remote integration not connected");
            return;
        };
        tracing::info!(slug = %slug, name = %entry.details.display_name, "disconnecting remote integration");

        let timeout = Duration::from_millis(self.inner.settings.disconnect_timeout_ms);
        match tokio::time::timeout(timeout, entry.signal.wait()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(slug = %slug, "pending connect settled with: {e}"),
            Err(_) => tracing::warn!(
                slug = %slug,
                timeout_ms = self.inner.settings.disconnect_timeout_ms,
                "pending connect did not settle; closing anyway"
            ),
        }

        if let Err(e) = entry.transport.close().await {
            tracing::debug!(slug = %slug, "error closing remote transport: {e}");
        }
    }

    /// Disconnect then connect again. Meant for user-initiated retries, so
    /// every failure is returned.
    ///
    /// # Errors
    ///
    /// [`IntegrationError::NotConfigured`] or [`IntegrationError::Disabled`]
    /// before any transport work; otherwise whatever [`connect`](Self::connect)
    /// returns.
    pub async fn reconnect(&self, slug: &str, user_id: &str) -> Result<(), IntegrationError> {
        let record = self
            .configured_integration(slug)
            .ok_or_else(|| IntegrationError::NotConfigured(slug.to_owned()))?;
        if !record.enabled {
            return Err(IntegrationError::Disabled(slug.to_owned()));
        }

        let live = self.is_active(slug);
        if live {
            self.disconnect(slug).await;
            tokio::time::sleep(Duration::from_millis(self.inner.settings.reconnect_settle_ms)).await;
        }
        self.connect(slug, user_id).await
    }

    /// Connect every enabled integration concurrently. Failures are logged
    /// and returned per slug; they do not stop the others.
    pub async fn connect_all_enabled(
        &self,
        user_id: &str,
    ) -> Vec<(String, Result<(), IntegrationError>)> {
        let slugs: Vec<String> = self
            .configured()
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.slug().to_owned())
            .collect();
        tracing::info!(count = slugs.len(), "connecting enabled remote integrations");

        let attempts = slugs.into_iter().map(|slug| async move {
            let result = self.connect(&slug, user_id).await;
            if let Err(ref e) = result {
                tracing::warn!(slug = %slug, "auto-connect failed: {e}");
            }
            (slug, result)
        });
        join_all(attempts).await
    }

    /// Disconnect everything and wait for all of it.
    pub async fn disconnect_all(&self) {
        let slugs: Vec<String> = self.active().keys().cloned().collect();
        if slugs.is_empty() {
            return;
        }
        tracing::info!(count = slugs.len(), "disconnecting all remote integrations");
        join_all(slugs.iter().map(|slug| self.disconnect(slug))).await;
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn connection_status(&self, slug: &str) -> IntegrationStatus {
        match self.active().get(slug) {
            None => IntegrationStatus::Disconnected,
            Some(entry) if entry.tools.is_empty() => IntegrationStatus::Connecting,
            Some(_) => IntegrationStatus::Connected,
        }
    }

    /// Tools loaded for one integration, with their unqualified names.
    pub fn active_tools(&self, slug: &str) -> Vec<ToolDescriptor> {
        self.active()
            .get(slug)
            .map(|e| e.tools.clone())
            .unwrap_or_default()
    }

    /// Every tool of every ready connection, renamed to `remote__<slug>__<tool>`.
    pub fn all_active_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self
            .active()
            .iter()
            .filter(|(_, e)| !e.tools.is_empty())
            .flat_map(|(slug, e)| {
                e.tools.iter().map(move |t| ToolDescriptor {
                    name: ToolName::qualified(Namespace::Remote, slug, &t.name),
                    ..t.clone()
                })
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Runtime details of connections that have loaded at least one tool.
    pub fn connected_integrations_info(&self) -> Vec<RuntimeDetails> {
        let mut info: Vec<RuntimeDetails> = self
            .active()
            .values()
            .filter(|e| !e.tools.is_empty())
            .map(|e| e.details.clone())
            .collect();
        info.sort_by(|a, b| a.name_slug.cmp(&b.name_slug));
        info
    }

    /// Call `tool` on the live connection for `slug`.
    ///
    /// # Errors
    ///
    /// [`IntegrationError::NotConfigured`] or [`IntegrationError::NotConnected`]
    /// when there is no ready connection, otherwise the transport's error.
    pub async fn call_tool(
        &self,
        slug: &str,
        tool: &str,
        args: Value,
    ) -> Result<Value, IntegrationError> {
        let transport = self
            .active()
            .get(slug)
            .filter(|e| !e.tools.is_empty())
            .map(|e| Arc::clone(&e.transport));

        let Some(transport) = transport else {
            let known = self.configured().contains_key(slug);
            return Err(if known {
                IntegrationError::NotConnected(slug.to_owned())
            } else {
                IntegrationError::NotConfigured(slug.to_owned())
            });
        };

        tracing::debug!(slug = %slug, tool = %tool, "calling remote tool");
        transport.call_tool(tool, args).await
    }
}

async fn handshake(transport: &dyn RemoteTransport) -> Result<Vec<ToolDescriptor>, IntegrationError> {
    transport.connect().await?;
    transport.list_tools().await
}
