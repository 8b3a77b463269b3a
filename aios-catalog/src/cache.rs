//! In-memory cache for app discovery metadata.
//!
//! Every app is stored twice, once under its slug and once under its
//! provider id, so lookups work with either handle. Entries are never
//! expired; stale display metadata for the lifetime of the process is
//! acceptable.

use moka::future::Cache;

use crate::types::AppMetadata;

/// Upper bound on cached keys (two per app).
const MAX_CACHE_ENTRIES: u64 = 20_000;

/// Metadata cache keyed by both `name_slug` and `id`.
#[derive(Clone)]
pub struct MetadataCache {
    inner: Cache<String, AppMetadata>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().max_capacity(MAX_CACHE_ENTRIES).build(),
        }
    }

    /// Insert or replace an app under both of its keys.
    pub async fn insert(&self, app: AppMetadata) {
        let slug = app.name_slug.clone();
        let id = app.id.clone();
        self.inner.insert(slug, app.clone()).await;
        self.inner.insert(id, app).await;
    }

    /// Merge a batch of discovery results.
    pub async fn extend(&self, apps: impl IntoIterator<Item = AppMetadata>) {
        for app in apps {
            self.insert(app).await;
        }
    }

    /// Look an app up by slug or provider id.
    pub async fn get(&self, id_or_slug: &str) -> Option<AppMetadata> {
        self.inner.get(id_or_slug).await
    }

    pub fn contains(&self, id_or_slug: &str) -> bool {
        self.inner.contains_key(id_or_slug)
    }
}
