//! Catalog service trait and its HTTP implementation.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::http::build_client;
use crate::types::{AppMetadata, ProviderPageInfo, SearchPage};

/// External catalog of integration apps.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Search the catalog. `page` is 1-indexed.
    async fn search(
        &self,
        term: Option<&str>,
        page: u32,
        category: Option<&str>,
    ) -> Result<SearchPage>;

    /// Fetch one app by id or slug. `Ok(None)` when the catalog has no such app.
    async fn fetch_detail(&self, id_or_slug: &str) -> Result<Option<AppMetadata>>;

    /// Fallback icon URL for an app hash id, if the catalog has a scheme for one.
    fn logo_url(&self, _app_hid: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<AppMetadata>,
    #[serde(default)]
    page_info: ProviderPageInfo,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: Option<AppMetadata>,
}

/// [`CatalogService`] backed by the catalog's REST API.
pub struct HttpCatalog {
    client: reqwest::Client,
    config: CatalogConfig,
}

impl HttpCatalog {
    /// Build a catalog client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Config`] for invalid configuration and
    /// [`CatalogError::Http`] if the HTTP client cannot be built.
    pub fn new(config: CatalogConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    fn apps_url(&self) -> String {
        format!("{}/apps", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn fill_icon(&self, app: &mut AppMetadata) {
        if app.img_src.is_none() {
            app.img_src = app.app_hid.as_deref().map(|hid| self.config.logo_url(hid));
        }
    }
}

#[async_trait]
impl CatalogService for HttpCatalog {
    async fn search(
        &self,
        term: Option<&str>,
        page: u32,
        category: Option<&str>,
    ) -> Result<SearchPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("has_components", "1".to_owned()),
            ("page", page.max(1).to_string()),
        ];
        if let Some(q) = term.map(str::trim).filter(|q| !q.is_empty()) {
            query.push(("q", q.to_owned()));
        }
        if let Some(c) = category.map(str::trim).filter(|c| !c.is_empty()) {
            query.push(("category", c.to_owned()));
        }
        tracing::trace!(?term, page, ?category, "catalog search");

        let response = self
            .authorize(self.client.get(self.apps_url()).query(&query))
            .send()
            .await
            .map_err(|e| CatalogError::Http(format!("catalog search failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message: "GET /apps".into(),
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("invalid search response: {e}")))?;

        let mut items = body.data;
        for app in &mut items {
            self.fill_icon(app);
        }
        Ok(SearchPage {
            items,
            provider_page_info: body.page_info,
        })
    }

    async fn fetch_detail(&self, id_or_slug: &str) -> Result<Option<AppMetadata>> {
        let url = format!("{}/{}", self.apps_url(), urlencoding::encode(id_or_slug));
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| CatalogError::Http(format!("catalog detail fetch failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message: format!("GET /apps/{id_or_slug}"),
            });
        }

        let body: DetailResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("invalid detail response: {e}")))?;
        Ok(body.data.map(|mut app| {
            self.fill_icon(&mut app);
            app
        }))
    }

    fn logo_url(&self, app_hid: &str) -> Option<String> {
        Some(self.config.logo_url(app_hid))
    }
}
