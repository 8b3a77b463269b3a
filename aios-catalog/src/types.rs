//! Catalog data types: app metadata and pagination.

use serde::{Deserialize, Serialize};

/// Discovery metadata for one integration app, as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Provider-assigned identifier.
    pub id: String,
    /// Provider hash id, used to build logo URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_hid: Option<String>,
    /// Stable slug; the key integrations are configured under.
    pub name_slug: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Icon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_src: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_weight: Option<f64>,
}

/// Pagination block exactly as the catalog reports it.
///
/// Every field is optional because the provider omits them freely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPageInfo {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// Raw result of one catalog search call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub items: Vec<AppMetadata>,
    pub provider_page_info: ProviderPageInfo,
}

/// Uniform pagination returned to callers of discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page: Option<u32>,
}

impl PageInfo {
    /// Normalize the provider's pagination block.
    ///
    /// Missing fields fall back to the requested page, the number of items
    /// actually returned, and "no more pages".
    pub fn from_provider(info: &ProviderPageInfo, requested_page: u32, item_count: usize) -> Self {
        let current_page = info.current_page.unwrap_or(requested_page);
        let has_more = info.has_more.unwrap_or(false);
        Self {
            current_page,
            page_size: info.page_size.unwrap_or(item_count as u32),
            total_count: info.total_count.unwrap_or(item_count as u64),
            has_more,
            next_page: has_more.then(|| current_page.saturating_add(1)),
        }
    }

    /// The degraded page returned when the catalog cannot be reached.
    pub fn empty(requested_page: u32) -> Self {
        Self {
            current_page: requested_page,
            page_size: 0,
            total_count: 0,
            has_more: false,
            next_page: None,
        }
    }
}

/// Normalized discovery result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryPage {
    pub items: Vec<AppMetadata>,
    pub page_info: PageInfo,
}

impl DiscoveryPage {
    /// An empty page with `has_more: false`.
    pub fn empty(requested_page: u32) -> Self {
        Self {
            items: Vec::new(),
            page_info: PageInfo::empty(requested_page),
        }
    }
}
