//! # aios-catalog
//!
//! Client for the integration catalog that aios uses to discover remote
//! tool-providing apps.
//!
//! ## Design
//!
//! - [`CatalogService`] is the narrow interface the integration manager
//!   consumes; [`HttpCatalog`] implements it over the catalog REST API
//! - Provider pagination is normalized into [`PageInfo`]
//! - [`MetadataCache`] keeps discovery metadata addressable by slug or id
//! - Apps without an icon get one derived from their hash id
//!
//! Search terms are logged only at trace level.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use cache::MetadataCache;
pub use client::{CatalogService, HttpCatalog};
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use types::{AppMetadata, DiscoveryPage, PageInfo, ProviderPageInfo, SearchPage};
