//! Product catalogue client.
//!
//! Products come from a DummyJSON-compatible REST API; the storefront keeps
//! no product data of its own. Responses are cached using `moka` (5-minute TTL).

mod types;

pub use types::{Product, ProductPage};

use std::sync::Arc;

use moka::future::Cache;
use rand::Rng;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument};

use mercato_core::ProductId;

use crate::config::CatalogConfig;

/// Products per page when the client does not ask.
pub const DEFAULT_PAGE_SIZE: u32 = 6;

/// Largest page a client may ask for.
pub const MAX_PAGE_SIZE: u32 = 30;

/// Upper bound (exclusive) of the random offset used when no `skip` is given.
pub const RANDOM_SKIP_BOUND: u32 = 80;

/// Errors from the catalogue.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("catalogue returned HTTP {0}")]
    Status(StatusCode),
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(ProductId),
    Page { limit: u32, skip: u32 },
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Page(ProductPage),
}

/// Client for the product catalogue.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogClient {
    /// Create a new catalogue client.
    #[must_use]
    pub fn new(config: &CatalogConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.cache_ttl)
            .build();

        Self {
            inner: Arc::new(CatalogClientInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.clone(),
                cache,
            }),
        }
    }

    /// Fetch a page of products.
    ///
    /// `limit` defaults to [`DEFAULT_PAGE_SIZE`] and is capped at
    /// [`MAX_PAGE_SIZE`]. Without `skip` a random offset is used so each
    /// refresh shows different products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the request fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        limit: Option<u32>,
        skip: Option<u32>,
    ) -> Result<ProductPage, CatalogError> {
        let limit = page_size(limit);
        let skip = skip.unwrap_or_else(|| rand::rng().random_range(0..RANDOM_SKIP_BOUND));
        let key = CacheKey::Page { limit, skip };

        if let Some(CacheValue::Page(page)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product page");
            return Ok(page);
        }

        let response = self
            .inner
            .client
            .get(format!(
                "{}/products?limit={limit}&skip={skip}",
                self.inner.base_url
            ))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }

        let page: ProductPage = response.json().await?;
        self.inner
            .cache
            .insert(key, CacheValue::Page(page.clone()))
            .await;

        Ok(page)
    }

    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the catalogue has no such product.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<Product, CatalogError> {
        let key = CacheKey::Product(id);

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let response = self
            .inner
            .client
            .get(format!("{}/products/{id}", self.inner.base_url))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(CatalogError::NotFound(id)),
            status if !status.is_success() => return Err(CatalogError::Status(status)),
            _ => {}
        }

        let product: Product = response.json().await?;
        self.inner
            .cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }
}

fn page_size(limit: Option<u32>) -> u32 {
    limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE)
}
