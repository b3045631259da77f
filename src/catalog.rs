//! # Catalog Lookup Module
//!
//! Read-only access to the storefront's products and categories. The flow
//! engine only sees the `CatalogLookup` trait; `InMemoryCatalog` is the bundled
//! implementation and `GuardedCatalog` wraps any lookup with a timeout and a
//! circuit breaker.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::RecoveryConfig;
use crate::errors::{BotError, Result};

/// A color variant of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductColor {
    pub name: String,
    /// Hex swatch, e.g. `#1e3a8a`
    pub swatch: String,
}

/// Read-only projection of a catalog product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    /// Price in whole tenge
    pub price: u64,
    #[serde(default)]
    pub description: String,
    pub category_id: String,
    /// In-stock sizes, in display order
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<ProductColor>,
}

impl CatalogProduct {
    pub fn has_size(&self, size: &str) -> bool {
        self.sizes.iter().any(|s| s == size)
    }

    pub fn has_color(&self, color: &str) -> bool {
        self.colors.iter().any(|c| c.name == color)
    }

    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            price: self.price,
        }
    }
}

/// Short product entry used in category listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub price: u64,
}

/// Product category; display titles come from localization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
}

impl Category {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Failures reported by a catalog backend
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(String),
    #[error("catalog file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only product store consulted by the flow router
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// All categories in display order
    async fn categories(&self) -> std::result::Result<Vec<Category>, CatalogError>;

    /// A single product, `None` when the id is unknown
    async fn get_product(&self, id: &str) -> std::result::Result<Option<CatalogProduct>, CatalogError>;

    /// Products of a category, `None` when the category is unknown
    async fn list_by_category(
        &self,
        category_id: &str,
    ) -> std::result::Result<Option<Vec<ProductSummary>>, CatalogError>;
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    pub categories: Vec<Category>,
    pub products: Vec<CatalogProduct>,
}

impl InMemoryCatalog {
    pub fn new(categories: Vec<Category>, products: Vec<CatalogProduct>) -> Self {
        Self { categories, products }
    }

    /// The storefront's demo assortment
    pub fn seeded() -> Self {
        let categories = ["classic", "slim", "casual", "festive", "sales"]
            .into_iter()
            .map(Category::new)
            .collect();

        let color = |name: &str, swatch: &str| ProductColor {
            name: name.to_string(),
            swatch: swatch.to_string(),
        };
        let sizes = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let products = vec![
            CatalogProduct {
                id: "1".to_string(),
                name: "Классический костюм Ermenegildo Zegna".to_string(),
                price: 185_000,
                description: "Роскошный классический костюм от итальянского бренда Ermenegildo Zegna"
                    .to_string(),
                category_id: "classic".to_string(),
                sizes: sizes(&["46S", "48R", "50L", "52XL"]),
                colors: vec![color("Темно-синий", "#1e3a8a"), color("Серый", "#6b7280")],
            },
            CatalogProduct {
                id: "2".to_string(),
                name: "Slim Fit костюм Hugo Boss".to_string(),
                price: 125_000,
                description: "Современный Slim Fit костюм от Hugo Boss".to_string(),
                category_id: "slim".to_string(),
                sizes: sizes(&["44S", "46S", "48R", "50L"]),
                colors: vec![color("Черный", "#000000"), color("Темно-синий", "#1e3a8a")],
            },
        ];

        Self::new(categories, products)
    }

    /// Load a catalog from a JSON document shaped like this struct
    pub fn from_json_file(path: impl AsRef<Path>) -> std::result::Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn categories(&self) -> std::result::Result<Vec<Category>, CatalogError> {
        Ok(self.categories.clone())
    }

    async fn get_product(&self, id: &str) -> std::result::Result<Option<CatalogProduct>, CatalogError> {
        Ok(self.products.iter().find(|p| p.id == id).cloned())
    }

    async fn list_by_category(
        &self,
        category_id: &str,
    ) -> std::result::Result<Option<Vec<ProductSummary>>, CatalogError> {
        if !self.categories.iter().any(|c| c.id == category_id) {
            return Ok(None);
        }
        Ok(Some(
            self.products
                .iter()
                .filter(|p| p.category_id == category_id)
                .map(CatalogProduct::summary)
                .collect(),
        ))
    }
}

/// Catalog access with a deadline and a circuit breaker
///
/// Every failure, timeout or short-circuit surfaces as
/// `BotError::CatalogUnavailable`.
pub struct GuardedCatalog {
    inner: Arc<dyn CatalogLookup>,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl GuardedCatalog {
    pub fn new(inner: Arc<dyn CatalogLookup>, timeout: Duration, recovery: RecoveryConfig) -> Self {
        Self {
            inner,
            timeout,
            breaker: CircuitBreaker::new(recovery),
        }
    }

    async fn guard<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, CatalogError>>,
    {
        if self.breaker.is_open() {
            warn!(operation, "Catalog circuit breaker is open, failing fast");
            return Err(BotError::CatalogUnavailable(format!(
                "{operation}: circuit breaker open"
            )));
        }

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                warn!(operation, error = %e, "Catalog lookup failed");
                Err(BotError::CatalogUnavailable(format!("{operation}: {e}")))
            }
            Err(_) => {
                self.breaker.record_failure();
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Catalog lookup timed out");
                Err(BotError::CatalogUnavailable(format!("{operation}: timed out")))
            }
        }
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.guard("categories", self.inner.categories()).await
    }

    pub async fn get_product(&self, id: &str) -> Result<Option<CatalogProduct>> {
        debug!(product_id = id, "Fetching product");
        self.guard("get_product", self.inner.get_product(id)).await
    }

    pub async fn list_by_category(&self, category_id: &str) -> Result<Option<Vec<ProductSummary>>> {
        debug!(category_id, "Listing category");
        self.guard("list_by_category", self.inner.list_by_category(category_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct FailingCatalog;

    #[async_trait]
    impl CatalogLookup for FailingCatalog {
        async fn categories(&self) -> std::result::Result<Vec<Category>, CatalogError> {
            Err(CatalogError::Backend("down".into()))
        }
        async fn get_product(&self, _id: &str) -> std::result::Result<Option<CatalogProduct>, CatalogError> {
            Err(CatalogError::Backend("down".into()))
        }
        async fn list_by_category(
            &self,
            _category_id: &str,
        ) -> std::result::Result<Option<Vec<ProductSummary>>, CatalogError> {
            Err(CatalogError::Backend("down".into()))
        }
    }

    struct SlowCatalog;

    #[async_trait]
    impl CatalogLookup for SlowCatalog {
        async fn categories(&self) -> std::result::Result<Vec<Category>, CatalogError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
        async fn get_product(&self, _id: &str) -> std::result::Result<Option<CatalogProduct>, CatalogError> {
            Ok(None)
        }
        async fn list_by_category(
            &self,
            _category_id: &str,
        ) -> std::result::Result<Option<Vec<ProductSummary>>, CatalogError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_seeded_catalog_lookups() {
        let catalog = InMemoryCatalog::seeded();

        let product = catalog.get_product("1").await.unwrap().unwrap();
        assert_eq!(product.price, 185_000);
        assert_eq!(product.sizes, vec!["46S", "48R", "50L", "52XL"]);
        assert!(product.has_color("Темно-синий"));
        assert!(!product.has_size("60XXL"));

        let classic = catalog.list_by_category("classic").await.unwrap().unwrap();
        assert_eq!(classic.len(), 1);
        assert_eq!(classic[0].id, "1");

        assert!(catalog.list_by_category("festive").await.unwrap().unwrap().is_empty());
        assert!(catalog.list_by_category("nope").await.unwrap().is_none());
        assert!(catalog.get_product("99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_catalog_from_json_file() {
        let json = serde_json::to_string(&InMemoryCatalog::seeded()).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let catalog = InMemoryCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.categories.len(), 5);
        assert_eq!(catalog.products.len(), 2);
    }

    #[test]
    fn test_catalog_from_invalid_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            InMemoryCatalog::from_json_file(file.path()),
            Err(CatalogError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_guarded_catalog_maps_failures() {
        let recovery = RecoveryConfig {
            circuit_breaker_threshold: 2,
            ..Default::default()
        };
        let guarded = GuardedCatalog::new(Arc::new(FailingCatalog), Duration::from_secs(1), recovery);

        for _ in 0..2 {
            assert!(matches!(
                guarded.get_product("1").await,
                Err(BotError::CatalogUnavailable(_))
            ));
        }
        let err = guarded.categories().await.unwrap_err();
        assert!(err.to_string().contains("circuit breaker open"));
    }

    #[tokio::test]
    async fn test_guarded_catalog_times_out() {
        let guarded = GuardedCatalog::new(
            Arc::new(SlowCatalog),
            Duration::from_millis(20),
            RecoveryConfig::default(),
        );
        let err = guarded.categories().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
