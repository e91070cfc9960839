//! Catalog repository trait.

use async_trait::async_trait;

use super::catalog_model::{
    BatchOutcome, Product, ProductChange, StockChange, StockKey, StockLevel,
};
use crate::errors::Result;

/// Narrow store interface the sync engine reads and writes through.
///
/// Batches are applied in order inside one transaction. A change that fails
/// is reported in [`BatchOutcome::failed`] without rolling back its siblings;
/// an `Err` means the batch as a whole did not commit.
#[async_trait]
pub trait CatalogRepositoryTrait: Send + Sync {
    /// Products of an integration with the given external ids.
    fn find_products(&self, integration_id: &str, external_ids: &[String]) -> Result<Vec<Product>>;

    /// Stock balances of an integration with the given keys.
    fn find_stock(&self, integration_id: &str, keys: &[StockKey]) -> Result<Vec<StockLevel>>;

    /// Products of an integration, paged.
    fn list_products(&self, integration_id: &str, offset: i64, limit: i64) -> Result<Vec<Product>>;

    async fn apply_product_changes(
        &self,
        integration_id: &str,
        changes: Vec<ProductChange>,
    ) -> Result<BatchOutcome<String>>;

    async fn apply_stock_changes(
        &self,
        integration_id: &str,
        changes: Vec<StockChange>,
    ) -> Result<BatchOutcome<StockKey>>;
}
