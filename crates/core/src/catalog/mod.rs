//! Catalog module - local records, change detection and the store seam.

mod catalog_model;
mod catalog_reconciler;
mod catalog_traits;

pub use catalog_model::*;
pub use catalog_reconciler::{decide_product, decide_stock, Decision};
pub use catalog_traits::CatalogRepositoryTrait;
