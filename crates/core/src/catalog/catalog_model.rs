//! Local catalog records and the changes proposed for them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sync state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
}

impl RecordSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSyncStatus::Pending => "pending",
            RecordSyncStatus::Synced => "synced",
            RecordSyncStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for RecordSyncStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            other => Err(crate::Error::Validation(
                crate::errors::ValidationError::InvalidInput(format!(
                    "Unknown record sync status '{}'",
                    other
                )),
            )),
        }
    }
}

/// Domain fields of a product that sync writes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductFields {
    pub external_code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub category: Option<String>,
    /// Remote attributes without a dedicated column (characteristics,
    /// article, unit, manufacturer, remote `updated_at`).
    pub external_data: Option<Value>,
}

/// Persisted catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub integration_id: String,
    pub external_id: String,
    #[serde(flatten)]
    pub fields: ProductFields,
    pub sync_version: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_status: RecordSyncStatus,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Domain fields of a stock balance that sync writes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StockFields {
    pub warehouse_name: Option<String>,
    pub quantity: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
}

/// Identity of a stock balance within one integration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_external_id: String,
    pub warehouse_id: String,
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.product_external_id, self.warehouse_id)
    }
}

/// Persisted stock balance of one product in one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub id: String,
    pub integration_id: String,
    #[serde(flatten)]
    pub key: StockKey,
    #[serde(flatten)]
    pub fields: StockFields,
    pub sync_version: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the reconciler knows about an existing record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordState<F> {
    pub fields: F,
    pub sync_version: i64,
}

impl From<&Product> for RecordState<ProductFields> {
    fn from(product: &Product) -> Self {
        Self {
            fields: product.fields.clone(),
            sync_version: product.sync_version,
        }
    }
}

impl From<&StockLevel> for RecordState<StockFields> {
    fn from(stock: &StockLevel) -> Self {
        Self {
            fields: stock.fields.clone(),
            sync_version: stock.sync_version,
        }
    }
}

/// Whether a change creates a record or updates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
}

/// A mutation proposed by the reconciler, applied by the store.
///
/// Creating starts `sync_version` at 1; updating increments it by one.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange<K, F> {
    pub key: K,
    pub action: ChangeAction,
    pub fields: F,
}

pub type ProductChange = RecordChange<String, ProductFields>;
pub type StockChange = RecordChange<StockKey, StockFields>;

/// A change the store committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange<K> {
    pub key: K,
    pub record_id: String,
    pub action: ChangeAction,
    pub sync_version: i64,
}

/// A change the store rejected while the rest of its batch committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedChange<K> {
    pub key: K,
    pub message: String,
}

/// Result of committing one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<K> {
    pub applied: Vec<AppliedChange<K>>,
    pub failed: Vec<FailedChange<K>>,
}

impl<K> Default for BatchOutcome<K> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            failed: Vec::new(),
        }
    }
}
