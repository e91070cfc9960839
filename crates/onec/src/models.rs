//! Wire models for the 1C HTTP API.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A product as returned by `GET /nomenclature`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub characteristics: Option<Value>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default, deserialize_with = "deserialize_remote_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Version the remote side attaches to the record, when it tracks one.
    #[serde(default, alias = "external_version")]
    pub version: Option<i64>,
}

/// One page of `GET /nomenclature`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NomenclaturePage {
    #[serde(default)]
    pub items: Vec<RemoteProduct>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub has_more: bool,
}

/// Query for one nomenclature page.
#[derive(Debug, Clone, Default)]
pub struct NomenclatureQuery {
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

/// A stock balance as returned by `GET /stock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStock {
    pub product_id: String,
    pub warehouse_id: String,
    #[serde(default)]
    pub warehouse_name: Option<String>,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub reserved: Decimal,
    #[serde(default)]
    pub available: Decimal,
    #[serde(default, deserialize_with = "deserialize_remote_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "external_version")]
    pub version: Option<i64>,
}

/// Response of `GET /stock`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockPage {
    #[serde(default)]
    pub items: Vec<RemoteStock>,
    #[serde(default)]
    pub total: Option<i64>,
}

/// Filters for `GET /stock`; empty lists mean "no filter".
#[derive(Debug, Clone, Default)]
pub struct StockQuery {
    pub product_ids: Vec<String>,
    pub warehouse_ids: Vec<String>,
}

/// Response of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
}

/// Result of probing an endpoint with a health check and a one-item fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_fetch_data: Option<bool>,
    /// Seconds the probe took.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Accepts RFC 3339 or a naive ISO timestamp (treated as UTC).
fn deserialize_remote_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
