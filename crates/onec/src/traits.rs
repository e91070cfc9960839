use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;

use crate::errors::Result;
use crate::models::{
    ConnectionTestResult, NomenclaturePage, NomenclatureQuery, OrderResult, StockPage, StockQuery,
};

/// Operations the sync engine needs from a 1C endpoint.
///
/// [`crate::OneCClient`] is the HTTP implementation; tests substitute
/// scripted fakes.
#[async_trait]
pub trait OneCApi: Send + Sync {
    /// Fetches one page of products.
    async fn fetch_nomenclature(&self, query: NomenclatureQuery) -> Result<NomenclaturePage>;

    /// Fetches stock balances.
    async fn fetch_stock(&self, query: StockQuery) -> Result<StockPage>;

    /// Returns true when the endpoint reports itself healthy. Never fails.
    async fn health_check(&self) -> bool;

    /// Submits an order.
    async fn create_order(&self, order: Value) -> Result<OrderResult>;

    /// Looks up the processing status of an order.
    async fn order_status(&self, order_id: &str) -> Result<Value>;

    /// Releases pooled connections. The next call reopens them.
    async fn close(&self) {}

    /// Probes the endpoint: health check followed by a one-item fetch.
    async fn test_connection(&self) -> ConnectionTestResult {
        let started = Instant::now();
        let health = self.health_check().await;
        let fetched = self
            .fetch_nomenclature(NomenclatureQuery {
                updated_since: None,
                limit: 1,
                offset: 0,
            })
            .await;
        let response_time = started.elapsed().as_secs_f64();

        match fetched {
            Ok(page) => ConnectionTestResult {
                success: true,
                health: Some(health),
                can_fetch_data: Some(!page.items.is_empty()),
                response_time: Some(response_time),
                timestamp: Utc::now(),
                error: None,
            },
            Err(e) => ConnectionTestResult {
                success: false,
                health: Some(health),
                can_fetch_data: None,
                response_time: Some(response_time),
                timestamp: Utc::now(),
                error: Some(e.to_string()),
            },
        }
    }
}
