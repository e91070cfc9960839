//! In-memory repositories and a scripted 1C endpoint shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::catalog::{
    AppliedChange, BatchOutcome, CatalogRepositoryTrait, ChangeAction, FailedChange, Product,
    ProductChange, RecordSyncStatus, StockChange, StockKey, StockLevel,
};
use crate::errors::{DatabaseError, Error, Result};
use crate::integrations::{
    ClientFactory, Integration, IntegrationOutcome, IntegrationRepositoryTrait,
    IntegrationUpdate, NewIntegration,
};
use crate::sync::{SyncLog, SyncLogFilter, SyncLogRepositoryTrait};
use tradeos_onec::{
    NomenclaturePage, NomenclatureQuery, OneCApi, OneCError, OrderResult, RemoteProduct,
    RemoteStock, StockPage, StockQuery,
};

// =========================================================================
// Builders
// =========================================================================

pub fn new_integration(name: &str) -> NewIntegration {
    serde_json::from_value(json!({
        "name": name,
        "base_url": "http://1c.local/hs/api",
    }))
    .unwrap()
}

pub fn remote_product(id: &str, name: &str, price: Decimal) -> RemoteProduct {
    RemoteProduct {
        id: id.to_string(),
        code: Some(format!("C-{}", id)),
        name: name.to_string(),
        full_name: None,
        article: None,
        unit: Some("pcs".to_string()),
        price: Some(price),
        quantity: Some(Decimal::ONE),
        characteristics: None,
        category: None,
        manufacturer: None,
        updated_at: None,
        version: None,
    }
}

pub fn products(count: usize) -> Vec<RemoteProduct> {
    (1..=count)
        .map(|i| remote_product(&format!("p{}", i), &format!("Product {}", i), Decimal::from(i)))
        .collect()
}

pub fn remote_stock(product_id: &str, warehouse_id: &str, quantity: Decimal) -> RemoteStock {
    RemoteStock {
        product_id: product_id.to_string(),
        warehouse_id: warehouse_id.to_string(),
        warehouse_name: Some(format!("Warehouse {}", warehouse_id)),
        quantity,
        reserved: Decimal::ZERO,
        available: quantity,
        updated_at: None,
        version: None,
    }
}

// =========================================================================
// MockIntegrationRepository
// =========================================================================

#[derive(Clone, Default)]
pub struct MockIntegrationRepository {
    integrations: Arc<Mutex<Vec<Integration>>>,
    outcomes: Arc<Mutex<Vec<(String, IntegrationOutcome)>>>,
    failing_outcomes: Arc<Mutex<HashSet<String>>>,
}

impl MockIntegrationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every outcome write for this integration fail.
    pub fn fail_outcomes_for(&self, integration_id: &str) {
        self.failing_outcomes
            .lock()
            .unwrap()
            .insert(integration_id.to_string());
    }

    pub fn outcomes(&self) -> Vec<(String, IntegrationOutcome)> {
        self.outcomes.lock().unwrap().clone()
    }

    fn not_found(id: &str) -> Error {
        Error::Database(DatabaseError::NotFound(format!("Integration {}", id)))
    }
}

#[async_trait]
impl IntegrationRepositoryTrait for MockIntegrationRepository {
    async fn create(&self, new_integration: NewIntegration) -> Result<Integration> {
        let integration = Integration::from_new(new_integration, Utc::now());
        self.integrations.lock().unwrap().push(integration.clone());
        Ok(integration)
    }

    async fn update(&self, integration_id: &str, update: IntegrationUpdate) -> Result<Integration> {
        let mut integrations = self.integrations.lock().unwrap();
        let integration = integrations
            .iter_mut()
            .find(|i| i.id == integration_id)
            .ok_or_else(|| Self::not_found(integration_id))?;
        update.apply_to(integration, Utc::now());
        Ok(integration.clone())
    }

    async fn record_outcome(
        &self,
        integration_id: &str,
        outcome: IntegrationOutcome,
    ) -> Result<Integration> {
        if self.failing_outcomes.lock().unwrap().contains(integration_id) {
            return Err(Error::Database(DatabaseError::QueryFailed(
                "database is locked".to_string(),
            )));
        }
        let mut integrations = self.integrations.lock().unwrap();
        let integration = integrations
            .iter_mut()
            .find(|i| i.id == integration_id)
            .ok_or_else(|| Self::not_found(integration_id))?;
        integration.apply(&outcome);
        self.outcomes
            .lock()
            .unwrap()
            .push((integration_id.to_string(), outcome));
        Ok(integration.clone())
    }

    fn get_by_id(&self, integration_id: &str) -> Result<Integration> {
        self.integrations
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == integration_id)
            .cloned()
            .ok_or_else(|| Self::not_found(integration_id))
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Integration>> {
        Ok(self
            .integrations
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.name == name)
            .cloned())
    }

    fn list(
        &self,
        is_enabled: Option<bool>,
        integration_type: Option<&str>,
    ) -> Result<Vec<Integration>> {
        Ok(self
            .integrations
            .lock()
            .unwrap()
            .iter()
            .filter(|i| is_enabled.map_or(true, |enabled| i.is_enabled == enabled))
            .filter(|i| integration_type.map_or(true, |t| i.integration_type == t))
            .cloned()
            .collect())
    }
}

// =========================================================================
// MockCatalogRepository
// =========================================================================

#[derive(Clone, Default)]
pub struct MockCatalogRepository {
    products: Arc<Mutex<Vec<Product>>>,
    stock: Arc<Mutex<Vec<StockLevel>>>,
    failing_keys: Arc<Mutex<HashSet<String>>>,
    fail_commits: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
}

impl MockCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every change for `key` fail while its batch commits.
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.lock().unwrap().clone()
    }

    pub fn product(&self, integration_id: &str, external_id: &str) -> Option<Product> {
        self.products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.integration_id == integration_id && p.external_id == external_id)
            .cloned()
    }

    pub fn stock(&self) -> Vec<StockLevel> {
        self.stock.lock().unwrap().clone()
    }

    fn begin_commit(&self) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::Database(DatabaseError::TransactionFailed(
                "Intentional commit failure".to_string(),
            )));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn should_fail(&self, key: &str) -> bool {
        self.failing_keys.lock().unwrap().contains(key)
    }
}

#[async_trait]
impl CatalogRepositoryTrait for MockCatalogRepository {
    fn find_products(&self, integration_id: &str, external_ids: &[String]) -> Result<Vec<Product>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.integration_id == integration_id && external_ids.contains(&p.external_id))
            .cloned()
            .collect())
    }

    fn find_stock(&self, integration_id: &str, keys: &[StockKey]) -> Result<Vec<StockLevel>> {
        Ok(self
            .stock
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.integration_id == integration_id && keys.contains(&s.key))
            .cloned()
            .collect())
    }

    fn list_products(&self, integration_id: &str, offset: i64, limit: i64) -> Result<Vec<Product>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.integration_id == integration_id)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn apply_product_changes(
        &self,
        integration_id: &str,
        changes: Vec<ProductChange>,
    ) -> Result<BatchOutcome<String>> {
        self.begin_commit()?;
        let now = Utc::now();
        let mut outcome = BatchOutcome::default();
        let mut products = self.products.lock().unwrap();

        for change in changes {
            if self.should_fail(&change.key) {
                outcome.failed.push(FailedChange {
                    key: change.key,
                    message: "Intentional record failure".to_string(),
                });
                continue;
            }
            let existing = products
                .iter_mut()
                .find(|p| p.integration_id == integration_id && p.external_id == change.key);
            match (change.action, existing) {
                (ChangeAction::Created, None) => {
                    let product = Product {
                        id: uuid::Uuid::new_v4().to_string(),
                        integration_id: integration_id.to_string(),
                        external_id: change.key.clone(),
                        fields: change.fields,
                        sync_version: 1,
                        last_sync_at: Some(now),
                        sync_status: RecordSyncStatus::Synced,
                        sync_error: None,
                        created_at: now,
                        updated_at: now,
                    };
                    outcome.applied.push(AppliedChange {
                        key: change.key,
                        record_id: product.id.clone(),
                        action: ChangeAction::Created,
                        sync_version: 1,
                    });
                    products.push(product);
                }
                (ChangeAction::Updated, Some(product)) => {
                    product.fields = change.fields;
                    product.sync_version += 1;
                    product.last_sync_at = Some(now);
                    product.updated_at = now;
                    outcome.applied.push(AppliedChange {
                        key: change.key,
                        record_id: product.id.clone(),
                        action: ChangeAction::Updated,
                        sync_version: product.sync_version,
                    });
                }
                (action, _) => outcome.failed.push(FailedChange {
                    message: format!("{:?} does not match stored state", action),
                    key: change.key,
                }),
            }
        }
        Ok(outcome)
    }

    async fn apply_stock_changes(
        &self,
        integration_id: &str,
        changes: Vec<StockChange>,
    ) -> Result<BatchOutcome<StockKey>> {
        self.begin_commit()?;
        let now = Utc::now();
        let mut outcome = BatchOutcome::default();
        let mut stock = self.stock.lock().unwrap();

        for change in changes {
            let existing = stock
                .iter_mut()
                .find(|s| s.integration_id == integration_id && s.key == change.key);
            match (change.action, existing) {
                (ChangeAction::Created, None) => {
                    let level = StockLevel {
                        id: uuid::Uuid::new_v4().to_string(),
                        integration_id: integration_id.to_string(),
                        key: change.key.clone(),
                        fields: change.fields,
                        sync_version: 1,
                        last_sync_at: Some(now),
                        created_at: now,
                        updated_at: now,
                    };
                    outcome.applied.push(AppliedChange {
                        key: change.key,
                        record_id: level.id.clone(),
                        action: ChangeAction::Created,
                        sync_version: 1,
                    });
                    stock.push(level);
                }
                (ChangeAction::Updated, Some(level)) => {
                    level.fields = change.fields;
                    level.sync_version += 1;
                    level.last_sync_at = Some(now);
                    level.updated_at = now;
                    outcome.applied.push(AppliedChange {
                        key: change.key,
                        record_id: level.id.clone(),
                        action: ChangeAction::Updated,
                        sync_version: level.sync_version,
                    });
                }
                (action, _) => outcome.failed.push(FailedChange {
                    message: format!("{:?} does not match stored state", action),
                    key: change.key,
                }),
            }
        }
        Ok(outcome)
    }
}

// =========================================================================
// MockSyncLogRepository
// =========================================================================

#[derive(Clone, Default)]
pub struct MockSyncLogRepository {
    logs: Arc<Mutex<Vec<SyncLog>>>,
}

impl MockSyncLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SyncLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn insert(&self, log: SyncLog) {
        self.logs.lock().unwrap().push(log);
    }
}

#[async_trait]
impl SyncLogRepositoryTrait for MockSyncLogRepository {
    async fn create(&self, log: SyncLog) -> Result<SyncLog> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(log)
    }

    async fn finalize(&self, log: SyncLog) -> Result<SyncLog> {
        let mut logs = self.logs.lock().unwrap();
        let stored = logs
            .iter_mut()
            .find(|l| l.id == log.id)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(log.id.clone())))?;
        if stored.status.is_final() {
            return Err(Error::Unexpected(format!("Sync log {} already final", log.id)));
        }
        *stored = log.clone();
        Ok(log)
    }

    async fn delete_finalized_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|l| !(l.status.is_final() && l.started_at < cutoff));
        Ok(before - logs.len())
    }

    fn get_by_id(&self, id: &str) -> Result<SyncLog> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(id.to_string())))
    }

    fn list_for_integration(
        &self,
        integration_id: &str,
        filter: &SyncLogFilter,
    ) -> Result<Vec<SyncLog>> {
        let mut logs: Vec<SyncLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.integration_id == integration_id)
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| filter.entity_type.map_or(true, |e| l.entity_type == e))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let limit = if filter.limit > 0 { filter.limit as usize } else { usize::MAX };
        Ok(logs
            .into_iter()
            .skip(filter.skip.max(0) as usize)
            .take(limit)
            .collect())
    }

    fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<SyncLog>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.started_at >= since)
            .cloned()
            .collect())
    }
}

// =========================================================================
// ScriptedOneC
// =========================================================================

/// A 1C endpoint serving a fixed catalog, paged by offset and limit.
///
/// Queued errors are returned (one per call) before any data is served.
#[derive(Default)]
pub struct ScriptedOneC {
    catalog: Mutex<Vec<RemoteProduct>>,
    stock: Mutex<Vec<RemoteStock>>,
    errors: Mutex<VecDeque<OneCError>>,
    unhealthy: AtomicBool,
    nomenclature_calls: AtomicUsize,
    queries: Mutex<Vec<NomenclatureQuery>>,
    /// When set, a fetch at a non-zero offset waits for this before answering.
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedOneC {
    pub fn with_products(products: Vec<RemoteProduct>) -> Arc<Self> {
        let api = Self::default();
        *api.catalog.lock().unwrap() = products;
        Arc::new(api)
    }

    pub fn set_products(&self, products: Vec<RemoteProduct>) {
        *self.catalog.lock().unwrap() = products;
    }

    pub fn set_stock(&self, stock: Vec<RemoteStock>) {
        *self.stock.lock().unwrap() = stock;
    }

    pub fn push_error(&self, error: OneCError) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    pub fn nomenclature_calls(&self) -> usize {
        self.nomenclature_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<NomenclatureQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn gate_later_pages(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    fn next_error(&self) -> Option<OneCError> {
        self.errors.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl OneCApi for ScriptedOneC {
    async fn fetch_nomenclature(
        &self,
        query: NomenclatureQuery,
    ) -> tradeos_onec::Result<NomenclaturePage> {
        self.nomenclature_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        if let Some(error) = self.next_error() {
            return Err(error);
        }
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if query.offset > 0 {
                gate.notified().await;
            }
        }

        let catalog = self.catalog.lock().unwrap().clone();
        let start = (query.offset as usize).min(catalog.len());
        let end = (start + query.limit as usize).min(catalog.len());
        Ok(NomenclaturePage {
            items: catalog[start..end].to_vec(),
            total: Some(catalog.len() as i64),
            limit: Some(query.limit as i64),
            offset: Some(query.offset as i64),
            has_more: end < catalog.len(),
        })
    }

    async fn fetch_stock(&self, _query: StockQuery) -> tradeos_onec::Result<StockPage> {
        if let Some(error) = self.next_error() {
            return Err(error);
        }
        let items = self.stock.lock().unwrap().clone();
        Ok(StockPage {
            total: Some(items.len() as i64),
            items,
        })
    }

    async fn health_check(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }

    async fn create_order(&self, _order: Value) -> tradeos_onec::Result<OrderResult> {
        Ok(OrderResult {
            success: true,
            order_id: Some("o-1".to_string()),
            order_number: Some("1".to_string()),
        })
    }

    async fn order_status(&self, _order_id: &str) -> tradeos_onec::Result<Value> {
        Ok(json!({"status": "new"}))
    }
}

/// Hands out the scripted endpoint registered for each integration.
#[derive(Clone, Default)]
pub struct ScriptedClientFactory {
    clients: Arc<Mutex<HashMap<String, Arc<ScriptedOneC>>>>,
}

impl ScriptedClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, integration_id: &str, client: Arc<ScriptedOneC>) {
        self.clients
            .lock()
            .unwrap()
            .insert(integration_id.to_string(), client);
    }
}

impl ClientFactory for ScriptedClientFactory {
    fn client_for(&self, integration: &Integration) -> Result<Arc<dyn OneCApi>> {
        self.clients
            .lock()
            .unwrap()
            .get(&integration.id)
            .cloned()
            .map(|client| client as Arc<dyn OneCApi>)
            .ok_or_else(|| Error::Unexpected(format!("No client for {}", integration.id)))
    }
}
