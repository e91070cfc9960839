//! Repository for catalog products and stock balances.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use tradeos_core::catalog::{
    AppliedChange, BatchOutcome, CatalogRepositoryTrait, ChangeAction, FailedChange, Product,
    ProductChange, RecordChange, RecordSyncStatus, StockChange, StockKey, StockLevel,
};
use tradeos_core::errors::{DatabaseError, Error, Result};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{products, stock_levels};
use crate::utils::{chunk_for_sqlite, format_ts};

use super::model::{ProductDB, ProductFieldsDB, StockFieldsDB, StockLevelDB};

pub struct CatalogRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl CatalogRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn missing(what: String) -> StorageError {
    StorageError::Core(Error::Database(DatabaseError::NotFound(what)))
}

fn apply_product(
    conn: &mut SqliteConnection,
    integration_id: &str,
    change: &ProductChange,
    now: &str,
) -> std::result::Result<AppliedChange<String>, StorageError> {
    let fields = ProductFieldsDB::from(&change.fields);
    match change.action {
        ChangeAction::Created => {
            let row = ProductDB {
                id: Uuid::new_v4().to_string(),
                integration_id: integration_id.to_string(),
                external_id: change.key.clone(),
                external_code: fields.external_code,
                name: fields.name,
                description: fields.description,
                price: fields.price,
                quantity: fields.quantity,
                category: fields.category,
                external_data: fields.external_data,
                sync_version: 1,
                last_sync_at: Some(now.to_string()),
                sync_status: RecordSyncStatus::Synced.as_str().to_string(),
                sync_error: None,
                created_at: now.to_string(),
                updated_at: now.to_string(),
            };
            diesel::insert_into(products::table)
                .values(&row)
                .execute(conn)?;
            Ok(AppliedChange {
                key: change.key.clone(),
                record_id: row.id,
                action: ChangeAction::Created,
                sync_version: 1,
            })
        }
        ChangeAction::Updated => {
            let (record_id, version) = products::table
                .filter(products::integration_id.eq(integration_id))
                .filter(products::external_id.eq(&change.key))
                .select((products::id, products::sync_version))
                .first::<(String, i64)>(conn)
                .optional()?
                .ok_or_else(|| missing(format!("Product {} not found", change.key)))?;

            let next_version = version + 1;
            diesel::update(products::table.find(&record_id))
                .set((
                    &fields,
                    products::sync_version.eq(next_version),
                    products::last_sync_at.eq(Some(now)),
                    products::sync_status.eq(RecordSyncStatus::Synced.as_str()),
                    products::sync_error.eq(None::<String>),
                    products::updated_at.eq(now),
                ))
                .execute(conn)?;
            Ok(AppliedChange {
                key: change.key.clone(),
                record_id,
                action: ChangeAction::Updated,
                sync_version: next_version,
            })
        }
    }
}

fn apply_stock(
    conn: &mut SqliteConnection,
    integration_id: &str,
    change: &StockChange,
    now: &str,
) -> std::result::Result<AppliedChange<StockKey>, StorageError> {
    let fields = StockFieldsDB::from(&change.fields);
    match change.action {
        ChangeAction::Created => {
            let row = StockLevelDB {
                id: Uuid::new_v4().to_string(),
                integration_id: integration_id.to_string(),
                product_external_id: change.key.product_external_id.clone(),
                warehouse_id: change.key.warehouse_id.clone(),
                warehouse_name: fields.warehouse_name,
                quantity: fields.quantity,
                reserved: fields.reserved,
                available: fields.available,
                sync_version: 1,
                last_sync_at: Some(now.to_string()),
                created_at: now.to_string(),
                updated_at: now.to_string(),
            };
            diesel::insert_into(stock_levels::table)
                .values(&row)
                .execute(conn)?;
            Ok(AppliedChange {
                key: change.key.clone(),
                record_id: row.id,
                action: ChangeAction::Created,
                sync_version: 1,
            })
        }
        ChangeAction::Updated => {
            let (record_id, version) = stock_levels::table
                .filter(stock_levels::integration_id.eq(integration_id))
                .filter(stock_levels::product_external_id.eq(&change.key.product_external_id))
                .filter(stock_levels::warehouse_id.eq(&change.key.warehouse_id))
                .select((stock_levels::id, stock_levels::sync_version))
                .first::<(String, i64)>(conn)
                .optional()?
                .ok_or_else(|| missing(format!("Stock {} not found", change.key)))?;

            let next_version = version + 1;
            diesel::update(stock_levels::table.find(&record_id))
                .set((
                    &fields,
                    stock_levels::sync_version.eq(next_version),
                    stock_levels::last_sync_at.eq(Some(now)),
                    stock_levels::updated_at.eq(now),
                ))
                .execute(conn)?;
            Ok(AppliedChange {
                key: change.key.clone(),
                record_id,
                action: ChangeAction::Updated,
                sync_version: next_version,
            })
        }
    }
}

/// Applies each change in its own savepoint so one bad record does not
/// roll back its siblings.
fn apply_each<K: Clone, F>(
    conn: &mut SqliteConnection,
    changes: &[RecordChange<K, F>],
    mut apply: impl FnMut(
        &mut SqliteConnection,
        &RecordChange<K, F>,
    ) -> std::result::Result<AppliedChange<K>, StorageError>,
) -> BatchOutcome<K> {
    let mut outcome = BatchOutcome::default();
    for change in changes {
        match conn.transaction::<_, StorageError, _>(|c| apply(c, change)) {
            Ok(applied) => outcome.applied.push(applied),
            Err(e) => outcome.failed.push(FailedChange {
                key: change.key.clone(),
                message: Error::from(e).to_string(),
            }),
        }
    }
    outcome
}

#[async_trait]
impl CatalogRepositoryTrait for CatalogRepository {
    fn find_products(&self, integration_id: &str, external_ids: &[String]) -> Result<Vec<Product>> {
        let mut conn = get_connection(&self.pool)?;
        let mut found = Vec::with_capacity(external_ids.len());
        for chunk in chunk_for_sqlite(external_ids) {
            let rows = products::table
                .filter(products::integration_id.eq(integration_id))
                .filter(products::external_id.eq_any(chunk))
                .load::<ProductDB>(&mut conn)
                .map_err(StorageError::from)?;
            for row in rows {
                found.push(Product::try_from(row)?);
            }
        }
        Ok(found)
    }

    fn find_stock(&self, integration_id: &str, keys: &[StockKey]) -> Result<Vec<StockLevel>> {
        let mut conn = get_connection(&self.pool)?;
        let wanted: HashSet<&StockKey> = keys.iter().collect();
        let mut product_ids: Vec<&str> = keys
            .iter()
            .map(|k| k.product_external_id.as_str())
            .collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let mut found = Vec::with_capacity(keys.len());
        for chunk in chunk_for_sqlite(&product_ids) {
            let rows = stock_levels::table
                .filter(stock_levels::integration_id.eq(integration_id))
                .filter(stock_levels::product_external_id.eq_any(chunk.to_vec()))
                .load::<StockLevelDB>(&mut conn)
                .map_err(StorageError::from)?;
            for row in rows {
                let stock = StockLevel::try_from(row)?;
                if wanted.contains(&stock.key) {
                    found.push(stock);
                }
            }
        }
        Ok(found)
    }

    fn list_products(&self, integration_id: &str, offset: i64, limit: i64) -> Result<Vec<Product>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = products::table
            .filter(products::integration_id.eq(integration_id))
            .order((products::name.asc(), products::external_id.asc()))
            .offset(offset.max(0))
            .limit(limit.max(0))
            .load::<ProductDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter()
            .map(|row| Product::try_from(row).map_err(Error::from))
            .collect()
    }

    async fn apply_product_changes(
        &self,
        integration_id: &str,
        changes: Vec<ProductChange>,
    ) -> Result<BatchOutcome<String>> {
        if changes.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let integration_id = integration_id.to_string();
        self.writer
            .exec(move |conn| {
                let now = format_ts(Utc::now());
                Ok(apply_each(conn, &changes, |c, change| {
                    apply_product(c, &integration_id, change, &now)
                }))
            })
            .await
    }

    async fn apply_stock_changes(
        &self,
        integration_id: &str,
        changes: Vec<StockChange>,
    ) -> Result<BatchOutcome<StockKey>> {
        if changes.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let integration_id = integration_id.to_string();
        self.writer
            .exec(move |conn| {
                let now = format_ts(Utc::now());
                Ok(apply_each(conn, &changes, |c, change| {
                    apply_stock(c, &integration_id, change, &now)
                }))
            })
            .await
    }
}
