//! Database models for catalog products and stock balances.

use diesel::prelude::*;
use std::str::FromStr;

use tradeos_core::catalog::{
    Product, ProductFields, RecordSyncStatus, StockFields, StockKey, StockLevel,
};

use crate::errors::StorageError;
use crate::utils::{parse_decimal, parse_opt_decimal, parse_opt_ts, parse_ts};

/// Database model for products. Decimals are stored as text.
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductDB {
    pub id: String,
    pub integration_id: String,
    pub external_id: String,
    pub external_code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub category: Option<String>,
    pub external_data: Option<String>,
    pub sync_version: i64,
    pub last_sync_at: Option<String>,
    pub sync_status: String,
    pub sync_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// The columns a sync writes on an existing product.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::products)]
#[diesel(treat_none_as_null = true)]
pub struct ProductFieldsDB {
    pub external_code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub category: Option<String>,
    pub external_data: Option<String>,
}

impl From<&ProductFields> for ProductFieldsDB {
    fn from(fields: &ProductFields) -> Self {
        Self {
            external_code: fields.external_code.clone(),
            name: fields.name.clone(),
            description: fields.description.clone(),
            price: fields.price.map(|d| d.to_string()),
            quantity: fields.quantity.map(|d| d.to_string()),
            category: fields.category.clone(),
            external_data: fields.external_data.as_ref().map(|v| v.to_string()),
        }
    }
}

impl TryFrom<ProductDB> for Product {
    type Error = StorageError;

    fn try_from(db: ProductDB) -> Result<Self, StorageError> {
        let external_data = db
            .external_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Self {
            fields: ProductFields {
                external_code: db.external_code,
                name: db.name,
                description: db.description,
                price: parse_opt_decimal(db.price.as_deref())?,
                quantity: parse_opt_decimal(db.quantity.as_deref())?,
                category: db.category,
                external_data,
            },
            sync_status: RecordSyncStatus::from_str(&db.sync_status)?,
            last_sync_at: parse_opt_ts(db.last_sync_at.as_deref())?,
            created_at: parse_ts(&db.created_at)?,
            updated_at: parse_ts(&db.updated_at)?,
            id: db.id,
            integration_id: db.integration_id,
            external_id: db.external_id,
            sync_version: db.sync_version,
            sync_error: db.sync_error,
        })
    }
}

/// Database model for stock balances.
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::stock_levels)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StockLevelDB {
    pub id: String,
    pub integration_id: String,
    pub product_external_id: String,
    pub warehouse_id: String,
    pub warehouse_name: Option<String>,
    pub quantity: String,
    pub reserved: String,
    pub available: String,
    pub sync_version: i64,
    pub last_sync_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::stock_levels)]
#[diesel(treat_none_as_null = true)]
pub struct StockFieldsDB {
    pub warehouse_name: Option<String>,
    pub quantity: String,
    pub reserved: String,
    pub available: String,
}

impl From<&StockFields> for StockFieldsDB {
    fn from(fields: &StockFields) -> Self {
        Self {
            warehouse_name: fields.warehouse_name.clone(),
            quantity: fields.quantity.to_string(),
            reserved: fields.reserved.to_string(),
            available: fields.available.to_string(),
        }
    }
}

impl TryFrom<StockLevelDB> for StockLevel {
    type Error = StorageError;

    fn try_from(db: StockLevelDB) -> Result<Self, StorageError> {
        Ok(Self {
            key: StockKey {
                product_external_id: db.product_external_id,
                warehouse_id: db.warehouse_id,
            },
            fields: StockFields {
                warehouse_name: db.warehouse_name,
                quantity: parse_decimal(&db.quantity)?,
                reserved: parse_decimal(&db.reserved)?,
                available: parse_decimal(&db.available)?,
            },
            last_sync_at: parse_opt_ts(db.last_sync_at.as_deref())?,
            created_at: parse_ts(&db.created_at)?,
            updated_at: parse_ts(&db.updated_at)?,
            id: db.id,
            integration_id: db.integration_id,
            sync_version: db.sync_version,
        })
    }
}
