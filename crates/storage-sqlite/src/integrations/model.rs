//! Database model for integrations.

use diesel::prelude::*;
use std::str::FromStr;

use tradeos_core::integrations::{Integration, IntegrationStatus};

use crate::errors::StorageError;
use crate::utils::{format_ts, parse_opt_ts, parse_ts};

/// Database model for integrations. Credentials and settings are JSON text.
#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::integrations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct IntegrationDB {
    pub id: String,
    pub name: String,
    pub integration_type: String,
    pub base_url: String,
    pub credential: String,
    pub settings: String,
    pub is_enabled: bool,
    pub is_healthy: bool,
    pub status: String,
    pub sync_interval_secs: i64,
    pub last_sync_at: Option<String>,
    pub next_sync_at: Option<String>,
    pub last_health_check: Option<String>,
    pub total_syncs: i64,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
    pub avg_response_time_ms: Option<f64>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<IntegrationDB> for Integration {
    type Error = StorageError;

    fn try_from(db: IntegrationDB) -> Result<Self, StorageError> {
        Ok(Self {
            credential: serde_json::from_str(&db.credential)?,
            settings: serde_json::from_str(&db.settings)?,
            status: IntegrationStatus::from_str(&db.status).map_err(StorageError::from)?,
            last_sync_at: parse_opt_ts(db.last_sync_at.as_deref())?,
            next_sync_at: parse_opt_ts(db.next_sync_at.as_deref())?,
            last_health_check: parse_opt_ts(db.last_health_check.as_deref())?,
            created_at: parse_ts(&db.created_at)?,
            updated_at: parse_ts(&db.updated_at)?,
            id: db.id,
            name: db.name,
            integration_type: db.integration_type,
            base_url: db.base_url,
            is_enabled: db.is_enabled,
            is_healthy: db.is_healthy,
            sync_interval_secs: db.sync_interval_secs,
            total_syncs: db.total_syncs,
            successful_syncs: db.successful_syncs,
            failed_syncs: db.failed_syncs,
            avg_response_time_ms: db.avg_response_time_ms,
            last_error: db.last_error,
        })
    }
}

impl TryFrom<&Integration> for IntegrationDB {
    type Error = StorageError;

    fn try_from(domain: &Integration) -> Result<Self, StorageError> {
        Ok(Self {
            id: domain.id.clone(),
            name: domain.name.clone(),
            integration_type: domain.integration_type.clone(),
            base_url: domain.base_url.clone(),
            credential: serde_json::to_string(&domain.credential)?,
            settings: serde_json::to_string(&domain.settings)?,
            is_enabled: domain.is_enabled,
            is_healthy: domain.is_healthy,
            status: domain.status.as_str().to_string(),
            sync_interval_secs: domain.sync_interval_secs,
            last_sync_at: domain.last_sync_at.map(format_ts),
            next_sync_at: domain.next_sync_at.map(format_ts),
            last_health_check: domain.last_health_check.map(format_ts),
            total_syncs: domain.total_syncs,
            successful_syncs: domain.successful_syncs,
            failed_syncs: domain.failed_syncs,
            avg_response_time_ms: domain.avg_response_time_ms,
            last_error: domain.last_error.clone(),
            created_at: format_ts(domain.created_at),
            updated_at: format_ts(domain.updated_at),
        })
    }
}
