//! Database model for sync logs.

use diesel::prelude::*;
use std::str::FromStr;

use tradeos_core::sync::{EntityType, SyncLog, SyncLogStatus, SyncType};

use crate::errors::StorageError;
use crate::utils::{format_ts, parse_opt_ts, parse_ts};

#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::sync_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct SyncLogDB {
    pub id: String,
    pub integration_id: String,
    pub task_id: Option<String>,
    pub sync_type: String,
    pub entity_type: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub total_items: i64,
    pub processed_items: i64,
    pub created_items: i64,
    pub updated_items: i64,
    pub failed_items: i64,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    pub duration_secs: Option<f64>,
}

impl TryFrom<SyncLogDB> for SyncLog {
    type Error = StorageError;

    fn try_from(db: SyncLogDB) -> Result<Self, StorageError> {
        let error_details = db
            .error_details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Self {
            sync_type: SyncType::from_str(&db.sync_type)?,
            entity_type: EntityType::from_str(&db.entity_type)?,
            status: SyncLogStatus::from_str(&db.status)?,
            started_at: parse_ts(&db.started_at)?,
            completed_at: parse_opt_ts(db.completed_at.as_deref())?,
            id: db.id,
            integration_id: db.integration_id,
            task_id: db.task_id,
            total_items: db.total_items,
            processed_items: db.processed_items,
            created_items: db.created_items,
            updated_items: db.updated_items,
            failed_items: db.failed_items,
            error_message: db.error_message,
            error_details,
            duration_secs: db.duration_secs,
        })
    }
}

impl From<&SyncLog> for SyncLogDB {
    fn from(log: &SyncLog) -> Self {
        Self {
            id: log.id.clone(),
            integration_id: log.integration_id.clone(),
            task_id: log.task_id.clone(),
            sync_type: log.sync_type.as_str().to_string(),
            entity_type: log.entity_type.as_str().to_string(),
            status: log.status.as_str().to_string(),
            started_at: format_ts(log.started_at),
            completed_at: log.completed_at.map(format_ts),
            total_items: log.total_items,
            processed_items: log.processed_items,
            created_items: log.created_items,
            updated_items: log.updated_items,
            failed_items: log.failed_items,
            error_message: log.error_message.clone(),
            error_details: log.error_details.as_ref().map(|v| v.to_string()),
            duration_secs: log.duration_secs,
        }
    }
}
