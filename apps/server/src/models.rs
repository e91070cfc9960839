use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tradeos_core::integrations::{Integration, IntegrationSettings, IntegrationStatus};
use tradeos_core::sync::{EntityType, SyncType, TaskStatus};

/// Integration as returned by the API. Secrets never leave the server; only
/// the credential kind is shown.
#[derive(Serialize, Debug, Clone)]
pub struct IntegrationResponse {
    pub id: String,
    pub name: String,
    pub integration_type: String,
    pub base_url: String,
    pub auth_type: &'static str,
    pub settings: IntegrationSettings,
    pub is_enabled: bool,
    pub is_healthy: bool,
    pub status: IntegrationStatus,
    pub sync_interval_secs: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub total_syncs: i64,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
    pub avg_response_time_ms: Option<f64>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Integration> for IntegrationResponse {
    fn from(i: Integration) -> Self {
        Self {
            auth_type: i.credential.label(),
            id: i.id,
            name: i.name,
            integration_type: i.integration_type,
            base_url: i.base_url,
            settings: i.settings,
            is_enabled: i.is_enabled,
            is_healthy: i.is_healthy,
            status: i.status,
            sync_interval_secs: i.sync_interval_secs,
            last_sync_at: i.last_sync_at,
            next_sync_at: i.next_sync_at,
            last_health_check: i.last_health_check,
            total_syncs: i.total_syncs,
            successful_syncs: i.successful_syncs,
            failed_syncs: i.failed_syncs,
            avg_response_time_ms: i.avg_response_time_ms,
            last_error: i.last_error,
            created_at: i.created_at,
            updated_at: i.updated_at,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct IntegrationListQuery {
    pub is_enabled: Option<bool>,
    pub integration_type: Option<String>,
}

/// Body of a sync trigger.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SyncTriggerRequest {
    pub entity_type: EntityType,
    #[serde(default)]
    pub sync_type: Option<SyncType>,
}

/// Accepted sync trigger.
#[derive(Serialize, Debug, Clone)]
pub struct SyncTriggerResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SyncLogQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub entity_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SyncStatusQuery {
    pub last_hours: Option<i64>,
}
