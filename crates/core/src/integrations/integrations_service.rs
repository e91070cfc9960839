use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::integrations_model::{
    Integration, IntegrationOutcome, IntegrationStatus, IntegrationUpdate, NewIntegration,
};
use super::integrations_traits::{ClientFactory, IntegrationRepositoryTrait, IntegrationServiceTrait};
use crate::errors::{DatabaseError, Error, Result};
use crate::sync::{SyncLog, SyncLogFilter, SyncLogRepositoryTrait, SyncLogStatus};
use tradeos_onec::ConnectionTestResult;

/// Number of recent runs included in [`IntegrationStats`].
pub const RECENT_RUNS: i64 = 10;
pub const MIN_OVERVIEW_HOURS: i64 = 1;
pub const MAX_OVERVIEW_HOURS: i64 = 168;

/// Result of probing one integration during a health sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckReport {
    pub integration_id: String,
    pub integration_name: String,
    pub healthy: bool,
    pub response_time_ms: Option<f64>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Summary of one finished or running sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentRun {
    pub sync_log_id: String,
    pub entity_type: String,
    pub status: SyncLogStatus,
    pub started_at: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub processed_items: i64,
    pub failed_items: i64,
    pub error_message: Option<String>,
}

impl From<&SyncLog> for RecentRun {
    fn from(log: &SyncLog) -> Self {
        Self {
            sync_log_id: log.id.clone(),
            entity_type: log.entity_type.to_string(),
            status: log.status,
            started_at: log.started_at,
            duration_secs: log.duration_secs,
            processed_items: log.processed_items,
            failed_items: log.failed_items,
            error_message: log.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub integration_id: String,
    pub name: String,
    pub status: IntegrationStatus,
    pub is_enabled: bool,
    pub is_healthy: bool,
    pub total_syncs: i64,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
    pub success_rate: f64,
    pub avg_response_time_ms: Option<f64>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub recent_runs: Vec<RecentRun>,
}

/// Record totals of one entity type inside an overview window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityTotals {
    pub runs: i64,
    pub processed: i64,
    pub created: i64,
    pub updated: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusOverview {
    pub period_hours: i64,
    pub since: DateTime<Utc>,
    pub total_runs: i64,
    pub completed_runs: i64,
    pub failed_runs: i64,
    pub running_runs: i64,
    pub success_rate: f64,
    pub by_entity: BTreeMap<String, EntityTotals>,
}

impl SyncStatusOverview {
    /// Aggregates logs that started at or after `since`.
    pub fn from_logs(logs: &[SyncLog], period_hours: i64, since: DateTime<Utc>) -> Self {
        let mut overview = Self {
            period_hours,
            since,
            total_runs: 0,
            completed_runs: 0,
            failed_runs: 0,
            running_runs: 0,
            success_rate: 0.0,
            by_entity: BTreeMap::new(),
        };

        for log in logs.iter().filter(|log| log.started_at >= since) {
            overview.total_runs += 1;
            match log.status {
                SyncLogStatus::Completed => overview.completed_runs += 1,
                SyncLogStatus::Failed => overview.failed_runs += 1,
                SyncLogStatus::Pending | SyncLogStatus::Running => overview.running_runs += 1,
            }
            let totals = overview
                .by_entity
                .entry(log.entity_type.to_string())
                .or_default();
            totals.runs += 1;
            totals.processed += log.processed_items;
            totals.created += log.created_items;
            totals.updated += log.updated_items;
            totals.failed += log.failed_items;
        }

        if overview.total_runs > 0 {
            overview.success_rate =
                overview.completed_runs as f64 / overview.total_runs as f64 * 100.0;
        }
        overview
    }
}

/// Integration administration, health checks and reporting.
pub struct IntegrationService {
    integrations: Arc<dyn IntegrationRepositoryTrait>,
    sync_logs: Arc<dyn SyncLogRepositoryTrait>,
    clients: Arc<dyn ClientFactory>,
}

impl IntegrationService {
    pub fn new(
        integrations: Arc<dyn IntegrationRepositoryTrait>,
        sync_logs: Arc<dyn SyncLogRepositoryTrait>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            integrations,
            sync_logs,
            clients,
        }
    }

    /// Deletes finalized sync logs older than `retention_days`.
    pub async fn cleanup_sync_logs(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let deleted = self.sync_logs.delete_finalized_before(cutoff).await?;
        if deleted > 0 {
            info!("Deleted {} sync log(s) older than {}", deleted, cutoff);
        }
        Ok(deleted)
    }

    fn ensure_unique_name(&self, name: &str, own_id: Option<&str>) -> Result<()> {
        match self.integrations.get_by_name(name)? {
            Some(existing) if Some(existing.id.as_str()) != own_id => Err(Error::Database(
                DatabaseError::UniqueViolation(format!(
                    "Integration with name '{}' already exists",
                    name
                )),
            )),
            _ => Ok(()),
        }
    }

    async fn check_one(&self, integration: &Integration) -> HealthCheckReport {
        let started = Instant::now();
        let (healthy, error) = match self.clients.client_for(integration) {
            Ok(client) => {
                let healthy = client.health_check().await;
                client.close().await;
                (healthy, (!healthy).then(|| "Health check failed".to_string()))
            }
            Err(e) => (false, Some(e.to_string())),
        };
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        HealthCheckReport {
            integration_id: integration.id.clone(),
            integration_name: integration.name.clone(),
            healthy,
            response_time_ms: healthy.then_some(response_time_ms),
            error,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl IntegrationServiceTrait for IntegrationService {
    async fn create_integration(&self, new_integration: NewIntegration) -> Result<Integration> {
        new_integration.validate()?;
        self.ensure_unique_name(&new_integration.name, None)?;
        let integration = self.integrations.create(new_integration).await?;
        info!(
            "Created integration '{}' ({})",
            integration.name, integration.id
        );
        Ok(integration)
    }

    async fn update_integration(
        &self,
        integration_id: &str,
        update: IntegrationUpdate,
    ) -> Result<Integration> {
        update.validate()?;
        if let Some(name) = &update.name {
            self.ensure_unique_name(name, Some(integration_id))?;
        }
        let integration = self.integrations.update(integration_id, update).await?;
        debug!("Updated integration {}", integration_id);
        Ok(integration)
    }

    async fn set_enabled(&self, integration_id: &str, enabled: bool) -> Result<Integration> {
        let update = IntegrationUpdate {
            is_enabled: Some(enabled),
            ..IntegrationUpdate::default()
        };
        let integration = self.integrations.update(integration_id, update).await?;
        info!(
            "Integration '{}' {}",
            integration.name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(integration)
    }

    fn get_integration(&self, integration_id: &str) -> Result<Integration> {
        self.integrations.get_by_id(integration_id)
    }

    fn list_integrations(
        &self,
        is_enabled: Option<bool>,
        integration_type: Option<&str>,
    ) -> Result<Vec<Integration>> {
        self.integrations.list(is_enabled, integration_type)
    }

    async fn test_connection(&self, integration_id: &str) -> Result<ConnectionTestResult> {
        let integration = self.integrations.get_by_id(integration_id)?;
        let client = self.clients.client_for(&integration)?;
        let result = client.test_connection().await;
        client.close().await;
        if !result.success {
            warn!(
                "Connection test for '{}' failed: {}",
                integration.name,
                result.error.as_deref().unwrap_or("unhealthy")
            );
        }
        Ok(result)
    }

    async fn check_all(&self) -> Result<Vec<HealthCheckReport>> {
        let integrations = self.integrations.list(Some(true), None)?;
        let mut reports = Vec::with_capacity(integrations.len());

        for integration in &integrations {
            let report = self.check_one(integration).await;
            if !report.healthy {
                warn!(
                    "Integration '{}' is unhealthy: {}",
                    integration.name,
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }
            let outcome = IntegrationOutcome::HealthChecked {
                at: report.checked_at,
                healthy: report.healthy,
                response_time_ms: report.response_time_ms,
            };
            // One failed write must not stop the sweep.
            if let Err(e) = self
                .integrations
                .record_outcome(&integration.id, outcome)
                .await
            {
                error!(
                    "Cannot record health of integration '{}': {}",
                    integration.name, e
                );
            }
            reports.push(report);
        }

        debug!("Health-checked {} integration(s)", reports.len());
        Ok(reports)
    }

    fn integration_stats(&self, integration_id: &str) -> Result<IntegrationStats> {
        let integration = self.integrations.get_by_id(integration_id)?;
        let recent = self.sync_logs.list_for_integration(
            integration_id,
            &SyncLogFilter {
                limit: RECENT_RUNS,
                ..SyncLogFilter::default()
            },
        )?;

        Ok(IntegrationStats {
            success_rate: integration.success_rate(),
            integration_id: integration.id,
            name: integration.name,
            status: integration.status,
            is_enabled: integration.is_enabled,
            is_healthy: integration.is_healthy,
            total_syncs: integration.total_syncs,
            successful_syncs: integration.successful_syncs,
            failed_syncs: integration.failed_syncs,
            avg_response_time_ms: integration.avg_response_time_ms,
            last_sync_at: integration.last_sync_at,
            next_sync_at: integration.next_sync_at,
            last_health_check: integration.last_health_check,
            last_error: integration.last_error,
            recent_runs: recent.iter().map(RecentRun::from).collect(),
        })
    }

    fn sync_status_overview(&self, last_hours: i64) -> Result<SyncStatusOverview> {
        let hours = last_hours.clamp(MIN_OVERVIEW_HOURS, MAX_OVERVIEW_HOURS);
        let since = Utc::now() - Duration::hours(hours);
        let logs = self.sync_logs.list_since(since)?;
        Ok(SyncStatusOverview::from_logs(&logs, hours, since))
    }
}
