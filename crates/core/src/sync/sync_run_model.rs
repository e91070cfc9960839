//! Run requests, reports and task state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::sync_log_model::{EntityType, SyncCounters, SyncLogStatus, SyncType};
use crate::errors::ErrorKind;

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of pages to fetch per run (safety limit).
    pub max_pages: usize,
    /// Delay before a failed run is attempted again.
    pub retry_delay: Duration,
    /// Attempts per run, the first one included.
    pub max_run_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pages: 10_000,
            retry_delay: Duration::from_secs(60),
            max_run_attempts: 3,
        }
    }
}

/// A request to sync one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub entity_type: EntityType,
    /// `None` means every enabled, healthy integration.
    #[serde(default)]
    pub integration_id: Option<String>,
    /// `None` picks incremental when a watermark exists, full otherwise.
    #[serde(default)]
    pub sync_type: Option<SyncType>,
}

impl SyncRequest {
    pub fn all(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            integration_id: None,
            sync_type: None,
        }
    }

    pub fn for_integration(entity_type: EntityType, integration_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            integration_id: Some(integration_id.into()),
            sync_type: None,
        }
    }
}

/// Lifecycle of an asynchronous sync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Started,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl TaskStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, TaskStatus::Started | TaskStatus::Running)
    }
}

/// Handle returned by a fire-and-continue sync request.
#[derive(Debug, Clone, Serialize)]
pub struct SyncTicket {
    pub task_id: String,
    pub status: TaskStatus,
}

/// Outcome of one integration within a run.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationRunResult {
    pub integration_id: String,
    pub integration_name: String,
    pub sync_log_id: Option<String>,
    pub status: SyncLogStatus,
    pub counters: SyncCounters,
    /// Per-record failures that did not stop the run.
    pub record_errors: Vec<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub cancelled: bool,
    pub duration_secs: f64,
}

impl IntegrationRunResult {
    /// True when another attempt might succeed. Auth and response failures
    /// need a config change first, so they stay terminal.
    pub fn is_retryable(&self) -> bool {
        self.status == SyncLogStatus::Failed
            && !self.cancelled
            && matches!(
                self.error_kind,
                Some(ErrorKind::Transient | ErrorKind::RunFatal)
            )
    }
}

/// Outcome of a whole run (all targeted integrations, all attempts).
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub task_id: String,
    pub entity_type: EntityType,
    pub status: TaskStatus,
    pub attempts: u32,
    /// Final result per integration (the last attempt that touched it).
    pub results: Vec<IntegrationRunResult>,
}

impl RunReport {
    pub fn totals(&self) -> SyncCounters {
        self.results
            .iter()
            .fold(SyncCounters::default(), |mut acc, r| {
                acc.total += r.counters.total;
                acc.processed += r.counters.processed;
                acc.created += r.counters.created;
                acc.updated += r.counters.updated;
                acc.failed += r.counters.failed;
                acc
            })
    }
}

/// Queryable state of a task.
#[derive(Debug, Clone, Serialize)]
pub struct SyncTask {
    pub task_id: String,
    pub entity_type: EntityType,
    pub integration_id: Option<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub report: Option<RunReport>,
    pub error: Option<String>,
}
