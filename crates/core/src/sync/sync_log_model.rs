//! Sync log domain models.

use crate::errors::{Error, Result, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a run pulls from the external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Nomenclature,
    Stock,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Nomenclature => "nomenclature",
            EntityType::Stock => "stock",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nomenclature" => Ok(Self::Nomenclature),
            "stock" => Ok(Self::Stock),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown entity type '{}'",
                other
            )))),
        }
    }
}

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// No watermark: every record is fetched.
    Full,
    /// Only records updated since the last successful sync.
    Incremental,
    /// Triggered by an operator; incremental when a watermark exists.
    Manual,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Incremental => "incremental",
            SyncType::Manual => "manual",
        }
    }
}

impl std::str::FromStr for SyncType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            "manual" => Ok(Self::Manual),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown sync type '{}'",
                other
            )))),
        }
    }
}

/// Status of a sync log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogStatus {
    Pending,
    #[default]
    Running,
    Completed,
    Failed,
}

impl SyncLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncLogStatus::Pending => "pending",
            SyncLogStatus::Running => "running",
            SyncLogStatus::Completed => "completed",
            SyncLogStatus::Failed => "failed",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, SyncLogStatus::Completed | SyncLogStatus::Failed)
    }
}

impl std::str::FromStr for SyncLogStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown sync log status '{}'",
                other
            )))),
        }
    }
}

/// Item counters of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncCounters {
    /// Records the source reported (or fetched, when it reports no total).
    pub total: i64,
    /// Records reconciled without error, skipped ones included.
    pub processed: i64,
    pub created: i64,
    pub updated: i64,
    pub failed: i64,
}

/// One run of one entity type against one integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: String,
    pub integration_id: String,
    pub task_id: Option<String>,
    pub sync_type: SyncType,
    pub entity_type: EntityType,
    pub status: SyncLogStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_items: i64,
    pub processed_items: i64,
    pub created_items: i64,
    pub updated_items: i64,
    pub failed_items: i64,
    pub error_message: Option<String>,
    /// Per-record errors and other structured detail.
    pub error_details: Option<Value>,
    pub duration_secs: Option<f64>,
}

impl SyncLog {
    /// Creates a running log.
    pub fn new(
        integration_id: String,
        task_id: Option<String>,
        sync_type: SyncType,
        entity_type: EntityType,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            integration_id,
            task_id,
            sync_type,
            entity_type,
            status: SyncLogStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            total_items: 0,
            processed_items: 0,
            created_items: 0,
            updated_items: 0,
            failed_items: 0,
            error_message: None,
            error_details: None,
            duration_secs: None,
        }
    }

    pub fn counters(&self) -> SyncCounters {
        SyncCounters {
            total: self.total_items,
            processed: self.processed_items,
            created: self.created_items,
            updated: self.updated_items,
            failed: self.failed_items,
        }
    }

    /// Marks the run as completed with its final counters.
    pub fn complete(&mut self, counters: SyncCounters, record_errors: &[String]) {
        self.finish(SyncLogStatus::Completed, counters);
        if !record_errors.is_empty() {
            self.error_message = Some(format!("{} record(s) failed", record_errors.len()));
            self.error_details = Some(serde_json::json!({ "errors": record_errors }));
        }
    }

    /// Marks the run as failed.
    pub fn fail(&mut self, counters: SyncCounters, error: String, record_errors: &[String]) {
        self.finish(SyncLogStatus::Failed, counters);
        self.error_message = Some(error);
        if !record_errors.is_empty() {
            self.error_details = Some(serde_json::json!({ "errors": record_errors }));
        }
    }

    fn finish(&mut self, status: SyncLogStatus, counters: SyncCounters) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.total_items = counters.total;
        self.processed_items = counters.processed;
        self.created_items = counters.created;
        self.updated_items = counters.updated;
        self.failed_items = counters.failed;
        self.duration_secs = Some((now - self.started_at).num_milliseconds() as f64 / 1000.0);
    }
}

/// Filters for listing sync logs.
#[derive(Debug, Clone, Default)]
pub struct SyncLogFilter {
    pub status: Option<SyncLogStatus>,
    pub entity_type: Option<EntityType>,
    pub skip: i64,
    pub limit: i64,
}

/// Trait for SyncLog persistence operations.
#[async_trait]
pub trait SyncLogRepositoryTrait: Send + Sync {
    /// Stores a new log.
    async fn create(&self, log: SyncLog) -> Result<SyncLog>;

    /// Writes a finalized log. Fails if the stored row is already final.
    async fn finalize(&self, log: SyncLog) -> Result<SyncLog>;

    /// Deletes finalized logs that started before `cutoff`.
    async fn delete_finalized_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn get_by_id(&self, id: &str) -> Result<SyncLog>;

    /// Logs of an integration, newest first.
    fn list_for_integration(&self, integration_id: &str, filter: &SyncLogFilter)
        -> Result<Vec<SyncLog>>;

    /// Logs of every integration started at or after `since`.
    fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<SyncLog>>;
}
