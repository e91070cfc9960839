//! Event emission for one integration's run.

use serde_json::{json, Value};
use std::sync::Arc;

use super::sync_log_model::{EntityType, SyncCounters, SyncType};
use crate::catalog::{AppliedChange, ChangeAction, StockKey};
use crate::errors::ErrorKind;
use crate::events::{Event, EventPublisher, EventType, Topic};

/// Everything an event of one run carries to identify it.
#[derive(Clone)]
pub struct RunContext {
    pub task_id: String,
    pub integration_id: String,
    pub integration_name: String,
    pub entity_type: EntityType,
    pub sync_type: SyncType,
    pub sync_log_id: String,
    publisher: Arc<dyn EventPublisher>,
}

impl RunContext {
    pub fn new(
        task_id: impl Into<String>,
        integration_id: impl Into<String>,
        integration_name: impl Into<String>,
        entity_type: EntityType,
        sync_type: SyncType,
        sync_log_id: impl Into<String>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            integration_id: integration_id.into(),
            integration_name: integration_name.into(),
            entity_type,
            sync_type,
            sync_log_id: sync_log_id.into(),
            publisher,
        }
    }

    pub fn started(&self) {
        self.sync_event(
            EventType::SyncStarted,
            json!({
                "task_id": self.task_id,
                "integration_id": self.integration_id,
                "integration_name": self.integration_name,
                "entity_type": self.entity_type,
                "sync_type": self.sync_type,
                "sync_log_id": self.sync_log_id,
            }),
        );
    }

    pub fn progress(&self, counters: &SyncCounters, expected_total: Option<i64>, page: usize) {
        self.sync_event(
            EventType::SyncProgress,
            json!({
                "task_id": self.task_id,
                "integration_id": self.integration_id,
                "entity_type": self.entity_type,
                "sync_log_id": self.sync_log_id,
                "page": page,
                "processed": counters.processed,
                "created": counters.created,
                "updated": counters.updated,
                "failed": counters.failed,
                "total": expected_total,
            }),
        );
    }

    pub fn completed(&self, counters: &SyncCounters, error: Option<String>, duration_secs: f64) {
        self.sync_event(
            EventType::SyncCompleted,
            json!({
                "task_id": self.task_id,
                "integration_id": self.integration_id,
                "entity_type": self.entity_type,
                "sync_log_id": self.sync_log_id,
                "status": "completed",
                "processed": counters.processed,
                "created": counters.created,
                "updated": counters.updated,
                "failed": counters.failed,
                "error": error,
                "duration": duration_secs,
                "completed_at": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn failed(&self, error: &str, kind: ErrorKind, counters: &SyncCounters) {
        self.sync_event(
            EventType::SyncError,
            json!({
                "task_id": self.task_id,
                "integration_id": self.integration_id,
                "entity_type": self.entity_type,
                "sync_log_id": self.sync_log_id,
                "error": error,
                "error_kind": kind,
                "processed": counters.processed,
                "failed": counters.failed,
            }),
        );
    }

    pub fn product_updated(&self, change: &AppliedChange<String>, name: &str) {
        self.record_event(
            "product",
            change.action,
            json!({
                "product_id": change.record_id,
                "external_id": change.key,
                "name": name,
                "sync_version": change.sync_version,
            }),
        );
    }

    pub fn stock_updated(&self, change: &AppliedChange<StockKey>) {
        self.record_event(
            "stock",
            change.action,
            json!({
                "stock_id": change.record_id,
                "product_external_id": change.key.product_external_id,
                "warehouse_id": change.key.warehouse_id,
                "sync_version": change.sync_version,
            }),
        );
    }

    fn record_event(&self, entity: &str, action: ChangeAction, mut data: Value) {
        if let Some(object) = data.as_object_mut() {
            object.insert("entity".to_string(), json!(entity));
            object.insert("action".to_string(), json!(action));
            object.insert("integration_id".to_string(), json!(self.integration_id));
            object.insert("task_id".to_string(), json!(self.task_id));
        }
        self.publisher
            .publish(Event::new(EventType::RecordUpdated, data), Topic::ProductUpdates);
    }

    fn sync_event(&self, event_type: EventType, data: Value) {
        self.publisher
            .publish(Event::new(event_type, data), Topic::SyncUpdates);
    }
}

/// Publishes a run-level outcome that has no integration attached, such as
/// "nothing to sync".
pub fn publish_skipped(
    publisher: &dyn EventPublisher,
    task_id: &str,
    entity_type: EntityType,
    reason: &str,
) {
    publisher.publish(
        Event::new(
            EventType::SyncCompleted,
            json!({
                "task_id": task_id,
                "entity_type": entity_type,
                "status": "skipped",
                "processed": 0,
                "created": 0,
                "updated": 0,
                "failed": 0,
                "error": reason,
                "completed_at": chrono::Utc::now().to_rfc3339(),
            }),
        ),
        Topic::SyncUpdates,
    );
}
