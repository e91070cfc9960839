//! Real-time event envelope and topics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Type tag carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    SyncStarted,
    SyncProgress,
    SyncCompleted,
    SyncError,
    RecordUpdated,
    SystemNotification,
    Ping,
}

/// Delivery topic ("channel").
///
/// Publishing to [`Topic::All`] reaches every connection; subscribers of
/// `all` also receive events published to any other topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    #[serde(alias = "sync_updates")]
    SyncUpdates,
    #[serde(alias = "product_updates")]
    ProductUpdates,
    #[serde(alias = "order_updates")]
    OrderUpdates,
    #[serde(alias = "system_notifications")]
    SystemNotifications,
    All,
}

impl Topic {
    pub const ALL_TOPICS: [Topic; 5] = [
        Topic::SyncUpdates,
        Topic::ProductUpdates,
        Topic::OrderUpdates,
        Topic::SystemNotifications,
        Topic::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SyncUpdates => "sync-updates",
            Topic::ProductUpdates => "product-updates",
            Topic::OrderUpdates => "order-updates",
            Topic::SystemNotifications => "system-notifications",
            Topic::All => "all",
        }
    }

    /// Parses a topic name; both `sync-updates` and `sync_updates` forms
    /// are accepted.
    pub fn parse(name: &str) -> Option<Topic> {
        let normalized = name.trim().replace('_', "-");
        Topic::ALL_TOPICS
            .into_iter()
            .find(|topic| topic.as_str() == normalized)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivered to real-time subscribers. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
}

impl Event {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
            message_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn system_notification(data: Value) -> Self {
        Self::new(EventType::SystemNotification, data)
    }

    pub fn ping() -> Self {
        Self::new(EventType::Ping, json!({ "timestamp": Utc::now().to_rfc3339() }))
    }
}
