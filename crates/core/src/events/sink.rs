//! Event publisher trait and implementations.

use std::sync::{Arc, Mutex};

use super::{Event, Topic};

/// Trait for publishing events to real-time subscribers.
///
/// # Design Rules
///
/// - `publish()` must be fast and non-blocking (enqueue only)
/// - Failure to publish must not affect the publisher (best-effort)
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: Event, topic: Topic);
}

/// No-op implementation for contexts that don't need events.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

impl EventPublisher for NoOpEventPublisher {
    fn publish(&self, _event: Event, _topic: Topic) {}
}

/// Mock publisher for testing - collects published events.
#[derive(Clone, Default)]
pub struct MockEventPublisher {
    events: Arc<Mutex<Vec<(Event, Topic)>>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events with their topics.
    pub fn events(&self) -> Vec<(Event, Topic)> {
        self.events.lock().unwrap().clone()
    }

    /// Returns collected events of one type.
    pub fn of_type(&self, event_type: super::EventType) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event, _)| event.event_type == event_type)
            .map(|(event, _)| event.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

impl EventPublisher for MockEventPublisher {
    fn publish(&self, event: Event, topic: Topic) {
        self.events.lock().unwrap().push((event, topic));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::json;

    #[test]
    fn test_mock_publisher_collects_events() {
        let publisher = MockEventPublisher::new();
        assert!(publisher.is_empty());

        publisher.publish(Event::new(EventType::SyncStarted, json!({})), Topic::SyncUpdates);
        publisher.publish(Event::ping(), Topic::All);
        assert_eq!(publisher.len(), 2);
        assert_eq!(publisher.of_type(EventType::Ping).len(), 1);
        assert_eq!(publisher.events()[0].1, Topic::SyncUpdates);

        publisher.clear();
        assert!(publisher.is_empty());
    }
}
