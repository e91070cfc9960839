//! Fan-out hub for real-time subscribers.
//!
//! Producers enqueue `(event, topic)` pairs on an unbounded queue and return
//! immediately. A single dispatcher task drains the queue in FIFO order and
//! hands each event to every subscriber of the topic (and of `all`). A
//! subscriber whose delivery fails is dropped from every registry; the other
//! deliveries of the same dispatch are unaffected.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::sink::EventPublisher;
use super::{Event, Topic};

/// Why a delivery to one subscriber failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber connection closed")]
    Closed,
    #[error("subscriber is not keeping up")]
    Full,
}

/// Receiving end of one subscriber connection.
///
/// `deliver` must not block; a connection that cannot take the event right
/// now reports [`DeliveryError::Full`] and is dropped.
pub trait SubscriberSink: Send + Sync {
    fn deliver(&self, event: &Event) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded mpsc channel, drained by the connection's writer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl SubscriberSink for ChannelSink {
    fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Process-wide connection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStats {
    pub total_connections: u64,
    pub current_connections: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub errors: u64,
    pub active_by_channel: BTreeMap<String, usize>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of one connected subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub id: String,
    pub topics: Vec<Topic>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub identity: Option<Value>,
}

struct Subscriber {
    sink: Arc<dyn SubscriberSink>,
    topics: BTreeSet<Topic>,
    connected_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    identity: Option<Value>,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<String, Subscriber>,
    by_topic: HashMap<Topic, HashSet<String>>,
}

impl Registry {
    fn recipients(&self, topic: Topic) -> Vec<(String, Arc<dyn SubscriberSink>)> {
        let ids: BTreeSet<&String> = if topic == Topic::All {
            self.subscribers.keys().collect()
        } else {
            [topic, Topic::All]
                .iter()
                .filter_map(|t| self.by_topic.get(t))
                .flatten()
                .collect()
        };

        ids.into_iter()
            .filter_map(|id| {
                self.subscribers
                    .get(id)
                    .map(|s| (id.clone(), Arc::clone(&s.sink)))
            })
            .collect()
    }

    fn add_topics(&mut self, id: &str, topics: &[Topic]) -> Option<Vec<Topic>> {
        let subscriber = self.subscribers.get_mut(id)?;
        for topic in topics {
            subscriber.topics.insert(*topic);
            self.by_topic
                .entry(*topic)
                .or_default()
                .insert(id.to_string());
        }
        Some(subscriber.topics.iter().copied().collect())
    }

    fn remove_topics(&mut self, id: &str, topics: &[Topic]) -> Option<Vec<Topic>> {
        let subscriber = self.subscribers.get_mut(id)?;
        for topic in topics {
            subscriber.topics.remove(topic);
            if let Some(members) = self.by_topic.get_mut(topic) {
                members.remove(id);
            }
        }
        Some(subscriber.topics.iter().copied().collect())
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(subscriber) = self.subscribers.remove(id) else {
            return false;
        };
        for topic in subscriber.topics {
            if let Some(members) = self.by_topic.get_mut(&topic) {
                members.remove(id);
            }
        }
        true
    }
}

#[derive(Default)]
struct Counters {
    total_connections: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
}

struct Inner {
    queue: mpsc::UnboundedSender<(Event, Topic)>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<(Event, Topic)>>>,
    registry: RwLock<Registry>,
    counters: Counters,
}

/// Explicitly constructed pub/sub hub. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                queue,
                receiver: Mutex::new(Some(receiver)),
                registry: RwLock::new(Registry::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Spawns the dispatcher. Returns `None` if it was already started.
    ///
    /// The dispatcher stops when `shutdown` is cancelled; events still queued
    /// at that point are dropped.
    pub fn start(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let receiver = self
            .inner
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut receiver) = receiver else {
            warn!("Event broadcaster already started");
            return None;
        };

        let this = self.clone();
        Some(tokio::spawn(async move {
            info!("Event broadcaster started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = receiver.recv() => match next {
                        Some((event, topic)) => this.dispatch(&event, topic),
                        None => break,
                    },
                }
            }
            info!("Event broadcaster stopped");
        }))
    }

    /// Publishes to a topic given by name. Unknown names are ignored.
    pub fn publish_to(&self, event: Event, channel: &str) {
        match Topic::parse(channel) {
            Some(topic) => self.publish(event, topic),
            None => warn!("Unknown channel '{}', event dropped", channel),
        }
    }

    /// Registers a subscriber and sends it a welcome event.
    ///
    /// Returns the connection id, or `None` if the welcome could not be
    /// delivered (the subscriber is not kept).
    pub fn connect(
        &self,
        sink: Arc<dyn SubscriberSink>,
        topics: &[Topic],
        identity: Option<Value>,
    ) -> Option<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        {
            let mut registry = self.write_registry();
            registry.subscribers.insert(
                id.clone(),
                Subscriber {
                    sink,
                    topics: BTreeSet::new(),
                    connected_at: now,
                    last_activity: now,
                    identity,
                },
            );
            registry.add_topics(&id, topics);
        }
        self.inner
            .counters
            .total_connections
            .fetch_add(1, Ordering::Relaxed);
        info!("Subscriber {} connected on {:?}", id, topics);

        let channels: Vec<&str> = topics.iter().map(Topic::as_str).collect();
        let welcome = Event::system_notification(json!({
            "message": "Connected to TradeOS real-time updates",
            "connection_id": id,
            "channels": channels,
        }));
        if self.send_to(&id, &welcome) {
            Some(id)
        } else {
            None
        }
    }

    /// Removes a subscriber from every registry.
    pub fn disconnect(&self, id: &str) -> bool {
        let removed = self.write_registry().remove(id);
        if removed {
            info!("Subscriber {} disconnected", id);
        }
        removed
    }

    /// Adds topics to a subscriber; returns its current topic set.
    pub fn subscribe(&self, id: &str, topics: &[Topic]) -> Option<Vec<Topic>> {
        self.write_registry().add_topics(id, topics)
    }

    /// Removes topics from a subscriber; returns its current topic set.
    pub fn unsubscribe(&self, id: &str, topics: &[Topic]) -> Option<Vec<Topic>> {
        self.write_registry().remove_topics(id, topics)
    }

    pub fn subscriber(&self, id: &str) -> Option<SubscriberInfo> {
        self.read_registry().subscribers.get(id).map(|s| SubscriberInfo {
            id: id.to_string(),
            topics: s.topics.iter().copied().collect(),
            connected_at: s.connected_at,
            last_activity: s.last_activity,
            identity: s.identity.clone(),
        })
    }

    /// Refreshes a subscriber's last-activity timestamp.
    pub fn touch(&self, id: &str) {
        if let Some(subscriber) = self.write_registry().subscribers.get_mut(id) {
            subscriber.last_activity = Utc::now();
        }
    }

    pub(crate) fn record_received(&self) {
        self.inner
            .counters
            .messages_received
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Delivers one event to one subscriber, dropping it on failure.
    pub fn send_to(&self, id: &str, event: &Event) -> bool {
        let sink = self
            .read_registry()
            .subscribers
            .get(id)
            .map(|s| Arc::clone(&s.sink));
        let Some(sink) = sink else {
            return false;
        };
        self.deliver(id, sink.as_ref(), event)
    }

    /// Publishes a ping to every connection.
    pub fn ping_all(&self) {
        self.publish(Event::ping(), Topic::All);
        debug!("Queued ping for all subscribers");
    }

    pub fn stats(&self) -> BroadcastStats {
        let registry = self.read_registry();
        let mut active_by_channel: BTreeMap<String, usize> = Topic::ALL_TOPICS
            .iter()
            .map(|topic| {
                let count = registry.by_topic.get(topic).map_or(0, HashSet::len);
                (topic.as_str().to_string(), count)
            })
            .collect();
        // Publishing to `all` reaches every connection.
        active_by_channel.insert(Topic::All.as_str().to_string(), registry.subscribers.len());

        let counters = &self.inner.counters;
        BroadcastStats {
            total_connections: counters.total_connections.load(Ordering::Relaxed),
            current_connections: registry.subscribers.len() as u64,
            messages_sent: counters.messages_sent.load(Ordering::Relaxed),
            messages_received: counters.messages_received.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            active_by_channel,
            timestamp: Utc::now(),
        }
    }

    fn dispatch(&self, event: &Event, topic: Topic) {
        let recipients = self.read_registry().recipients(topic);
        for (id, sink) in recipients {
            self.deliver(&id, sink.as_ref(), event);
        }
    }

    fn deliver(&self, id: &str, sink: &dyn SubscriberSink, event: &Event) -> bool {
        match sink.deliver(event) {
            Ok(()) => {
                self.inner
                    .counters
                    .messages_sent
                    .fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!("Delivery to subscriber {} failed: {}", id, e);
                self.inner.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.disconnect(id);
                false
            }
        }
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventPublisher for Broadcaster {
    fn publish(&self, event: Event, topic: Topic) {
        if self.inner.queue.send((event, topic)).is_err() {
            debug!("Event broadcaster queue closed, dropping event");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::EventType;
    use std::time::Duration;

    /// Sink that records what it receives, or fails every delivery.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<Event>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn received(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl SubscriberSink for RecordingSink {
        fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Closed);
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Fails every delivery after the first (the welcome).
    struct FailsAfterWelcome {
        delivered: Mutex<usize>,
    }

    impl SubscriberSink for FailsAfterWelcome {
        fn deliver(&self, _event: &Event) -> Result<(), DeliveryError> {
            let mut delivered = self.delivered.lock().unwrap();
            *delivered += 1;
            if *delivered > 1 {
                Err(DeliveryError::Closed)
            } else {
                Ok(())
            }
        }
    }

    fn progress() -> Event {
        Event::new(EventType::SyncProgress, json!({"processed": 10}))
    }

    #[test]
    fn test_connect_sends_welcome() {
        let broadcaster = Broadcaster::new();
        let sink = Arc::new(RecordingSink::default());
        let id = broadcaster
            .connect(sink.clone(), &[Topic::SyncUpdates], None)
            .unwrap();

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event_type, EventType::SystemNotification);
        assert_eq!(received[0].data["connection_id"], id);
        assert_eq!(received[0].data["channels"][0], "sync-updates");

        let stats = broadcaster.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.current_connections, 1);
        assert_eq!(stats.messages_sent, 1);
    }

    #[test]
    fn test_failed_welcome_does_not_register() {
        let broadcaster = Broadcaster::new();
        let id = broadcaster.connect(Arc::new(RecordingSink::failing()), &[Topic::SyncUpdates], None);
        assert!(id.is_none());
        assert_eq!(broadcaster.stats().current_connections, 0);
        assert_eq!(broadcaster.stats().errors, 1);
    }

    #[test]
    fn test_failing_subscriber_is_isolated_and_removed() {
        let broadcaster = Broadcaster::new();
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(FailsAfterWelcome {
            delivered: Mutex::new(0),
        });
        let third = Arc::new(RecordingSink::default());

        broadcaster.connect(first.clone(), &[Topic::SyncUpdates], None).unwrap();
        let second_id = broadcaster
            .connect(second, &[Topic::SyncUpdates], None)
            .unwrap();
        broadcaster.connect(third.clone(), &[Topic::SyncUpdates], None).unwrap();

        broadcaster.dispatch(&progress(), Topic::SyncUpdates);

        assert_eq!(first.received().len(), 2);
        assert_eq!(third.received().len(), 2);
        assert_eq!(first.received()[1].event_type, EventType::SyncProgress);
        assert_eq!(third.received()[1].event_type, EventType::SyncProgress);
        assert!(broadcaster.subscriber(&second_id).is_none());

        let stats = broadcaster.stats();
        assert_eq!(stats.current_connections, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.active_by_channel["sync-updates"], 2);
    }

    #[test]
    fn test_topic_routing() {
        let broadcaster = Broadcaster::new();
        let sync = Arc::new(RecordingSink::default());
        let products = Arc::new(RecordingSink::default());
        let everything = Arc::new(RecordingSink::default());

        broadcaster.connect(sync.clone(), &[Topic::SyncUpdates], None).unwrap();
        broadcaster.connect(products.clone(), &[Topic::ProductUpdates], None).unwrap();
        broadcaster.connect(everything.clone(), &[Topic::All], None).unwrap();

        broadcaster.dispatch(&progress(), Topic::SyncUpdates);
        assert_eq!(sync.received().len(), 2);
        assert_eq!(products.received().len(), 1);
        assert_eq!(everything.received().len(), 2);

        broadcaster.dispatch(&Event::ping(), Topic::All);
        assert_eq!(sync.received().len(), 3);
        assert_eq!(products.received().len(), 2);
        assert_eq!(everything.received().len(), 3);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let broadcaster = Broadcaster::new();
        let sink = Arc::new(RecordingSink::default());
        let id = broadcaster.connect(sink.clone(), &[Topic::SyncUpdates], None).unwrap();

        let topics = broadcaster.subscribe(&id, &[Topic::ProductUpdates]).unwrap();
        assert_eq!(topics, vec![Topic::SyncUpdates, Topic::ProductUpdates]);

        let topics = broadcaster.unsubscribe(&id, &[Topic::SyncUpdates]).unwrap();
        assert_eq!(topics, vec![Topic::ProductUpdates]);

        broadcaster.dispatch(&progress(), Topic::SyncUpdates);
        assert_eq!(sink.received().len(), 1);

        assert!(broadcaster.disconnect(&id));
        assert!(!broadcaster.disconnect(&id));
        assert!(broadcaster.subscribe(&id, &[Topic::All]).is_none());
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_publish_order() {
        let broadcaster = Broadcaster::new();
        let (sink, mut rx) = ChannelSink::channel(16);
        broadcaster
            .connect(Arc::new(sink), &[Topic::SyncUpdates], None)
            .unwrap();
        let welcome = rx.recv().await.unwrap();
        assert_eq!(welcome.event_type, EventType::SystemNotification);

        // Published before the dispatcher runs; must still arrive in order.
        for n in 0..5 {
            broadcaster.publish(
                Event::new(EventType::SyncProgress, json!({ "n": n })),
                Topic::SyncUpdates,
            );
        }

        let shutdown = CancellationToken::new();
        let handle = broadcaster.start(shutdown.clone()).unwrap();
        assert!(broadcaster.start(shutdown.clone()).is_none());

        for n in 0..5 {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.data["n"], n);
        }

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_channel_drops_slow_subscriber() {
        let broadcaster = Broadcaster::new();
        let (sink, _rx) = ChannelSink::channel(1);
        // The welcome fills the only slot.
        let id = broadcaster
            .connect(Arc::new(sink), &[Topic::SyncUpdates], None)
            .unwrap();

        broadcaster.dispatch(&progress(), Topic::SyncUpdates);
        assert!(broadcaster.subscriber(&id).is_none());
    }

    #[test]
    fn test_unknown_channel_is_ignored() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish_to(progress(), "prices");
        broadcaster.publish_to(progress(), "sync_updates");
        let queued = broadcaster
            .inner
            .receiver
            .lock()
            .unwrap()
            .as_mut()
            .unwrap()
            .try_recv()
            .unwrap();
        assert_eq!(queued.1, Topic::SyncUpdates);
    }
}
