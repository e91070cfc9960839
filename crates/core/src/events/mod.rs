//! Real-time events: envelope, topics, publisher seam and the broadcaster.

mod broadcaster;
mod client_message;
mod event_model;
mod sink;

pub use broadcaster::{
    BroadcastStats, Broadcaster, ChannelSink, DeliveryError, SubscriberInfo, SubscriberSink,
};
pub use client_message::{parse_topics, ClientMessage};
pub use event_model::{Event, EventType, Topic};
pub use sink::{EventPublisher, MockEventPublisher, NoOpEventPublisher};
