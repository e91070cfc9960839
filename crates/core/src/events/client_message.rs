//! Messages sent by subscribers over their connection.

use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Broadcaster, Event, Topic};

/// A parsed subscriber message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default)]
        channels: Vec<String>,
    },
    Unsubscribe {
        #[serde(default)]
        channels: Vec<String>,
    },
    Pong,
    GetStats,
}

/// Resolves channel names, dropping unknown ones.
pub fn parse_topics(channels: &[String]) -> Vec<Topic> {
    channels
        .iter()
        .filter_map(|name| {
            let topic = Topic::parse(name);
            if topic.is_none() {
                debug!("Ignoring unknown channel '{}'", name);
            }
            topic
        })
        .collect()
}

impl Broadcaster {
    /// Handles one raw message from a subscriber and returns the reply to
    /// send back to it, if any.
    pub fn handle_client_message(&self, id: &str, raw: &str) -> Option<Event> {
        self.record_received();
        self.touch(id);

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Some(Event::system_notification(json!({ "error": "Invalid JSON" }))),
        };
        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let message = match serde_json::from_value::<ClientMessage>(value) {
            Ok(message) => message,
            Err(_) => {
                return Some(Event::system_notification(json!({
                    "error": format!("Unknown message type: {}", message_type),
                })))
            }
        };

        match message {
            ClientMessage::Subscribe { channels } => {
                let current = self.subscribe(id, &parse_topics(&channels))?;
                Some(acknowledgement("Subscribed to channels", &channels, &current))
            }
            ClientMessage::Unsubscribe { channels } => {
                let current = self.unsubscribe(id, &parse_topics(&channels))?;
                Some(acknowledgement("Unsubscribed from channels", &channels, &current))
            }
            ClientMessage::Pong => None,
            ClientMessage::GetStats => Some(Event::system_notification(json!({
                "stats": self.stats(),
            }))),
        }
    }
}

fn acknowledgement(verb: &str, requested: &[String], current: &[Topic]) -> Event {
    let current: Vec<&str> = current.iter().map(Topic::as_str).collect();
    Event::system_notification(json!({
        "message": format!("{}: {}", verb, requested.join(", ")),
        "current_channels": current,
    }))
}
