//! WebSocket endpoint for real-time sync events.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tradeos_core::events::{parse_topics, BroadcastStats, ChannelSink, Topic};

use crate::main_lib::AppState;

/// Events buffered per connection before it counts as too slow and is
/// dropped.
const OUTBOUND_BUFFER: usize = 256;

const DEFAULT_TOPICS: [Topic; 2] = [Topic::SyncUpdates, Topic::ProductUpdates];

#[derive(Deserialize, Debug, Default)]
pub struct WsQuery {
    /// Comma-separated channel names.
    pub channels: Option<String>,
}

fn requested_topics(query: &WsQuery) -> Vec<Topic> {
    let names: Vec<String> = query
        .channels
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let topics = parse_topics(&names);
    if topics.is_empty() {
        DEFAULT_TOPICS.to_vec()
    } else {
        topics
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let topics = requested_topics(&query);
    ws.on_upgrade(move |socket| handle_socket(socket, state, topics))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, topics: Vec<Topic>) {
    let (sink, mut outbound) = ChannelSink::channel(OUTBOUND_BUFFER);
    let Some(id) = state.broadcaster.connect(Arc::new(sink), &topics, None) else {
        return;
    };
    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Cannot encode event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = state.broadcaster.handle_client_message(&id, text.as_str()) {
                        state.broadcaster.send_to(&id, &reply);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => state.broadcaster.touch(&id),
                Some(Err(e)) => {
                    tracing::debug!("WebSocket {} read error: {}", id, e);
                    break;
                }
            },
        }
    }

    // Dropping the registry entry drops its sink, which ends the writer.
    state.broadcaster.disconnect(&id);
    if let Err(e) = writer.await {
        tracing::debug!("WebSocket {} writer ended abnormally: {}", id, e);
    }
}

async fn ws_stats(State(state): State<Arc<AppState>>) -> Json<BroadcastStats> {
    Json(state.broadcaster.stats())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/ws/stats", get(ws_stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics_when_none_requested() {
        assert_eq!(requested_topics(&WsQuery::default()), DEFAULT_TOPICS.to_vec());
        let unknown = WsQuery {
            channels: Some("bogus".to_string()),
        };
        assert_eq!(requested_topics(&unknown), DEFAULT_TOPICS.to_vec());
    }

    #[test]
    fn test_requested_topics_accept_both_spellings() {
        let query = WsQuery {
            channels: Some("sync_updates, order-updates".to_string()),
        };
        assert_eq!(
            requested_topics(&query),
            vec![Topic::SyncUpdates, Topic::OrderUpdates]
        );
    }
}
