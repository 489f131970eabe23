//! Coalescing outbound sender: drains a session's event queue and flushes a
//! batch to the WebSocket at most every `coalesce` window, so a turn's many
//! small events (token deltas, TTS chunks) go out as one frame instead of
//! one send per event. Grounded on `streaming/server.py`'s `_sender_loop`.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use voice_agent_core::OutboundEvent;

pub async fn run(mut sender: SplitSink<WebSocket, Message>, mut events: mpsc::Receiver<OutboundEvent>, coalesce: Duration) {
    let mut batch = Vec::new();

    loop {
        let deadline = Instant::now() + coalesce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, events.recv()).await {
                Ok(Some(event)) => batch.push(event),
                Ok(None) => {
                    flush(&mut sender, &mut batch).await;
                    return;
                }
                Err(_) => break,
            }
        }

        if !flush(&mut sender, &mut batch).await {
            // drain whatever is left so a disconnect doesn't silently drop events
            while let Ok(event) = events.try_recv() {
                batch.push(event);
            }
            let _ = flush(&mut sender, &mut batch).await;
            return;
        }
    }
}

async fn flush(sender: &mut SplitSink<WebSocket, Message>, batch: &mut Vec<OutboundEvent>) -> bool {
    if batch.is_empty() {
        return true;
    }
    let payload = if batch.len() == 1 {
        serde_json::to_string(&batch[0])
    } else {
        serde_json::to_string(&batch)
    };
    batch.clear();
    match payload {
        Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize outbound batch");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event_serializes_as_a_bare_object() {
        let event = OutboundEvent::Pong {};
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with('{'));
        assert!(!json.starts_with('['));
    }

    #[test]
    fn multiple_events_serialize_as_an_array() {
        let batch = vec![OutboundEvent::Pong {}, OutboundEvent::TtsDone { turn_id: 1 }];
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.starts_with('['));
    }
}
