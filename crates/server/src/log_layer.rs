//! Forwards `WARN`/`ERROR` tracing records to every active session's
//! outbound queue as a `log` event (spec.md §6). No teacher file does this
//! exact thing — it's the idiomatic `tracing::Layer` realization of the
//! Python server's `_WSLogHandler`, kept intentionally minimal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use voice_agent_core::OutboundEvent;

#[derive(Default)]
pub struct SessionLogRegistry {
    senders: RwLock<HashMap<String, mpsc::Sender<OutboundEvent>>>,
}

impl SessionLogRegistry {
    pub fn register(&self, session_id: impl Into<String>, sender: mpsc::Sender<OutboundEvent>) {
        self.senders.write().insert(session_id.into(), sender);
    }

    pub fn unregister(&self, session_id: &str) {
        self.senders.write().remove(session_id);
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.senders.read().keys().cloned().collect()
    }

    fn broadcast(&self, event: OutboundEvent) {
        for sender in self.senders.read().values() {
            let _ = sender.try_send(event.clone());
        }
    }
}

pub struct SessionLogLayer {
    registry: Arc<SessionLogRegistry>,
}

impl SessionLogLayer {
    pub fn new(registry: Arc<SessionLogRegistry>) -> Self {
        Self { registry }
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for SessionLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() > Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.registry.broadcast(OutboundEvent::Log {
            level: event.metadata().level().to_string(),
            logger: event.metadata().target().to_string(),
            message: visitor.0,
            ts: Utc::now().to_rfc3339(),
        });
    }
}
