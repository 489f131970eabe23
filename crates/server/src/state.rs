//! Process-wide shared state handed to every WebSocket connection (spec.md
//! §5 "shared resources"). Grounded on the teacher's `server/src/state.rs`
//! `AppState`, trimmed of everything this spec doesn't need — no RAG,
//! tools, persistence, or domain config, since sessions here are in-memory
//! only and scoped to one process.

use std::sync::Arc;

use voice_agent_agent::GuardrailFilter;
use voice_agent_clients::ClientsBundle;
use voice_agent_config::Settings;

use crate::log_layer::SessionLogRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub clients: Arc<ClientsBundle>,
    pub guardrail: Arc<GuardrailFilter>,
    pub log_registry: Arc<SessionLogRegistry>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let clients = ClientsBundle::from_config(&settings.clients);
        let guardrail = GuardrailFilter::new(settings.clients.guardrail_enabled, clients.moderation.clone());
        Self {
            settings: Arc::new(settings),
            clients: Arc::new(clients),
            guardrail: Arc::new(guardrail),
            log_registry: Arc::new(SessionLogRegistry::default()),
        }
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        self.log_registry.session_ids()
    }
}
