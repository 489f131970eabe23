//! HTTP surface: health/debug endpoints plus the `/ws/:session_id` upgrade
//! route. Grounded on the teacher's `create_router`, trimmed to the routes
//! this spec actually needs (no REST chat/tools/domain-config endpoints) and
//! with CORS simplified to a permissive layer, matching the original
//! Python's `allow_origins=["*"]` rather than the teacher's configurable
//! `build_cors_layer`.

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::ws_handler;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(Serialize)]
struct SessionsResponse {
    active_sessions: Vec<String>,
}

async fn sessions(state: axum::extract::State<AppState>) -> Json<SessionsResponse> {
    Json(SessionsResponse { active_sessions: state.active_session_ids() })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(sessions))
        .route("/ws/:session_id", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
