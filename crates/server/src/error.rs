//! Server-level error type (spec.md §7's teardown path surfaced at the HTTP
//! boundary). Mirrors the teacher's `ServerError` shape in `server/lib.rs`.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::WebSocket(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
