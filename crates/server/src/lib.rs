//! WebSocket/HTTP server for the voice agent: per-connection session
//! lifecycle, VAD-driven turn endpointing, and the outbound event sender.

pub mod error;
pub mod http;
pub mod inactivity;
pub mod log_layer;
pub mod sender;
pub mod session;
pub mod state;
pub mod websocket;

pub use error::ServerError;
pub use http::create_router;
pub use log_layer::{SessionLogLayer, SessionLogRegistry};
pub use session::Session;
pub use state::AppState;
