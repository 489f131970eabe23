//! Voice agent server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_agent_config::load_settings;
use voice_agent_server::log_layer::SessionLogLayer;
use voice_agent_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("VOICE_AGENT_CONFIG").ok();
    let settings = match load_settings(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Warning: failed to load config: {err}. Using defaults.");
            Default::default()
        }
    };

    let state = AppState::new(settings);
    init_tracing(state.log_registry.clone());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice agent server");

    let addr: SocketAddr = state.settings.server.bind_addr.parse()?;
    let app = create_router(state);

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn init_tracing(log_registry: Arc<voice_agent_server::log_layer::SessionLogRegistry>) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voice_agent=info,tower_http=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(SessionLogLayer::new(log_registry))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
