//! Router, listener and HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::websocket::ws_handler;

/// Errors starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The hub; handlers use its query methods and post via its handle.
    pub hub: Arc<Hub>,
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// Handle returned by [`start`] — keeps the serve task alive.
pub struct ServerHandle {
    /// The bound address (useful with port 0).
    pub addr: SocketAddr,
    _server: tokio::task::JoinHandle<()>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind the listener and start serving. The hub event loop must already
/// be running (see [`Hub::run`]).
pub async fn start(config: ServerConfig, hub: Arc<Hub>) -> Result<ServerHandle, ServerError> {
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    let addr = listener.local_addr().map_err(|source| ServerError::Bind {
        addr: bind_addr,
        source,
    })?;

    let state = AppState {
        hub,
        config: Arc::new(config),
        start_time: Instant::now(),
    };
    let router = build_router(state);

    info!(%addr, "relay server listening");
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        addr,
        _server: server,
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.hub.client_count(),
        state.hub.connected_names(),
    );
    Json(resp)
}
