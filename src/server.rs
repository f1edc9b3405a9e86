//! HTTP control surface
//!
//! Small axum app over the connection handle. Everything here is stateless:
//! handlers read session state or trigger a single send.

use crate::connection::ConnectionHandle;
use crate::error::Result;
use crate::handlers;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

/// Per-request timeout; generous next to the sends it wraps
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub connection: ConnectionHandle,
}

pub fn build_app(connection: ConnectionHandle) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/qr", get(handlers::qr))
        .route("/status", get(handlers::status))
        .route("/send", post(handlers::send))
        .route("/schedule", post(handlers::schedule))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(AppState { connection })
}

/// Bind and serve the control surface until the process exits
pub async fn run(connection: ConnectionHandle, addr: &str) -> Result<()> {
    let app = build_app(connection);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Control surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}
