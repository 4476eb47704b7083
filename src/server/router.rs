//! Router and server loop
//!
//! - `/$status` - 200 while running, 503 once stopping
//! - `/stream` - endless chunked `ABCD` stream
//! - `/stop` - begin the stop sequence
//! - `/metrics` - Prometheus metrics in text format
//! - everything else - the informational page

use super::health::{status, HealthState};
use super::metrics::SharedMetrics;
use super::shutdown::{Latch, LatchTrigger};
use super::stream::stream;
use axum::{
    extract::{FromRef, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, info_span};

const INDEX_PAGE: &str = r#"<html>
    <head><title>drainwatch</title></head>
    <body>
        <p><a href="/stop">Stop</a></p>
    </body>
</html>
"#;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub health: HealthState,
    pub metrics: SharedMetrics,
    /// Fired by `/stop`
    pub stop: Arc<LatchTrigger>,
    /// Ends open streams and drains the server
    pub server_shutdown: Latch,
    pub stream_chunk_interval: Duration,
}

impl FromRef<AppState> for HealthState {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Stop handler
///
/// Returns as soon as the stop latch has fired. The drain itself runs on
/// the lifecycle side.
async fn stop(State(state): State<AppState>) -> &'static str {
    info_span!("stop_request").in_scope(|| {
        info!("Before stop");
        state.stop.fire();
        info!("After stop");
    });
    "Stopping\n"
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Build the router for every endpoint
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/$status", get(status))
        .route("/stream", get(stream))
        .route("/stop", get(stop))
        .route("/metrics", get(metrics))
        .route("/", get(index))
        .fallback(index)
        .with_state(state)
}

/// Serve the router on an already bound listener
///
/// Runs until the server latch fires and every open connection has
/// drained. Open streams end on the same latch, so draining does not hang
/// on them.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    let mut server_shutdown = state.server_shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Server listening (HTTP)");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await
}
