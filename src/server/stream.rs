//! `/stream` endpoint
//!
//! Writes `ABCD` immediately and then once per chunk interval until the
//! client goes away or the server latch fires.

use super::metrics::SharedMetrics;
use super::router::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::IntoResponse,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, Span};

/// Payload of every chunk
pub const CHUNK: &[u8; 4] = b"ABCD";

/// Why a streaming response ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server latch fired and the body finished cleanly
    ServerShutdown,
    /// Hyper dropped the body: the client went away or a write failed
    ClientGone,
}

impl StreamEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamEnd::ServerShutdown => "server_shutdown",
            StreamEnd::ClientGone => "client_gone",
        }
    }
}

/// Logs the end of a streaming response when the body is dropped
///
/// Hyper drops the body on client disconnect, on write failure, and after
/// the stream ends, so this covers every way out of the write loop.
/// `server_shutdown` is set by the latch future before the body finishes.
struct ResponseScope {
    span: Span,
    sent: u64,
    server_shutdown: Arc<AtomicBool>,
    metrics: SharedMetrics,
}

impl Drop for ResponseScope {
    fn drop(&mut self) {
        let end = if self.server_shutdown.load(Ordering::SeqCst) {
            StreamEnd::ServerShutdown
        } else {
            StreamEnd::ClientGone
        };
        self.metrics.record_stream_end(end.as_str());
        self.span.in_scope(|| {
            info!(
                chunks = self.sent,
                reason = end.as_str(),
                "End streaming response"
            )
        });
    }
}

/// Streaming response handler
///
/// The body is handed to hyper chunk by chunk with no buffering in between,
/// so each `ABCD` reaches the wire as soon as it is produced.
pub async fn stream(State(state): State<AppState>) -> impl IntoResponse {
    let span = info_span!("stream_response");
    span.in_scope(|| info!("Begin streaming response"));

    let interval = state.stream_chunk_interval;
    let mut server_shutdown = state.server_shutdown.clone();

    let ended_by_server = Arc::new(AtomicBool::new(false));
    let scope = ResponseScope {
        span,
        sent: 0,
        server_shutdown: ended_by_server.clone(),
        metrics: state.metrics.clone(),
    };
    let chunks = futures::stream::unfold(scope, move |mut scope| {
        async move {
            if scope.sent > 0 {
                tokio::time::sleep(interval).await;
            }
            scope
                .span
                .in_scope(|| info!(count = CHUNK.len(), "Sending bytes"));
            scope.metrics.record_chunk_sent();
            scope.sent += 1;
            Some((Ok::<_, Infallible>(Bytes::from_static(CHUNK)), scope))
        }
    })
    .take_until(async move {
        server_shutdown.wait().await;
        ended_by_server.store(true, Ordering::SeqCst);
    });

    (
        [
            (CACHE_CONTROL, "no-cache"),
            (CONTENT_TYPE, "application/octet-stream"),
        ],
        Body::from_stream(chunks),
    )
}
