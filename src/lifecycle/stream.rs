//! Stream worker: one long GET against `/stream`, body copied into a
//! write-only logging sink
//!
//! Fire-once. When the body ends or fails the worker is done; it does not
//! reconnect.

use crate::server::{HealthState, SharedMetrics};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("stream body failed: {0}")]
    Body(#[source] reqwest::Error),

    #[error("stream sink failed: {0}")]
    Sink(#[source] io::Error),
}

/// Write-only sink that logs and counts what it receives
///
/// Only `AsyncWrite` is implemented; there is no way to read, seek or
/// resize it.
pub struct LoggingSink {
    position: u64,
    metrics: Option<SharedMetrics>,
}

impl LoggingSink {
    pub fn new(metrics: Option<SharedMetrics>) -> Self {
        Self {
            position: 0,
            metrics,
        }
    }

    /// Total bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl AsyncWrite for LoggingSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        info!(count = buf.len(), "Stream received bytes");
        this.position += buf.len() as u64;
        if let Some(metrics) = &this.metrics {
            metrics.record_bytes_received(buf.len());
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        info!(bytes = self.position, "Stream close called");
        Poll::Ready(Ok(()))
    }
}

/// Issue the GET and copy its body into `sink` until the body completes
///
/// `send` resolves once headers arrive; the body is then read chunk by
/// chunk as the server produces it. Returns total bytes copied.
pub async fn consume_stream(
    client: &reqwest::Client,
    url: &str,
    sink: &mut LoggingSink,
) -> Result<u64, StreamError> {
    let mut response = client.get(url).send().await.map_err(StreamError::Request)?;
    info!(status = %response.status(), "Stream headers received");

    while let Some(chunk) = response.chunk().await.map_err(StreamError::Body)? {
        sink.write_all(&chunk).await.map_err(StreamError::Sink)?;
    }
    sink.shutdown().await.map_err(StreamError::Sink)?;

    Ok(sink.position())
}

/// Run the stream consumer once
///
/// Gives up the read as soon as the service is disposed. Errors are logged
/// and end the worker. Returns total bytes received.
pub async fn run_stream_worker(
    client: reqwest::Client,
    url: String,
    health: HealthState,
    metrics: SharedMetrics,
) -> u64 {
    info!("Begin streaming request");
    // Subscribe before checking, so a disposal in between is still seen
    let mut disposal = health.disposal();
    if disposal.is_fired() {
        info!("End streaming request");
        return 0;
    }

    let mut sink = LoggingSink::new(Some(metrics));

    let outcome = tokio::select! {
        biased;
        _ = disposal.wait() => None,
        result = consume_stream(&client, &url, &mut sink) => Some(result),
    };

    match outcome {
        Some(Ok(bytes)) => info!(bytes, "Stream completed"),
        Some(Err(e)) => warn!(error = %e, "Caught stream error"),
        None => info!("Stream abandoned on disposal"),
    }
    info!(bytes = sink.position(), "End streaming request");
    sink.position()
}
