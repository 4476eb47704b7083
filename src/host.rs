//! Host: wires the server to the orchestrator and drives every phase
//!
//! Order of events:
//! 1. serve, then `on_started`
//! 2. wait for `/stop` or an OS signal
//! 3. `on_stopping` while still serving (the drain window)
//! 4. drain the server, then `on_stopped`
//! 5. `dispose`

use crate::config::Config;
use crate::lifecycle::{Disposal, LifecycleError, Orchestrator};
use crate::server::{latch, serve, AppState, HealthState, SharedMetrics};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Run the service from start to disposal
///
/// `os_signal` resolves when the process is asked to stop from outside;
/// `GET /stop` is always honoured as well. Returns once both background
/// workers have been joined.
pub async fn run<F>(
    config: &Config,
    listener: TcpListener,
    metrics: SharedMetrics,
    os_signal: F,
) -> Result<Disposal, LifecycleError>
where
    F: Future<Output = &'static str>,
{
    let health = HealthState::new();

    // `/stop` and OS signals both end the wait below
    let (stop_trigger, mut stop) = latch("stop");
    let (server_trigger, server_shutdown) = latch("server");

    let state = AppState {
        health: health.clone(),
        metrics: metrics.clone(),
        stop: Arc::new(stop_trigger),
        server_shutdown,
        stream_chunk_interval: config.stream_chunk_interval,
    };
    let server = tokio::spawn(serve(listener, state));

    let orchestrator = Orchestrator::new(config, health, metrics);
    orchestrator.on_started().await?;
    info!("Service started, waiting for stop");

    tokio::select! {
        _ = stop.wait() => info!("Stop requested over HTTP"),
        signal = os_signal => info!(signal, "Stop requested by signal"),
    }

    // Still serving, but reporting 503 for the whole drain window
    orchestrator.on_stopping().await?;

    server_trigger.fire();
    match server.await {
        Ok(Ok(())) => info!("Server drained"),
        Ok(Err(e)) => warn!(error = %e, "Server failed"),
        Err(e) => warn!(error = %e, "Server task ended abnormally"),
    }

    orchestrator.on_stopped().await?;

    let disposal = orchestrator.dispose().await;
    if let Disposal::Completed { ping, stream } = &disposal {
        info!(?ping, ?stream, "Disposed");
    }
    Ok(disposal)
}

#[cfg(test)]
#[path = "host_test.rs"]
mod tests;
