//! Shared helpers for tests that need a live server

#![allow(clippy::expect_used)]

use crate::config::{Config, StallPlans};
use crate::lifecycle::StallPlan;
use crate::server::{create_metrics, latch, serve, AppState, HealthState, Latch, LatchTrigger, SharedMetrics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server running on an ephemeral loopback port
pub(crate) struct TestApp {
    pub addr: SocketAddr,
    pub health: HealthState,
    pub metrics: SharedMetrics,
    pub stop: Latch,
    pub server_trigger: LatchTrigger,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestApp {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

/// Start the full router with the given `/stream` chunk interval
pub(crate) async fn spawn_app(stream_chunk_interval: Duration) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");

    let health = HealthState::new();
    let metrics = create_metrics().expect("metrics registry");
    let (stop_trigger, stop) = latch("stop");
    let (server_trigger, server_shutdown) = latch("server");

    let state = AppState {
        health: health.clone(),
        metrics: metrics.clone(),
        stop: Arc::new(stop_trigger),
        server_shutdown,
        stream_chunk_interval,
    };
    let handle = tokio::spawn(serve(listener, state));

    TestApp {
        addr,
        health,
        metrics,
        stop,
        server_trigger,
        handle,
    }
}

/// Base URL of a loopback port nothing is listening on
pub(crate) async fn dead_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe listener address");
    drop(listener);
    format!("http://{}", addr)
}

/// Configuration with every delay shrunk to test scale
pub(crate) fn fast_config(base_url: &str) -> Config {
    Config {
        base_url: base_url.to_string(),
        ping_interval: Duration::from_millis(100),
        stream_chunk_interval: Duration::from_millis(50),
        stalls: StallPlans {
            started: StallPlan::new(2, Duration::from_millis(20)),
            stopping: StallPlan::new(4, Duration::from_millis(50)),
            stopped: StallPlan::new(2, Duration::from_millis(20)),
        },
        probe_timeout: Some(Duration::from_secs(2)),
        ..Config::default()
    }
}
