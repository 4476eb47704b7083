//! Ping worker and its wake signal

use super::probe::Prober;
use crate::server::HealthState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

/// How a wait on the wake signal ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Signaled,
    TimedOut,
}

/// Single-slot, auto-reset wake signal
///
/// Wakes sent while nobody waits collapse into one stored permit; the next
/// wait consumes it and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Wait for a wake, or until `timeout` elapses
    pub async fn wait(&self, timeout: Duration) -> Wake {
        match tokio::time::timeout(timeout, self.notify.notified()).await {
            Ok(()) => Wake::Signaled,
            Err(_) => Wake::TimedOut,
        }
    }
}

/// Probe, wait up to `interval` (or until woken), repeat until disposed
///
/// Probe failures are logged and never end the loop. Disposal is checked
/// before every probe, so no probe starts after it is observed. Returns the
/// number of probes issued.
pub async fn run_ping_worker(
    prober: Prober,
    health: HealthState,
    wake: WakeSignal,
    interval: Duration,
) -> u64 {
    info!("Ping worker started");
    let mut probes = 0;

    while !health.is_disposed() {
        probes += 1;
        if let Err(e) = prober.probe().await {
            warn!(error = %e, "Caught probe error");
        }
        wake.wait(interval).await;
    }

    info!(probes, "Ping worker exiting");
    probes
}
