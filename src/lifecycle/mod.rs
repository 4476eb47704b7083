//! Lifecycle orchestration
//!
//! Phases run strictly in order:
//! `Created -> Started -> Stopping -> Stopped -> Disposed`.
//!
//! The host calls one method per transition. `on_started`, `on_stopping`
//! and `on_stopped` each hold their phase open with a stall; `dispose`
//! stops and joins the background workers.

mod ping;
mod probe;
mod stall;
mod stream;

pub use ping::{run_ping_worker, Wake, WakeSignal};
pub use probe::{ProbeError, ProbeReport, ProbeTarget, Prober};
pub use stall::{stall, ParsePlanError, StallPlan, StallReport};
pub use stream::{consume_stream, run_stream_worker, LoggingSink, StreamError};

use crate::config::{Config, StallPlans};
use crate::server::{HealthState, SharedMetrics};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// Lifecycle phase of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Created = 0,
    Started = 1,
    Stopping = 2,
    Stopped = 3,
    Disposed = 4,
}

impl Phase {
    fn from_u8(value: u8) -> Phase {
        match value {
            0 => Phase::Created,
            1 => Phase::Started,
            2 => Phase::Stopping,
            3 => Phase::Stopped,
            _ => Phase::Disposed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Started => "started",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
            Phase::Disposed => "disposed",
        }
    }

    /// Phase that must be current before entering `self`
    fn predecessor(self) -> Option<Phase> {
        match self {
            Phase::Created => None,
            Phase::Started => Some(Phase::Created),
            Phase::Stopping => Some(Phase::Started),
            Phase::Stopped => Some(Phase::Stopping),
            Phase::Disposed => Some(Phase::Stopped),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot enter {to} from {from}")]
    InvalidTransition { from: Phase, to: Phase },
}

/// How a background worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker was never spawned
    NotStarted,
    Finished,
    /// The task panicked or was cancelled
    Failed(String),
}

/// Result of a `dispose` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposal {
    /// This call disposed the service and joined the workers
    Completed { ping: WorkerExit, stream: WorkerExit },
    /// An earlier call already did
    AlreadyDisposed,
}

struct Workers {
    ping: JoinHandle<u64>,
    stream: JoinHandle<u64>,
}

/// Drives the lifecycle phases, the stalls, and the background workers
pub struct Orchestrator {
    health: HealthState,
    metrics: SharedMetrics,
    prober: Prober,
    wake: WakeSignal,
    client: reqwest::Client,
    stream_url: String,
    ping_interval: Duration,
    stalls: StallPlans,
    phase: AtomicU8,
    workers: Mutex<Option<Workers>>,
}

impl Orchestrator {
    pub fn new(config: &Config, health: HealthState, metrics: SharedMetrics) -> Self {
        let client = reqwest::Client::new();
        let prober = Prober::new(
            client.clone(),
            config.base_url.clone(),
            config.probe_timeout,
            metrics.clone(),
        );
        metrics.set_phase(Phase::Created as i64);

        Self {
            health,
            metrics,
            prober,
            wake: WakeSignal::new(),
            client,
            stream_url: config.stream_url(),
            ping_interval: config.ping_interval,
            stalls: config.stalls,
            phase: AtomicU8::new(Phase::Created as u8),
            workers: Mutex::new(None),
        }
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Spawn the ping and stream workers, then stall through warm-up
    pub async fn on_started(&self) -> Result<StallReport, LifecycleError> {
        // Held until the handles are stored, so `dispose` either runs first
        // (and this transition fails) or finds the workers to join
        let mut workers = self.workers.lock().await;
        self.advance(Phase::Started)?;

        let ping = tokio::spawn(
            run_ping_worker(
                self.prober.clone(),
                self.health.clone(),
                self.wake.clone(),
                self.ping_interval,
            )
            .instrument(info_span!("ping_worker")),
        );
        let stream = tokio::spawn(
            run_stream_worker(
                self.client.clone(),
                self.stream_url.clone(),
                self.health.clone(),
                self.metrics.clone(),
            )
            .instrument(info_span!("stream_worker")),
        );
        *workers = Some(Workers { ping, stream });
        drop(workers);

        Ok(self.run_stall(Phase::Started, self.stalls.started).await)
    }

    /// Report unhealthy, then hold the drain window open
    ///
    /// `stopping` is set before the first inline probe, so every probe of
    /// this stall sees 503.
    pub async fn on_stopping(&self) -> Result<StallReport, LifecycleError> {
        self.advance(Phase::Stopping)?;
        self.health.set_stopping();
        Ok(self.run_stall(Phase::Stopping, self.stalls.stopping).await)
    }

    /// Stall through cool-down
    pub async fn on_stopped(&self) -> Result<StallReport, LifecycleError> {
        self.advance(Phase::Stopped)?;
        Ok(self.run_stall(Phase::Stopped, self.stalls.stopped).await)
    }

    /// Mark disposed, wake the ping worker, and join both workers
    ///
    /// Allowed from any phase. Never fails: join failures are logged and
    /// reported in the returned value. Later calls return
    /// `Disposal::AlreadyDisposed` without touching the workers.
    pub async fn dispose(&self) -> Disposal {
        if !self.health.mark_disposed() {
            debug!("Dispose called again");
            return Disposal::AlreadyDisposed;
        }
        info!("Dispose called");
        self.phase.store(Phase::Disposed as u8, Ordering::SeqCst);
        self.metrics.set_phase(Phase::Disposed as i64);
        self.wake.wake();

        let Some(workers) = self.workers.lock().await.take() else {
            info!("No background workers to join");
            return Disposal::Completed {
                ping: WorkerExit::NotStarted,
                stream: WorkerExit::NotStarted,
            };
        };

        let ping = join_worker("ping", workers.ping).await;
        let stream = join_worker("stream", workers.stream).await;
        info!("Background workers ended");

        Disposal::Completed { ping, stream }
    }

    fn advance(&self, to: Phase) -> Result<(), LifecycleError> {
        let Some(from) = to.predecessor() else {
            return Err(LifecycleError::InvalidTransition { from: self.phase(), to });
        };
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|actual| LifecycleError::InvalidTransition {
                from: Phase::from_u8(actual),
                to,
            })?;
        self.metrics.set_phase(to as i64);
        Ok(())
    }

    async fn run_stall(&self, phase: Phase, plan: StallPlan) -> StallReport {
        let report = stall(plan, &self.prober, &self.wake)
            .instrument(info_span!("lifecycle", phase = phase.as_str()))
            .await;
        self.metrics
            .record_stall_iterations(phase.as_str(), report.iterations() as u64);
        report
    }
}

async fn join_worker(name: &'static str, handle: JoinHandle<u64>) -> WorkerExit {
    match handle.await {
        Ok(count) => {
            debug!(worker = name, count, "Worker joined");
            WorkerExit::Finished
        }
        Err(e) => {
            warn!(worker = name, error = %e, "Worker ended abnormally");
            WorkerExit::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "ping_test.rs"]
mod ping_tests;

#[cfg(test)]
#[path = "stall_test.rs"]
mod stall_tests;

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_tests;

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod lifecycle_tests;
