//! Shared health state and the `/$status` endpoint
//!
//! `stopping` and `disposed` each flip from false to true exactly once per
//! process. Lifecycle callbacks own `stopping`, disposal owns `disposed`;
//! handlers and workers only read.

use super::shutdown::{latch, Latch, LatchTrigger};
use axum::{extract::State, http::StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct HealthInner {
    stopping: AtomicBool,
    disposed: AtomicBool,
    disposal: LatchTrigger,
}

/// Shared health state, passed by handle to every handler and worker
#[derive(Debug, Clone)]
pub struct HealthState {
    inner: Arc<HealthInner>,
}

impl HealthState {
    /// Create a new health state (healthy, not disposed)
    pub fn new() -> Self {
        let (disposal, _) = latch("disposal");
        Self {
            inner: Arc::new(HealthInner {
                stopping: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                disposal,
            }),
        }
    }

    /// Mark the service as stopping
    ///
    /// From here on `/$status` answers 503. There is no way back.
    pub fn set_stopping(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    /// Mark the service as disposed and release anything waiting on it
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn mark_disposed(&self) -> bool {
        let first = !self.inner.disposed.swap(true, Ordering::SeqCst);
        if first {
            self.inner.disposal.fire();
        }
        first
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Latch that fires when the service is disposed
    pub fn disposal(&self) -> Latch {
        self.inner.disposal.subscribe()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Status probe handler
///
/// Returns 200 OK while running, 503 Service Unavailable once stopping.
/// Stays servable through the whole drain window.
pub async fn status(State(health): State<HealthState>) -> StatusCode {
    if health.is_stopping() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}
