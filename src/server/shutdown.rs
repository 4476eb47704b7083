//! One-shot latches and OS signal handling
//!
//! A latch is fired once and observed by any number of listeners. The
//! service uses three of them:
//! - the stop latch, fired by `GET /stop` or an OS signal
//! - the server latch, which drains the HTTP server and ends open streams
//! - the disposal latch, which tells background workers to let go

use tokio::sync::watch;
use tracing::{debug, info};

/// Listening side of a latch
///
/// Cheap to clone; every clone observes the same firing.
#[derive(Debug, Clone)]
pub struct Latch {
    receiver: watch::Receiver<bool>,
}

impl Latch {
    /// Wait until the latch fires
    pub async fn wait(&mut self) {
        // A dropped trigger can never fire, so treat it as fired
        let _ = self.receiver.wait_for(|fired| *fired).await;
    }

    /// Check if the latch has fired (non-blocking)
    pub fn is_fired(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Firing side of a latch
#[derive(Debug)]
pub struct LatchTrigger {
    name: &'static str,
    sender: watch::Sender<bool>,
}

impl LatchTrigger {
    /// Fire the latch
    ///
    /// Returns `true` for the call that actually fired it.
    pub fn fire(&self) -> bool {
        let first = !self.sender.send_replace(true);
        if first {
            info!(latch = self.name, "Latch fired");
        } else {
            debug!(latch = self.name, "Latch already fired");
        }
        first
    }

    /// Create another listener for this latch
    pub fn subscribe(&self) -> Latch {
        Latch {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Create a new latch pair
///
/// Returns (trigger, latch) where:
/// - trigger: fires the latch, exactly once
/// - latch: cloned and passed to components that need to listen
pub fn latch(name: &'static str) -> (LatchTrigger, Latch) {
    let (sender, receiver) = watch::channel(false);
    (LatchTrigger { name, sender }, Latch { receiver })
}

/// Wait for SIGTERM or SIGINT signal
///
/// Returns the signal name that was received.
///
/// # Panics
/// Panics if signal handlers cannot be registered (OS resource exhaustion).
#[cfg(unix)]
pub async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::error;

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to register SIGTERM handler");
            panic!("Cannot register SIGTERM handler: {}", e);
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to register SIGINT handler");
            panic!("Cannot register SIGINT handler: {}", e);
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

/// Wait for Ctrl+C signal (Windows)
///
/// # Panics
/// Panics if Ctrl+C handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> &'static str {
    use tracing::error;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to wait for Ctrl+C");
        panic!("Cannot wait for Ctrl+C: {}", e);
    }
    "CTRL_C"
}
