//! HTTP surface of the service
//!
//! Provides the status probe, the streaming endpoint, the stop trigger and
//! Prometheus metrics, plus the latches that coordinate shutdown.

mod health;
pub mod metrics;
mod router;
pub mod shutdown;
mod stream;

pub use health::{status, HealthState};
pub use metrics::{create_metrics, ServiceMetrics, SharedMetrics};
pub use router::{build_router, serve, AppState};
pub use shutdown::{latch, wait_for_signal, Latch, LatchTrigger};
pub use stream::{StreamEnd, CHUNK};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_tests;
