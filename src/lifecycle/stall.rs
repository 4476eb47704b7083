//! Stall sequencer
//!
//! Holds a lifecycle phase open for `iterations * interval`, probing the
//! service on every iteration and nudging the ping worker to do the same.

use super::ping::WakeSignal;
use super::probe::{ProbeReport, Prober};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePlanError {
    #[error("expected COUNTxMILLIS, got {0:?}")]
    Format(String),

    #[error("invalid number {0:?}")]
    Number(String),
}

/// How long, in probe+sleep cycles, to hold a phase open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPlan {
    pub iterations: u32,
    pub interval: Duration,
}

impl StallPlan {
    pub const fn new(iterations: u32, interval: Duration) -> Self {
        Self {
            iterations,
            interval,
        }
    }

    /// Minimum wall-clock time the stall takes
    pub fn total(&self) -> Duration {
        self.interval * self.iterations
    }
}

/// Parses `COUNTxMILLIS`, e.g. `4x2000`
impl FromStr for StallPlan {
    type Err = ParsePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, millis) = s
            .trim()
            .split_once('x')
            .ok_or_else(|| ParsePlanError::Format(s.to_string()))?;
        let iterations = count
            .parse::<u32>()
            .map_err(|_| ParsePlanError::Number(count.to_string()))?;
        let millis = millis
            .parse::<u64>()
            .map_err(|_| ParsePlanError::Number(millis.to_string()))?;
        Ok(Self::new(iterations, Duration::from_millis(millis)))
    }
}

/// What a stall observed
#[derive(Debug, Clone, Default)]
pub struct StallReport {
    /// Successful probes, in order
    pub probes: Vec<ProbeReport>,
    /// Probes that failed at the transport level
    pub failures: usize,
}

impl StallReport {
    pub fn iterations(&self) -> usize {
        self.probes.len() + self.failures
    }
}

/// Run a stall to completion
///
/// Every iteration wakes the ping worker, probes inline, then sleeps for
/// the plan's interval. Probe failures are logged and counted; the plan
/// always runs its full iteration count.
pub async fn stall(plan: StallPlan, prober: &Prober, wake: &WakeSignal) -> StallReport {
    info!(
        iterations = plan.iterations,
        interval_ms = plan.interval.as_millis() as u64,
        "Begin callback"
    );
    let mut report = StallReport::default();

    for _ in 0..plan.iterations {
        wake.wake();
        match prober.probe().await {
            Ok(probe) => report.probes.push(probe),
            Err(e) => {
                warn!(error = %e, "Caught probe error");
                report.failures += 1;
            }
        }
        tokio::time::sleep(plan.interval).await;
    }

    info!(
        probes = report.probes.len(),
        failures = report.failures,
        "End callback"
    );
    report
}
