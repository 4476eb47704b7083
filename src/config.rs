//! Service configuration
//!
//! Every value has a default matching the production layout: the service
//! listens on `127.0.0.1:29145` and probes itself there. Overrides come from
//! `DRAINWATCH_*` environment variables.

use crate::lifecycle::{ParsePlanError, StallPlan};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default listen address (loopback, fixed port)
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:29145";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid socket address {value:?}: {source}")]
    InvalidAddr {
        var: &'static str,
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("{var}: invalid number of milliseconds {value:?}")]
    InvalidMillis { var: &'static str, value: String },

    #[error("{var}: interval must be greater than zero")]
    ZeroInterval { var: &'static str },

    #[error("{var}: {source}")]
    InvalidPlan {
        var: &'static str,
        #[source]
        source: ParsePlanError,
    },
}

/// Stall plans for the three blocking lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPlans {
    pub started: StallPlan,
    pub stopping: StallPlan,
    pub stopped: StallPlan,
}

impl Default for StallPlans {
    fn default() -> Self {
        Self {
            started: StallPlan::new(3, Duration::from_millis(500)),
            // 8 seconds of 503 so load balancers fail away
            stopping: StallPlan::new(4, Duration::from_secs(2)),
            stopped: StallPlan::new(3, Duration::from_millis(500)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Base URL the workers use to reach this service
    pub base_url: String,
    /// Upper bound on the ping worker's wait between probes
    pub ping_interval: Duration,
    /// Delay between chunks on `/stream`
    pub stream_chunk_interval: Duration,
    pub stalls: StallPlans,
    /// Per-request timeout for probes; `None` waits indefinitely
    pub probe_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        let bind_addr: SocketAddr = ([127, 0, 0, 1], 29145).into();
        Self {
            base_url: base_url_for(bind_addr),
            bind_addr,
            ping_interval: Duration::from_secs(2),
            stream_chunk_interval: Duration::from_secs(5),
            stalls: StallPlans::default(),
            probe_timeout: None,
        }
    }
}

fn base_url_for(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidMillis {
            var,
            value: value.to_string(),
        })
}

/// Like `parse_millis`, for delays that pace a loop
fn parse_interval(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let interval = parse_millis(var, value)?;
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval { var });
    }
    Ok(interval)
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// - DRAINWATCH_BIND_ADDR: listen address (default: 127.0.0.1:29145)
    /// - DRAINWATCH_BASE_URL: self-probe base URL (default: derived from bind address)
    /// - DRAINWATCH_PING_INTERVAL_MS: ping worker wait (default: 2000)
    /// - DRAINWATCH_STREAM_INTERVAL_MS: `/stream` chunk delay (default: 5000)
    /// - DRAINWATCH_STALL_STARTED / _STOPPING / _STOPPED: plans as `COUNTxMILLIS`
    /// - DRAINWATCH_PROBE_TIMEOUT_MS: per-probe timeout (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup("DRAINWATCH_BIND_ADDR") {
            config.bind_addr = value
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidAddr {
                    var: "DRAINWATCH_BIND_ADDR",
                    value: value.clone(),
                    source,
                })?;
            config.base_url = base_url_for(config.bind_addr);
        }
        if let Some(value) = lookup("DRAINWATCH_BASE_URL") {
            config.base_url = value.trim().trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup("DRAINWATCH_PING_INTERVAL_MS") {
            config.ping_interval = parse_interval("DRAINWATCH_PING_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("DRAINWATCH_STREAM_INTERVAL_MS") {
            config.stream_chunk_interval = parse_interval("DRAINWATCH_STREAM_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("DRAINWATCH_PROBE_TIMEOUT_MS") {
            config.probe_timeout = Some(parse_millis("DRAINWATCH_PROBE_TIMEOUT_MS", &value)?);
        }

        for (var, slot) in [
            ("DRAINWATCH_STALL_STARTED", &mut config.stalls.started),
            ("DRAINWATCH_STALL_STOPPING", &mut config.stalls.stopping),
            ("DRAINWATCH_STALL_STOPPED", &mut config.stalls.stopped),
        ] {
            if let Some(value) = lookup(var) {
                *slot = value
                    .parse()
                    .map_err(|source| ConfigError::InvalidPlan { var, source })?;
            }
        }

        Ok(config)
    }

    /// URL of the streaming endpoint on this service
    pub fn stream_url(&self) -> String {
        format!("{}/stream", self.base_url)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
