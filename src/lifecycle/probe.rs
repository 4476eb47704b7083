//! Self-probe: one request to `/$status`, one to a generic page
//!
//! Non-2xx answers are reported, not raised. Only transport failures (and
//! timeouts, when configured) become errors.

use crate::server::SharedMetrics;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{target} probe failed: {source}")]
    Request {
        target: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    /// The health endpoint
    Status,
    /// Any ordinary page, to see whether regular traffic is still served
    Request,
}

impl ProbeTarget {
    pub fn path(self) -> &'static str {
        match self {
            ProbeTarget::Status => "/$status",
            ProbeTarget::Request => "/request",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProbeTarget::Status => "status",
            ProbeTarget::Request => "request",
        }
    }
}

/// Status codes observed by one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub status: StatusCode,
    pub request: StatusCode,
}

impl ProbeReport {
    /// Whether the status endpoint reported healthy
    pub fn is_healthy(&self) -> bool {
        self.status.is_success()
    }
}

/// Issues probes against one base URL
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
    metrics: SharedMetrics,
}

impl Prober {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
            metrics,
        }
    }

    /// Probe the status endpoint, then the generic page
    pub async fn probe(&self) -> Result<ProbeReport, ProbeError> {
        let status = self.check(ProbeTarget::Status).await?;
        let request = self.check(ProbeTarget::Request).await?;
        Ok(ProbeReport { status, request })
    }

    async fn check(&self, target: ProbeTarget) -> Result<StatusCode, ProbeError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, target.path()));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => {
                self.metrics.record_probe(target.label(), "error");
                return Err(ProbeError::Request {
                    target: target.label(),
                    source,
                });
            }
        };

        let code = response.status();
        if code.is_success() {
            self.metrics.record_probe(target.label(), "ok");
            info!(path = target.path(), status = %code, "Probe answered");
        } else {
            self.metrics.record_probe(target.label(), "unhealthy");
            warn!(path = target.path(), status = %code, "Probe answered unhealthy");
        }
        Ok(code)
    }
}
