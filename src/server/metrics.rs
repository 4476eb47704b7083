//! Prometheus metrics for probes, stalls, and streams
//!
//! Each `ServiceMetrics` owns its own registry so tests can run in parallel
//! without sharing counters.

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics shared between the HTTP handlers and the lifecycle workers
pub type SharedMetrics = Arc<ServiceMetrics>;

pub struct ServiceMetrics {
    registry: Registry,
    probes_total: IntCounterVec,
    stall_iterations_total: IntCounterVec,
    stream_bytes_received_total: IntCounter,
    stream_chunks_sent_total: IntCounter,
    stream_responses_ended_total: IntCounterVec,
    lifecycle_phase: IntGauge,
}

/// Create the metrics registry with all service metrics registered
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new();

    let probes_total = IntCounterVec::new(
        Opts::new(
            "drainwatch_probes_total",
            "Self-probe requests by target and outcome",
        ),
        &["target", "outcome"],
    )?;
    let stall_iterations_total = IntCounterVec::new(
        Opts::new(
            "drainwatch_stall_iterations_total",
            "Stall iterations completed per lifecycle phase",
        ),
        &["phase"],
    )?;
    let stream_bytes_received_total = IntCounter::new(
        "drainwatch_stream_bytes_received_total",
        "Bytes consumed by the stream worker",
    )?;
    let stream_chunks_sent_total = IntCounter::new(
        "drainwatch_stream_chunks_sent_total",
        "Chunks written by the stream endpoint",
    )?;
    let stream_responses_ended_total = IntCounterVec::new(
        Opts::new(
            "drainwatch_stream_responses_ended_total",
            "Streaming responses ended, by reason",
        ),
        &["reason"],
    )?;
    let lifecycle_phase = IntGauge::new(
        "drainwatch_lifecycle_phase",
        "Current lifecycle phase (0=created, 1=started, 2=stopping, 3=stopped, 4=disposed)",
    )?;

    registry.register(Box::new(probes_total.clone()))?;
    registry.register(Box::new(stall_iterations_total.clone()))?;
    registry.register(Box::new(stream_bytes_received_total.clone()))?;
    registry.register(Box::new(stream_chunks_sent_total.clone()))?;
    registry.register(Box::new(stream_responses_ended_total.clone()))?;
    registry.register(Box::new(lifecycle_phase.clone()))?;

    Ok(Arc::new(ServiceMetrics {
        registry,
        probes_total,
        stall_iterations_total,
        stream_bytes_received_total,
        stream_chunks_sent_total,
        stream_responses_ended_total,
        lifecycle_phase,
    }))
}

impl ServiceMetrics {
    pub fn record_probe(&self, target: &str, outcome: &str) {
        self.probes_total
            .with_label_values(&[target, outcome])
            .inc();
    }

    /// Number of probes recorded for a target, across all outcomes
    pub fn probe_count(&self, target: &str) -> u64 {
        ["ok", "unhealthy", "error"]
            .iter()
            .map(|outcome| {
                self.probes_total
                    .with_label_values(&[target, outcome])
                    .get()
            })
            .sum()
    }

    pub fn record_stall_iterations(&self, phase: &str, count: u64) {
        self.stall_iterations_total
            .with_label_values(&[phase])
            .inc_by(count);
    }

    pub fn record_bytes_received(&self, count: usize) {
        self.stream_bytes_received_total.inc_by(count as u64);
    }

    pub fn record_chunk_sent(&self) {
        self.stream_chunks_sent_total.inc();
    }

    pub fn chunks_sent(&self) -> u64 {
        self.stream_chunks_sent_total.get()
    }

    pub fn record_stream_end(&self, reason: &str) {
        self.stream_responses_ended_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn stream_ends(&self, reason: &str) -> u64 {
        self.stream_responses_ended_total
            .with_label_values(&[reason])
            .get()
    }

    pub fn set_phase(&self, phase: i64) {
        self.lifecycle_phase.set(phase);
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
