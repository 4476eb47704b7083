//! Tests for stall plans and the stall sequencer

use super::*;
use crate::server::create_metrics;
use crate::test_support::{dead_base_url, spawn_app};
use reqwest::StatusCode;
use std::time::{Duration, Instant};

#[test]
fn test_plan_total() {
    let plan = StallPlan::new(4, Duration::from_secs(2));
    assert_eq!(plan.total(), Duration::from_secs(8));
    assert_eq!(StallPlan::new(0, Duration::from_secs(2)).total(), Duration::ZERO);
}

#[test]
fn test_plan_parse() {
    assert_eq!(
        "3x500".parse::<StallPlan>(),
        Ok(StallPlan::new(3, Duration::from_millis(500)))
    );
    assert_eq!(
        " 4x2000 ".parse::<StallPlan>(),
        Ok(StallPlan::new(4, Duration::from_secs(2)))
    );
    assert!(matches!(
        "4".parse::<StallPlan>(),
        Err(ParsePlanError::Format(_))
    ));
    assert!(matches!(
        "fourx2000".parse::<StallPlan>(),
        Err(ParsePlanError::Number(_))
    ));
    assert!(matches!(
        "4x-1".parse::<StallPlan>(),
        Err(ParsePlanError::Number(_))
    ));
}

/// A stall takes at least its planned time and probes once per iteration
#[tokio::test]
async fn test_stall_runs_every_iteration() {
    let app = spawn_app(Duration::from_secs(5)).await;
    let prober = Prober::new(reqwest::Client::new(), app.base_url(), None, app.metrics.clone());
    let wake = WakeSignal::new();
    let plan = StallPlan::new(4, Duration::from_millis(50));

    let started = Instant::now();
    let report = stall(plan, &prober, &wake).await;

    assert!(started.elapsed() >= plan.total());
    assert_eq!(report.probes.len(), 4);
    assert_eq!(report.failures, 0);
    assert!(report.probes.iter().all(|p| p.is_healthy()));
    assert!(report.probes.iter().all(|p| p.request == StatusCode::OK));
    assert_eq!(app.metrics.probe_count("status"), 4);
    assert_eq!(app.metrics.probe_count("request"), 4);

    app.handle.abort();
}

/// Unhealthy answers are reported, not treated as failures
#[tokio::test]
async fn test_stall_reports_unhealthy_status() {
    let app = spawn_app(Duration::from_secs(5)).await;
    app.health.set_stopping();
    let prober = Prober::new(reqwest::Client::new(), app.base_url(), None, app.metrics.clone());

    let report = stall(
        StallPlan::new(2, Duration::from_millis(10)),
        &prober,
        &WakeSignal::new(),
    )
    .await;

    assert_eq!(report.failures, 0);
    assert!(report
        .probes
        .iter()
        .all(|p| p.status == StatusCode::SERVICE_UNAVAILABLE));

    app.handle.abort();
}

/// Probe failures never cut the stall short
#[tokio::test]
async fn test_stall_completes_despite_failures() {
    let metrics = create_metrics().expect("metrics");
    let prober = Prober::new(
        reqwest::Client::new(),
        dead_base_url().await,
        Some(Duration::from_millis(500)),
        metrics,
    );
    let plan = StallPlan::new(3, Duration::from_millis(30));

    let started = Instant::now();
    let report = stall(plan, &prober, &WakeSignal::new()).await;

    assert!(started.elapsed() >= plan.total());
    assert_eq!(report.failures, 3);
    assert!(report.probes.is_empty());
    assert_eq!(report.iterations(), 3);
}

/// Each iteration leaves a wake for the ping worker; unconsumed wakes coalesce
#[tokio::test]
async fn test_stall_wakes_ping_worker() {
    let app = spawn_app(Duration::from_secs(5)).await;
    let prober = Prober::new(reqwest::Client::new(), app.base_url(), None, app.metrics.clone());
    let wake = WakeSignal::new();

    stall(StallPlan::new(3, Duration::from_millis(10)), &prober, &wake).await;

    assert_eq!(wake.wait(Duration::from_secs(1)).await, Wake::Signaled);
    assert_eq!(wake.wait(Duration::from_millis(50)).await, Wake::TimedOut);

    app.handle.abort();
}
