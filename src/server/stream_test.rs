//! Tests for the `/stream` endpoint

use super::*;
use crate::test_support::spawn_app;
use std::time::{Duration, Instant};

/// Read chunks until at least `len` bytes arrived
async fn read_at_least(response: &mut reqwest::Response, len: usize) -> Vec<u8> {
    let mut received = Vec::new();
    while received.len() < len {
        match tokio::time::timeout(Duration::from_secs(2), response.chunk()).await {
            Ok(Ok(Some(chunk))) => received.extend_from_slice(&chunk),
            other => panic!(
                "stream ended after {} bytes: {:?}",
                received.len(),
                other.map(|r| r.map(|c| c.is_some()))
            ),
        }
    }
    received
}

/// The first chunk arrives right away, before any interval elapses
#[tokio::test]
async fn test_first_chunk_is_immediate() {
    let app = spawn_app(Duration::from_secs(30)).await;
    let started = Instant::now();

    let mut response = reqwest::get(app.url("/stream"))
        .await
        .expect("Failed to connect to server");
    assert_eq!(response.status(), 200);

    let received = read_at_least(&mut response, CHUNK.len()).await;

    assert_eq!(&received[..], CHUNK);
    assert!(started.elapsed() < Duration::from_secs(5));

    app.handle.abort();
}

/// Every chunk is exactly `ABCD`
#[tokio::test]
async fn test_chunks_repeat_payload() {
    let app = spawn_app(Duration::from_millis(30)).await;

    let mut response = reqwest::get(app.url("/stream"))
        .await
        .expect("Failed to connect to server");
    let received = read_at_least(&mut response, 3 * CHUNK.len()).await;

    assert_eq!(received.len() % CHUNK.len(), 0);
    for chunk in received.chunks(CHUNK.len()) {
        assert_eq!(chunk, CHUNK);
    }
    assert!(app.metrics.chunks_sent() >= 3);

    app.handle.abort();
}

/// Chunks are paced by the interval, not sent back to back
#[tokio::test]
async fn test_chunks_are_paced() {
    let app = spawn_app(Duration::from_millis(100)).await;
    let started = Instant::now();

    let mut response = reqwest::get(app.url("/stream"))
        .await
        .expect("Failed to connect to server");
    read_at_least(&mut response, 3 * CHUNK.len()).await;

    // chunk 1 at 0ms, chunk 2 at 100ms, chunk 3 at 200ms
    assert!(started.elapsed() >= Duration::from_millis(200));

    app.handle.abort();
}

/// Server shutdown ends an open stream promptly
#[tokio::test]
async fn test_server_shutdown_ends_stream() {
    let app = spawn_app(Duration::from_secs(30)).await;

    let mut response = reqwest::get(app.url("/stream"))
        .await
        .expect("Failed to connect to server");
    read_at_least(&mut response, CHUNK.len()).await;

    app.server_trigger.fire();

    let next = tokio::time::timeout(Duration::from_secs(2), response.chunk())
        .await
        .expect("stream should end promptly on server shutdown");
    assert!(matches!(next, Ok(None)), "no further chunks after shutdown");

    let served = tokio::time::timeout(Duration::from_secs(2), app.handle).await;
    assert!(served.is_ok(), "server should finish draining");
    assert_eq!(app.metrics.stream_ends(StreamEnd::ServerShutdown.as_str()), 1);
    assert_eq!(app.metrics.stream_ends(StreamEnd::ClientGone.as_str()), 0);
}

/// A client that goes away stops the write loop
#[tokio::test]
async fn test_client_disconnect_stops_chunks() {
    let app = spawn_app(Duration::from_millis(30)).await;

    let mut response = reqwest::get(app.url("/stream"))
        .await
        .expect("Failed to connect to server");
    read_at_least(&mut response, CHUNK.len()).await;
    drop(response);

    // give hyper time to notice, then the count must settle
    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = app.metrics.chunks_sent();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(app.metrics.chunks_sent(), settled);
    assert_eq!(app.metrics.stream_ends(StreamEnd::ClientGone.as_str()), 1);
    assert_eq!(app.metrics.stream_ends(StreamEnd::ServerShutdown.as_str()), 0);

    app.handle.abort();
}
