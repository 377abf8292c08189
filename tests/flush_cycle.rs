//! Timer-driven flush behavior, run on a paused Tokio clock.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use route_latency::metrics::{flush_once, BucketKey, Flusher, LatencyAggregator, MemorySink};

const PERIOD: Duration = Duration::from_secs(300);
const PREFIX: &str = "RequestLatency";

fn setup() -> (Arc<LatencyAggregator>, Arc<MemorySink>) {
    (
        Arc::new(LatencyAggregator::new("pod-a")),
        Arc::new(MemorySink::new()),
    )
}

/// Sleep just past the next tick; the paused clock auto-advances and the
/// flusher task runs its pass before this sleep completes.
async fn pass_tick() {
    tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn nothing_is_flushed_before_the_first_period() {
    let (agg, sink) = setup();
    let flusher = Flusher::start(agg.clone(), sink.clone(), PREFIX, PERIOD);

    agg.record("/orders", 10);
    tokio::time::sleep(PERIOD - Duration::from_secs(1)).await;

    assert!(sink.is_empty());
    assert_eq!(agg.pending(&BucketKey::new("pod-a", "/orders")), 1);
    flusher.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn tick_emits_min_max_average_and_removes_bucket() {
    let (agg, sink) = setup();
    let flusher = Flusher::start(agg.clone(), sink.clone(), PREFIX, PERIOD);

    for ms in [10, 20, 30] {
        agg.record("/orders", ms);
    }
    pass_tick().await;

    assert_eq!(sink.last_value("RequestLatency|pod-a|/orders|Min"), Some(10.0));
    assert_eq!(sink.last_value("RequestLatency|pod-a|/orders|Max"), Some(30.0));
    assert_eq!(sink.last_value("RequestLatency|pod-a|/orders|Average"), Some(20.0));
    assert!(agg.is_empty());

    // Next cycle with no traffic emits nothing for the key.
    sink.clear();
    pass_tick().await;
    assert!(sink.is_empty());

    // A new sample recreates the bucket.
    agg.record("/orders", 7);
    assert_eq!(agg.pending(&BucketKey::new("pod-a", "/orders")), 1);

    flusher.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn timer_keeps_firing_after_sink_failure() {
    let (agg, sink) = setup();
    let flusher = Flusher::start(agg.clone(), sink.clone(), PREFIX, PERIOD);

    sink.fail_matching("/flaky");
    agg.record("/flaky", 5);
    pass_tick().await;
    assert!(sink.is_empty());

    sink.heal();
    agg.record("/flaky", 6);
    pass_tick().await;
    assert_eq!(sink.last_value("RequestLatency|pod-a|/flaky|Min"), Some(6.0));

    flusher.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_runs_a_final_pass() {
    let (agg, sink) = setup();
    let flusher = Flusher::start(agg.clone(), sink.clone(), PREFIX, PERIOD);

    agg.record("/checkout", 40);
    agg.record("/checkout", 60);

    let report = flusher.stop().await.unwrap();
    assert!(report.is_ok());
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].average, 50.0);
    assert_eq!(sink.last_value("RequestLatency|pod-a|/checkout|Max"), Some(60.0));
    assert!(agg.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_still_runs_a_final_pass() {
    let (agg, sink) = setup();
    let flusher = Flusher::start(agg.clone(), sink.clone(), PREFIX, PERIOD);

    agg.record("/orphan", 12);
    drop(flusher);

    // Well short of a tick: only the shutdown pass can have emitted.
    tokio::time::sleep(Duration::from_millis(1)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(sink.len(), 3);
    assert_eq!(sink.last_value("RequestLatency|pod-a|/orphan|Min"), Some(12.0));
    assert_eq!(sink.last_value("RequestLatency|pod-a|/orphan|Max"), Some(12.0));
    assert_eq!(sink.last_value("RequestLatency|pod-a|/orphan|Average"), Some(12.0));
    assert!(agg.is_empty());
}

#[tokio::test(start_paused = true)]
async fn flush_now_is_served_by_the_running_task() {
    let (agg, sink) = setup();
    let flusher = Flusher::start(agg.clone(), sink.clone(), PREFIX, PERIOD);

    agg.record("/a", 1);
    agg.record("/b", 2);
    let report = flusher.flush_now().await.unwrap();
    assert_eq!(report.records.len(), 2);
    assert_eq!(sink.len(), 6);

    let report = flusher.flush_now().await.unwrap();
    assert!(report.records.is_empty());
    assert_eq!(report.skipped, 0);

    flusher.stop().await.unwrap();
}

#[tokio::test]
async fn empty_store_flush_is_silent() {
    let (agg, sink) = setup();
    let report = flush_once(&agg, sink.as_ref(), PREFIX).await;
    assert!(report.is_ok());
    assert!(report.records.is_empty());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn keys_reached_before_a_failure_keep_their_metrics() {
    let (agg, sink) = setup();
    for path in ["/a", "/b", "/c", "/d"] {
        agg.record(path, 3);
    }
    sink.fail_matching("/c|");

    let report = flush_once(&agg, sink.as_ref(), PREFIX).await;
    assert!(report.error.is_some());

    // Every emitted record is complete, and the failing key never shows up.
    for rec in &report.records {
        assert_ne!(rec.path, "/c");
        let base = format!("RequestLatency|pod-a|{}", rec.path);
        assert_eq!(sink.last_value(&format!("{base}|Min")), Some(3.0));
        assert_eq!(sink.last_value(&format!("{base}|Max")), Some(3.0));
        assert_eq!(sink.last_value(&format!("{base}|Average")), Some(3.0));
    }

    // Keys not reached in this pass are still pending for the next one.
    let pending: usize = ["/a", "/b", "/d"]
        .iter()
        .map(|p| agg.pending(&BucketKey::new("pod-a", *p)))
        .sum();
    assert_eq!(pending + report.records.len(), 3);
}
