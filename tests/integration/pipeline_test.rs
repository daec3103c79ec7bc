//! End-to-end pipeline behavior against scripted transports

use crate::common::{
    test_config, wait_until, FailingLiveSink, HangingTransport, MockTransport, StuckTransport,
};
use chrono::Utc;
use insight_relay::cache::{CacheLimits, RetryCache, RetryCacheEntry};
use insight_relay::observability::PipelineStats;
use insight_relay::performance::{
    METRIC_CACHED_BATCHES, METRIC_QUEUE_DEPTH, METRIC_RECORDS_DROPPED, METRIC_UPTIME,
};
use insight_relay::record::{
    DependencyRecord, EventRecord, OpenBatch, RecordBody, TelemetryRecord,
};
use insight_relay::PipelineBuilder;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn event_names(records: &[TelemetryRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| match &r.body {
            RecordBody::Event(e) => Some(e.name.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_no_loss_under_retries() {
    let transport = Arc::new(MockTransport::failing(3));
    let (client, handle) = PipelineBuilder::new(test_config(None))
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    for i in 0..50 {
        client.track_event(EventRecord::new(format!("event-{i}")));
    }

    assert!(wait_until(|| transport.delivered_count() == 50).await);
    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert!(report.completed);
    assert_eq!(report.cached_batches, 0);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in event_names(&transport.delivered_records()) {
        *counts.entry(name).or_default() += 1;
    }
    assert_eq!(counts.len(), 50);
    assert!(counts.values().all(|&n| n == 1), "a record was delivered twice");
}

#[tokio::test]
async fn test_501_records_make_two_batches() {
    let mut config = test_config(None);
    config.batching.max_batch_size = 500;
    config.batching.max_batch_age_ms = 60_000;

    let transport = Arc::new(MockTransport::healthy());
    let (client, handle) = PipelineBuilder::new(config)
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    for i in 0..501 {
        client.track_event(EventRecord::new(format!("event-{i}")));
    }
    handle.shutdown_with_timeout(Duration::from_secs(5)).await;

    let sizes: Vec<usize> = transport
        .delivered_batches()
        .iter()
        .map(|b| b.record_count)
        .collect();
    assert_eq!(sizes, vec![500, 1]);

    let names = event_names(&transport.delivered_records());
    let expected: Vec<String> = (0..501).map(|i| format!("event-{i}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn test_dependency_delivered_after_retry() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MockTransport::failing(1));
    let (client, handle) = PipelineBuilder::new(test_config(Some(dir.path())))
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    client.track_dependency(
        DependencyRecord::new("payments.internal:8443", "POST /charges")
            .with_data("https://payments.internal:8443/charges")
            .with_duration(Duration::from_millis(87))
            .with_result(502, false)
            .with_type_name("HTTP"),
    );

    assert!(wait_until(|| transport.delivered_count() == 1).await);
    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert!(report.completed);
    assert_eq!(report.cached_batches, 0);

    let records = transport.delivered_records();
    let dependency = match &records[0].body {
        RecordBody::Dependency(d) => d.clone(),
        other => panic!("unexpected record {other:?}"),
    };
    assert_eq!(dependency.target, "payments.internal:8443");
    assert_eq!(dependency.name, "POST /charges");
    assert_eq!(dependency.data, "https://payments.internal:8443/charges");
    assert_eq!(dependency.duration_ms, 87);
    assert_eq!(dependency.result_code, 502);
    assert!(!dependency.success);
    assert_eq!(dependency.type_name, "HTTP");
}

#[tokio::test]
async fn test_failures_then_delivered_exactly_once() {
    let transport = Arc::new(MockTransport::failing(4));
    let (client, handle) = PipelineBuilder::new(test_config(None))
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    client.track_event(EventRecord::new("only"));

    assert!(wait_until(|| transport.delivered_count() == 1).await);
    // Give the retry loop a chance to misbehave
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.calls(), 5);
    assert_eq!(transport.delivered_batches().len(), 1);

    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert_eq!(report.cached_batches, 0);
}

#[tokio::test]
async fn test_batch_dropped_after_max_attempts() {
    let mut config = test_config(None);
    config.retry.max_attempts = 3;

    let transport = Arc::new(MockTransport::down());
    let (client, handle) = PipelineBuilder::new(config)
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    client.track_event(EventRecord::new("doomed"));

    assert!(wait_until(|| handle.stats().batches_dropped == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.calls(), 3);
    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert_eq!(report.cached_batches, 0);
}

#[tokio::test]
async fn test_cache_bound_evicts_oldest() {
    let mut config = test_config(None);
    config.batching.max_batch_size = 1;
    config.retry.max_cache_entries = 3;
    // No retries during the test
    config.retry.base_delay_ms = 3_600_000;
    config.retry.max_delay_ms = 3_600_000;

    let transport = Arc::new(MockTransport::down());
    let (client, handle) = PipelineBuilder::new(config)
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    for i in 0..5 {
        client.track_event(EventRecord::new(format!("event-{i}")));
    }

    assert!(wait_until(|| handle.stats().batches_cached == 5).await);

    let cache = handle.cache().unwrap().clone();
    let cached: Vec<_> = cache.entries().await.iter().map(|e| e.batch_id).collect();
    let attempted = transport.attempted();
    assert_eq!(attempted.len(), 5);
    assert_eq!(cached, attempted[2..].to_vec());
    assert_eq!(handle.stats().cache_evictions, 2);

    handle.shutdown_with_timeout(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_live_failures_never_touch_cache() {
    let mut config = test_config(None);
    config.live_metrics.enabled = true;
    config.live_metrics.sample_rate = 1.0;
    config.live_metrics.max_per_second = 0;

    let transport = Arc::new(MockTransport::healthy());
    let sink = Arc::new(FailingLiveSink::new());
    let (client, handle) = PipelineBuilder::new(config)
        .transport(transport.clone())
        .live_sink(sink.clone())
        .try_start()
        .await
        .unwrap();

    for i in 0..5 {
        client.track_event(EventRecord::new(format!("event-{i}")));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(wait_until(|| sink.pushes.load(Ordering::SeqCst) == 5).await);
    assert!(wait_until(|| transport.delivered_count() == 5).await);

    let stats = handle.stats();
    assert_eq!(stats.live_sent, 0);
    assert_eq!(stats.batches_cached, 0);

    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert_eq!(report.cached_batches, 0);
}

#[tokio::test]
async fn test_disabled_without_connection_string() {
    let mut config = test_config(None);
    config.collector.connection_string = None;

    let transport = Arc::new(MockTransport::healthy());
    let (client, handle) = PipelineBuilder::new(config)
        .transport(transport.clone())
        .start()
        .await;

    assert!(!client.is_enabled());
    client.track_event(EventRecord::new("ignored"));

    let report = handle.shutdown_with_timeout(Duration::from_secs(1)).await;
    assert!(report.completed);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_failed_batches_persist_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(Some(dir.path()));
    config.batching.max_batch_size = 1;
    config.retry.base_delay_ms = 3_600_000;
    config.retry.max_delay_ms = 3_600_000;

    let transport = Arc::new(MockTransport::down());
    let (client, handle) = PipelineBuilder::new(config)
        .transport(transport)
        .try_start()
        .await
        .unwrap();

    client.track_event(EventRecord::new("first"));
    client.track_event(EventRecord::new("second"));
    assert!(wait_until(|| handle.stats().batches_cached == 2).await);

    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert_eq!(report.cached_batches, 2);

    let reopened = RetryCache::open(
        dir.path(),
        CacheLimits::default(),
        Arc::new(PipelineStats::new()),
    )
    .await
    .unwrap();
    let entries = reopened.entries().await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.attempts == 1 && e.record_count == 1));
}

#[tokio::test]
async fn test_reloaded_entries_are_delivered() {
    let dir = tempfile::tempdir().unwrap();

    let mut open = OpenBatch::new(2);
    open.push(TelemetryRecord::new(
        Utc::now(),
        RecordBody::Event(EventRecord::new("left-over")),
    ));
    let encoded = open.seal().unwrap().encode("integration-test").unwrap();
    let batch_id = encoded.batch_id;

    {
        let cache = RetryCache::open(
            dir.path(),
            CacheLimits::default(),
            Arc::new(PipelineStats::new()),
        )
        .await
        .unwrap();
        cache
            .store(RetryCacheEntry::first_failure(encoded, Utc::now()))
            .await
            .unwrap();
    }

    let transport = Arc::new(MockTransport::healthy());
    let (_client, handle) = PipelineBuilder::new(test_config(Some(dir.path())))
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    assert!(wait_until(|| transport.delivered_count() == 1).await);
    assert_eq!(transport.delivered_batches()[0].batch_id, batch_id);

    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert_eq!(report.cached_batches, 0);
}

#[tokio::test]
async fn test_slow_collector_at_shutdown_caches_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(Some(dir.path()));
    config.batching.max_batch_age_ms = 60_000;

    let (client, handle) = PipelineBuilder::new(config)
        .transport(Arc::new(HangingTransport))
        .try_start()
        .await
        .unwrap();

    for i in 0..3 {
        client.track_event(EventRecord::new(format!("event-{i}")));
    }

    let report = handle.shutdown_with_timeout(Duration::from_millis(500)).await;
    assert!(report.completed);
    assert_eq!(report.unflushed_records, 0);
    assert_eq!(report.cached_batches, 1);

    let reopened = RetryCache::open(
        dir.path(),
        CacheLimits::default(),
        Arc::new(PipelineStats::new()),
    )
    .await
    .unwrap();
    let entries = reopened.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record_count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_timeout_reports_unflushed() {
    let mut config = test_config(None);
    config.batching.max_batch_age_ms = 60_000;

    let (client, handle) = PipelineBuilder::new(config)
        .transport(Arc::new(StuckTransport {
            block_for: Duration::from_secs(1),
        }))
        .try_start()
        .await
        .unwrap();

    for i in 0..3 {
        client.track_event(EventRecord::new(format!("event-{i}")));
    }

    let report = handle.shutdown_with_timeout(Duration::from_millis(200)).await;
    assert!(!report.completed);
    assert_eq!(report.unflushed_records, 3);
    assert_eq!(report.cached_batches, 0);
}

#[tokio::test]
async fn test_performance_metrics_delivered_when_enabled() {
    let mut config = test_config(None);
    config.performance.enabled = true;
    config.performance.interval_ms = 30;

    let transport = Arc::new(MockTransport::healthy());
    let (_client, handle) = PipelineBuilder::new(config)
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    let uptime_seen = || {
        transport.delivered_records().iter().any(|r| {
            matches!(&r.body, RecordBody::Metric(m) if m.name == METRIC_UPTIME)
        })
    };
    assert!(wait_until(uptime_seen).await);

    let report = handle.shutdown_with_timeout(Duration::from_secs(5)).await;
    assert!(report.completed);

    let names: Vec<String> = transport
        .delivered_records()
        .iter()
        .filter_map(|r| match &r.body {
            RecordBody::Metric(m) => Some(m.name.clone()),
            _ => None,
        })
        .collect();
    for expected in [METRIC_QUEUE_DEPTH, METRIC_RECORDS_DROPPED, METRIC_CACHED_BATCHES] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn test_performance_metrics_off_by_default() {
    let transport = Arc::new(MockTransport::healthy());
    let (client, handle) = PipelineBuilder::new(test_config(None))
        .transport(transport.clone())
        .try_start()
        .await
        .unwrap();

    client.track_event(EventRecord::new("only"));
    assert!(wait_until(|| transport.delivered_count() == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown_with_timeout(Duration::from_secs(5)).await;

    assert_eq!(transport.delivered_count(), 1);
}
