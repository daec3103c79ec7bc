//! Periodic performance metrics
//!
//! When enabled, a background task samples process and pipeline health on a
//! fixed interval and tracks each sample as an ordinary metric record.

use crate::cache::RetryCache;
use crate::client::TelemetryClient;
use crate::record::MetricRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const METRIC_UPTIME: &str = "processUptimeSeconds";
pub const METRIC_QUEUE_DEPTH: &str = "telemetryQueueDepth";
pub const METRIC_RECORDS_DROPPED: &str = "telemetryRecordsDropped";
pub const METRIC_CACHED_BATCHES: &str = "telemetryCachedBatches";

/// Samples uptime, queue depth, drop count and retry cache size
pub struct PerformanceCollector {
    client: TelemetryClient,
    cache: Arc<RetryCache>,
    interval: Duration,
    started: Instant,
}

impl PerformanceCollector {
    pub fn new(client: TelemetryClient, cache: Arc<RetryCache>, interval: Duration) -> Self {
        Self {
            client,
            cache,
            interval,
            started: Instant::now(),
        }
    }

    /// Take one sample
    pub async fn collect(&self) -> Vec<MetricRecord> {
        let stats = self.client.stats();
        vec![
            MetricRecord::new(METRIC_UPTIME, self.started.elapsed().as_secs_f64()),
            MetricRecord::new(METRIC_QUEUE_DEPTH, self.client.queue_depth() as f64),
            MetricRecord::new(METRIC_RECORDS_DROPPED, stats.records_dropped as f64),
            MetricRecord::new(METRIC_CACHED_BATCHES, self.cache.len().await as f64),
        ]
    }

    /// Track a sample every interval until cancelled. The first sample is
    /// taken one interval after start.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(self.started + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Performance collector started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sample = self.collect().await;
            tracing::debug!(metrics = sample.len(), "Performance sample taken");
            for metric in sample {
                self.client.track_metric(metric);
            }
        }

        tracing::info!("Performance collector stopped");
    }
}
