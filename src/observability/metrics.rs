//! Pipeline self-metrics
//!
//! Every counter is kept twice: as an in-process atomic (for `stats()`
//! snapshots and tests) and as a `metrics` counter picked up by whatever
//! recorder is installed, e.g. the Prometheus exporter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCounter {
    /// Records accepted into the ingest queue
    RecordsTracked,
    /// Records rejected by validation
    RecordsRejected,
    /// Records lost: full queue, stopped pipeline, encoding failure
    RecordsDropped,
    /// Records in batches the dispatcher has finished with
    RecordsDispatched,
    /// Batches sealed by the batcher
    BatchesSealed,
    /// Batches acknowledged by the collector
    BatchesDelivered,
    /// Batches written to the retry cache
    BatchesCached,
    /// Retry attempts made from the cache
    BatchesRetried,
    /// Batches abandoned after exhausting retries
    BatchesDropped,
    /// Cache entries evicted to respect the size bound
    CacheEvictions,
    /// Records pushed to the live metrics stream
    LiveSent,
    /// Sampled records the live stream could not deliver
    LiveDropped,
}

impl PipelineCounter {
    pub fn name(self) -> &'static str {
        match self {
            PipelineCounter::RecordsTracked => "insight_records_tracked_total",
            PipelineCounter::RecordsRejected => "insight_records_rejected_total",
            PipelineCounter::RecordsDropped => "insight_records_dropped_total",
            PipelineCounter::RecordsDispatched => "insight_records_dispatched_total",
            PipelineCounter::BatchesSealed => "insight_batches_sealed_total",
            PipelineCounter::BatchesDelivered => "insight_batches_delivered_total",
            PipelineCounter::BatchesCached => "insight_batches_cached_total",
            PipelineCounter::BatchesRetried => "insight_batches_retried_total",
            PipelineCounter::BatchesDropped => "insight_batches_dropped_total",
            PipelineCounter::CacheEvictions => "insight_cache_evictions_total",
            PipelineCounter::LiveSent => "insight_live_sent_total",
            PipelineCounter::LiveDropped => "insight_live_dropped_total",
        }
    }
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Entries currently held by the retry cache
    CacheEntries,
    /// Payload bytes currently held by the retry cache
    CacheBytes,
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::CacheEntries => "insight_cache_entries",
        GaugeMetric::CacheBytes => "insight_cache_bytes",
    };

    ::metrics::gauge!(metric_name).set(value);
}

/// Shared pipeline counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    records_tracked: AtomicU64,
    records_rejected: AtomicU64,
    records_dropped: AtomicU64,
    records_dispatched: AtomicU64,
    batches_sealed: AtomicU64,
    batches_delivered: AtomicU64,
    batches_cached: AtomicU64,
    batches_retried: AtomicU64,
    batches_dropped: AtomicU64,
    cache_evictions: AtomicU64,
    live_sent: AtomicU64,
    live_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub records_tracked: u64,
    pub records_rejected: u64,
    pub records_dropped: u64,
    pub records_dispatched: u64,
    pub batches_sealed: u64,
    pub batches_delivered: u64,
    pub batches_cached: u64,
    pub batches_retried: u64,
    pub batches_dropped: u64,
    pub cache_evictions: u64,
    pub live_sent: u64,
    pub live_dropped: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, counter: PipelineCounter) -> &AtomicU64 {
        match counter {
            PipelineCounter::RecordsTracked => &self.records_tracked,
            PipelineCounter::RecordsRejected => &self.records_rejected,
            PipelineCounter::RecordsDropped => &self.records_dropped,
            PipelineCounter::RecordsDispatched => &self.records_dispatched,
            PipelineCounter::BatchesSealed => &self.batches_sealed,
            PipelineCounter::BatchesDelivered => &self.batches_delivered,
            PipelineCounter::BatchesCached => &self.batches_cached,
            PipelineCounter::BatchesRetried => &self.batches_retried,
            PipelineCounter::BatchesDropped => &self.batches_dropped,
            PipelineCounter::CacheEvictions => &self.cache_evictions,
            PipelineCounter::LiveSent => &self.live_sent,
            PipelineCounter::LiveDropped => &self.live_dropped,
        }
    }

    /// Increment a counter by `n`
    pub fn incr(&self, counter: PipelineCounter, n: u64) {
        if n == 0 {
            return;
        }
        self.slot(counter).fetch_add(n, Ordering::Relaxed);
        ::metrics::counter!(counter.name()).increment(n);
    }

    pub fn get(&self, counter: PipelineCounter) -> u64 {
        self.slot(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_tracked: self.get(PipelineCounter::RecordsTracked),
            records_rejected: self.get(PipelineCounter::RecordsRejected),
            records_dropped: self.get(PipelineCounter::RecordsDropped),
            records_dispatched: self.get(PipelineCounter::RecordsDispatched),
            batches_sealed: self.get(PipelineCounter::BatchesSealed),
            batches_delivered: self.get(PipelineCounter::BatchesDelivered),
            batches_cached: self.get(PipelineCounter::BatchesCached),
            batches_retried: self.get(PipelineCounter::BatchesRetried),
            batches_dropped: self.get(PipelineCounter::BatchesDropped),
            cache_evictions: self.get(PipelineCounter::CacheEvictions),
            live_sent: self.get(PipelineCounter::LiveSent),
            live_dropped: self.get(PipelineCounter::LiveDropped),
        }
    }
}
