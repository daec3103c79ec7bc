//! Shared fixtures: scripted transports, live sinks and configs

use async_trait::async_trait;
use insight_relay::config::Config;
use insight_relay::live::LiveSink;
use insight_relay::record::{EncodedBatch, TelemetryRecord};
use insight_relay::transport::{Ack, Transport, TransportError};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Fails the first `failures` sends with a 503, then accepts everything
pub struct MockTransport {
    failures: u32,
    calls: AtomicU32,
    attempted: Mutex<Vec<Uuid>>,
    delivered: Mutex<Vec<EncodedBatch>>,
}

impl MockTransport {
    pub fn healthy() -> Self {
        Self::failing(0)
    }

    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            attempted: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn down() -> Self {
        Self::failing(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Batch ids in the order they were first or again submitted
    pub fn attempted(&self) -> Vec<Uuid> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn delivered_batches(&self) -> Vec<EncodedBatch> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_records(&self) -> Vec<TelemetryRecord> {
        self.delivered_batches()
            .iter()
            .flat_map(|b| b.decode().unwrap().records.into_owned())
            .collect()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.record_count)
            .sum()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, batch: &EncodedBatch) -> Result<Ack, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempted.lock().unwrap().push(batch.batch_id);

        if call < self.failures {
            return Err(TransportError::Status {
                status: 503,
                body: "collector unavailable".to_string(),
            });
        }

        self.delivered.lock().unwrap().push(batch.clone());
        Ok(Ack {
            status: 200,
            accepted: batch.record_count,
        })
    }
}

/// Never answers within a test's lifetime
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn send(&self, _batch: &EncodedBatch) -> Result<Ack, TransportError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(TransportError::Timeout)
    }
}

/// Blocks its worker thread, so no cancellation can interrupt the send
pub struct StuckTransport {
    pub block_for: Duration,
}

#[async_trait]
impl Transport for StuckTransport {
    async fn send(&self, _batch: &EncodedBatch) -> Result<Ack, TransportError> {
        std::thread::sleep(self.block_for);
        Err(TransportError::Timeout)
    }
}

/// Live sink that rejects every push
pub struct FailingLiveSink {
    pub pushes: AtomicU32,
}

impl FailingLiveSink {
    pub fn new() -> Self {
        Self {
            pushes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LiveSink for FailingLiveSink {
    async fn push(&self, _record: &TelemetryRecord) -> Result<(), TransportError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Network("live endpoint unreachable".to_string()))
    }
}

/// Fast-retry configuration; memory-only cache unless `cache_dir` is given
pub fn test_config(cache_dir: Option<&Path>) -> Config {
    let mut config = Config::default();
    config.collector.connection_string = Some("InstrumentationKey=integration-test".to_string());
    config.batching.max_batch_size = 10;
    config.batching.max_batch_age_ms = 50;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 40;
    config.retry.jitter_ratio = 0.0;
    config.retry.scan_interval_ms = 10;
    match cache_dir {
        Some(dir) => {
            config.retry.disk_retry_enabled = true;
            config.retry.cache_dir = dir.to_path_buf();
        }
        None => config.retry.disk_retry_enabled = false,
    }
    config
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
