//! Pipeline assembly and shutdown
//!
//! Wires the client queue, batcher, dispatcher and retry loop together with
//! the optional live stream and performance collector, and owns their tasks.

use crate::buffer::{Batcher, BatcherConfig};
use crate::cache::{BackoffPolicy, CacheLimits, RetryCache, RetryWorker};
use crate::client::TelemetryClient;
use crate::config::Config;
use crate::connection::{ConnectionString, ConnectionStringError};
use crate::live::{HttpLiveSink, LiveChannel, LiveSink};
use crate::observability::{PipelineStats, StatsSnapshot};
use crate::performance::PerformanceCollector;
use crate::transport::{Dispatcher, FlushDeadline, HttpTransport, Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sealed batches waiting for the dispatcher
const BATCH_CHANNEL_CAPACITY: usize = 8;
/// Share of the shutdown timeout given to in-flight sends; the rest is left
/// for caching what they could not deliver
const FLUSH_SHARE: f64 = 0.8;

/// Pipeline setup errors. Any of these leaves telemetry disabled.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("no connection string configured")]
    MissingConnectionString,
    #[error("invalid connection string: {0}")]
    ConnectionString(#[from] ConnectionStringError),
    #[error("failed to create transport: {0}")]
    Transport(#[from] TransportError),
}

/// Builds a running pipeline from configuration
pub struct PipelineBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    live_sink: Option<Arc<dyn LiveSink>>,
}

impl PipelineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            live_sink: None,
        }
    }

    /// Replace the HTTP transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the HTTP live sink
    pub fn live_sink(mut self, sink: Arc<dyn LiveSink>) -> Self {
        self.live_sink = Some(sink);
        self
    }

    /// Start the pipeline, falling back to a disabled client on any setup error
    pub async fn start(self) -> (TelemetryClient, PipelineHandle) {
        match self.try_start().await {
            Ok(started) => started,
            Err(e) => {
                tracing::warn!(error = %e, "Telemetry disabled");
                (TelemetryClient::disabled(e.to_string()), PipelineHandle::inert())
            }
        }
    }

    /// Start the pipeline. Must be called from within a Tokio runtime.
    pub async fn try_start(self) -> Result<(TelemetryClient, PipelineHandle), InitError> {
        let config = self.config;
        let connection: ConnectionString = config
            .collector
            .connection_string
            .as_deref()
            .ok_or(InitError::MissingConnectionString)?
            .parse()?;

        let stats = Arc::new(PipelineStats::new());
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                &connection.ingestion_endpoint,
                config.collector.send_timeout(),
            )?),
        };

        let cache = Arc::new(open_cache(&config, stats.clone()).await);
        let policy = BackoffPolicy::from(&config.retry);
        let shutdown = CancellationToken::new();
        let flush = FlushDeadline::new(shutdown.clone());
        let mut tasks = Vec::new();

        let live = if config.live_metrics.enabled {
            let sink = match self.live_sink {
                Some(sink) => sink,
                None => Arc::new(HttpLiveSink::new(
                    &connection.live_endpoint,
                    connection.instrumentation_key.clone(),
                    config.live_metrics.timeout(),
                )?),
            };
            let (channel, handle) =
                LiveChannel::spawn(&config.live_metrics, sink, stats.clone(), shutdown.clone());
            tasks.push(("live", handle));
            Some(channel)
        } else {
            None
        };

        let (record_tx, record_rx) = mpsc::channel(config.batching.queue_capacity.max(1));
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);

        let batcher = Batcher::new(
            BatcherConfig::from(&config.batching),
            record_rx,
            batch_tx,
            stats.clone(),
        );
        tasks.push(("batcher", tokio::spawn(batcher.run(shutdown.clone()))));

        let dispatcher = Dispatcher::new(
            transport.clone(),
            cache.clone(),
            policy.clone(),
            config.retry.max_attempts,
            connection.instrumentation_key.clone(),
            stats.clone(),
        )
        .with_flush_deadline(flush.clone());
        tasks.push(("dispatcher", tokio::spawn(dispatcher.run(batch_rx))));

        let retry = RetryWorker::new(
            cache.clone(),
            transport,
            policy,
            config.retry.max_attempts,
            config.retry.scan_interval(),
            stats.clone(),
        );
        tasks.push(("retry", tokio::spawn(retry.run(shutdown.clone()))));

        tracing::info!(
            endpoint = %connection.ingestion_endpoint,
            max_batch_size = config.batching.max_batch_size,
            max_batch_age_ms = config.batching.max_batch_age_ms,
            persistent_cache = cache.is_persistent(),
            live_metrics = live.is_some(),
            performance = config.performance.enabled,
            "Telemetry pipeline started"
        );

        let client = TelemetryClient::active(record_tx, live, stats.clone());
        if config.performance.enabled {
            let collector = PerformanceCollector::new(
                client.clone(),
                cache.clone(),
                config.performance.interval(),
            );
            tasks.push(("performance", tokio::spawn(collector.run(shutdown.clone()))));
        }
        let handle = PipelineHandle {
            flush,
            tasks,
            stats,
            cache: Some(cache),
            shutdown_timeout: config.collector.shutdown_timeout(),
        };

        Ok((client, handle))
    }
}

async fn open_cache(config: &Config, stats: Arc<PipelineStats>) -> RetryCache {
    let limits = CacheLimits::from(&config.retry);
    if !config.retry.disk_retry_enabled {
        return RetryCache::in_memory(limits, stats);
    }

    match RetryCache::open(&config.retry.cache_dir, limits, stats.clone()).await {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(
                dir = ?config.retry.cache_dir,
                error = %e,
                "Cannot open retry cache directory, retrying from memory only"
            );
            RetryCache::in_memory(limits, stats)
        }
    }
}

/// Result of a pipeline shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every task stopped before the timeout
    pub completed: bool,
    /// Accepted records that never reached the dispatcher
    pub unflushed_records: u64,
    /// Batches left in the retry cache
    pub cached_batches: usize,
}

/// Owns the background tasks of a running pipeline
pub struct PipelineHandle {
    flush: FlushDeadline,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    stats: Arc<PipelineStats>,
    cache: Option<Arc<RetryCache>>,
    shutdown_timeout: Duration,
}

impl PipelineHandle {
    /// Handle of a disabled pipeline; shutting it down is a no-op
    pub fn inert() -> Self {
        Self {
            flush: FlushDeadline::new(CancellationToken::new()),
            tasks: Vec::new(),
            stats: Arc::new(PipelineStats::new()),
            cache: None,
            shutdown_timeout: Duration::ZERO,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cache(&self) -> Option<&Arc<RetryCache>> {
        self.cache.as_ref()
    }

    /// Shut down with the configured timeout
    pub async fn shutdown(self) -> ShutdownReport {
        let timeout = self.shutdown_timeout;
        self.shutdown_with_timeout(timeout).await
    }

    /// Stop accepting records, flush what is queued and stop every task.
    ///
    /// Sends still in flight at four fifths of the timeout are abandoned
    /// and their batches cached. Tasks still running at the deadline are
    /// aborted; their records are counted as unflushed and dropped.
    pub async fn shutdown_with_timeout(mut self, timeout: Duration) -> ShutdownReport {
        let started = tokio::time::Instant::now();
        let deadline = started + timeout;
        self.flush.begin(started + timeout.mul_f64(FLUSH_SHARE));
        let mut completed = true;

        for (name, handle) in self.tasks.iter_mut() {
            match tokio::time::timeout_at(deadline, &mut *handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(task = *name, error = %e, "Pipeline task failed");
                }
                Err(_) => {
                    tracing::warn!(task = *name, "Pipeline task did not stop in time, aborting");
                    handle.abort();
                    completed = false;
                }
            }
        }

        let stats = self.stats.snapshot();
        let unflushed_records = stats.records_tracked.saturating_sub(stats.records_dispatched);
        let cached_batches = match &self.cache {
            Some(cache) => cache.len().await,
            None => 0,
        };

        if unflushed_records > 0 {
            tracing::warn!(records = unflushed_records, "Dropping unflushed telemetry at shutdown");
        }
        tracing::info!(
            completed,
            tracked = stats.records_tracked,
            delivered_batches = stats.batches_delivered,
            cached_batches,
            "Telemetry pipeline stopped"
        );

        ShutdownReport {
            completed,
            unflushed_records,
            cached_batches,
        }
    }
}

/// Start a pipeline from configuration with the HTTP transport
pub async fn init(config: Config) -> (TelemetryClient, PipelineHandle) {
    PipelineBuilder::new(config).start().await
}
