//! Sender task: first delivery attempt for every sealed batch

use super::{Transport, TransportError};
use crate::cache::{BackoffPolicy, RetryCache, RetryCacheEntry};
use crate::observability::{PipelineCounter, PipelineStats};
use crate::record::Batch;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What happened to a dispatched batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Collector acknowledged the batch
    Delivered,
    /// Send failed; batch is in the retry cache
    Cached,
    /// Send failed and the batch could not be kept
    Dropped,
}

/// Deadline for sends made after shutdown has begun.
///
/// Once it passes, in-flight and later sends are abandoned and their batches
/// go straight to the retry cache.
#[derive(Debug, Clone)]
pub struct FlushDeadline {
    shutdown: CancellationToken,
    at: Arc<OnceLock<Instant>>,
}

impl FlushDeadline {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            at: Arc::new(OnceLock::new()),
        }
    }

    /// Fix the deadline and cancel the shutdown token. Only the first call
    /// sets the deadline.
    pub fn begin(&self, at: Instant) {
        let _ = self.at.set(at);
        self.shutdown.cancel();
    }

    /// Resolves once shutdown has begun and its deadline has passed
    pub async fn expired(&self) {
        self.shutdown.cancelled().await;
        match self.at.get() {
            Some(at) => tokio::time::sleep_until(*at).await,
            None => std::future::pending().await,
        }
    }
}

/// Consumes sealed batches and hands failures to the retry cache
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    cache: Arc<RetryCache>,
    policy: BackoffPolicy,
    max_attempts: u32,
    instrumentation_key: String,
    stats: Arc<PipelineStats>,
    flush: Option<FlushDeadline>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<RetryCache>,
        policy: BackoffPolicy,
        max_attempts: u32,
        instrumentation_key: impl Into<String>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            transport,
            cache,
            policy,
            max_attempts,
            instrumentation_key: instrumentation_key.into(),
            stats,
            flush: None,
        }
    }

    /// Bound sends made during shutdown by `flush`
    pub fn with_flush_deadline(mut self, flush: FlushDeadline) -> Self {
        self.flush = Some(flush);
        self
    }

    /// Run until the batch channel closes
    pub async fn run(self, mut rx: mpsc::Receiver<Batch>) {
        while let Some(batch) = rx.recv().await {
            self.dispatch(batch).await;
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Send one batch; on failure persist it for retry
    pub async fn dispatch(&self, batch: Batch) -> DispatchOutcome {
        let records = batch.len() as u64;
        let outcome = self.try_dispatch(batch).await;

        self.stats.incr(PipelineCounter::RecordsDispatched, records);
        if outcome == DispatchOutcome::Dropped {
            self.stats.incr(PipelineCounter::RecordsDropped, records);
        }

        outcome
    }

    async fn try_dispatch(&self, batch: Batch) -> DispatchOutcome {
        let encoded = match batch.encode(&self.instrumentation_key) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(batch_id = %batch.id(), error = %e, "Failed to encode batch");
                return DispatchOutcome::Dropped;
            }
        };

        let sent = match &self.flush {
            Some(flush) => tokio::select! {
                result = self.transport.send(&encoded) => result,
                _ = flush.expired() => {
                    tracing::warn!(
                        batch_id = %encoded.batch_id,
                        records = encoded.record_count,
                        "Shutdown deadline reached during send"
                    );
                    Err(TransportError::Timeout)
                }
            },
            None => self.transport.send(&encoded).await,
        };

        let err = match sent {
            Ok(ack) => {
                tracing::debug!(
                    batch_id = %encoded.batch_id,
                    records = encoded.record_count,
                    status = ack.status,
                    "Batch delivered"
                );
                self.stats.incr(PipelineCounter::BatchesDelivered, 1);
                return DispatchOutcome::Delivered;
            }
            Err(err) => err,
        };

        if self.max_attempts <= 1 {
            tracing::warn!(
                batch_id = %encoded.batch_id,
                error = %err,
                "Batch send failed and retries are disabled, dropping"
            );
            self.stats.incr(PipelineCounter::BatchesDropped, 1);
            return DispatchOutcome::Dropped;
        }

        let next_retry_at = self.policy.next_retry_at(1);
        tracing::warn!(
            batch_id = %encoded.batch_id,
            records = encoded.record_count,
            error = %err,
            next_retry_at = %next_retry_at,
            "Batch send failed, caching for retry"
        );

        let batch_id = encoded.batch_id;
        match self
            .cache
            .store(RetryCacheEntry::first_failure(encoded, next_retry_at))
            .await
        {
            Ok(_) => {
                self.stats.incr(PipelineCounter::BatchesCached, 1);
                DispatchOutcome::Cached
            }
            Err(e) => {
                tracing::error!(batch_id = %batch_id, error = %e, "Failed to cache batch, dropping");
                self.stats.incr(PipelineCounter::BatchesDropped, 1);
                DispatchOutcome::Dropped
            }
        }
    }
}
