//! Background retry loop over the cache

use super::{BackoffPolicy, RetryCache};
use crate::observability::{PipelineCounter, PipelineStats};
use crate::transport::Transport;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of one scan over the cache
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryPass {
    pub delivered: usize,
    pub rescheduled: usize,
    pub dropped: usize,
}

/// Periodically resubmits cached batches whose retry time has elapsed
pub struct RetryWorker {
    cache: Arc<RetryCache>,
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
    max_attempts: u32,
    scan_interval: Duration,
    stats: Arc<PipelineStats>,
}

impl RetryWorker {
    pub fn new(
        cache: Arc<RetryCache>,
        transport: Arc<dyn Transport>,
        policy: BackoffPolicy,
        max_attempts: u32,
        scan_interval: Duration,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            cache,
            transport,
            policy,
            max_attempts: max_attempts.max(1),
            scan_interval,
            stats,
        }
    }

    /// Run until cancelled. Cancellation interrupts both the wait between
    /// scans and an in-flight scan; interrupted entries stay cached.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                pass = self.retry_due() => {
                    if pass != RetryPass::default() {
                        tracing::debug!(
                            delivered = pass.delivered,
                            rescheduled = pass.rescheduled,
                            dropped = pass.dropped,
                            "Retry pass complete"
                        );
                    }
                }
            }
        }

        tracing::info!("Retry loop stopped");
    }

    /// Resubmit every due entry once
    pub async fn retry_due(&self) -> RetryPass {
        let mut pass = RetryPass::default();

        for entry in self.cache.due(Utc::now()).await {
            self.stats.incr(PipelineCounter::BatchesRetried, 1);

            match self.transport.send(&entry.to_encoded()).await {
                Ok(ack) => {
                    tracing::info!(
                        batch_id = %entry.batch_id,
                        attempts = entry.attempts + 1,
                        status = ack.status,
                        "Delivered cached batch"
                    );
                    self.stats.incr(PipelineCounter::BatchesDelivered, 1);
                    if let Err(e) = self.cache.remove(entry.batch_id).await {
                        tracing::warn!(batch_id = %entry.batch_id, error = %e, "Failed to remove delivered entry");
                    }
                    pass.delivered += 1;
                }
                Err(err) => {
                    let attempts = entry.attempts + 1;
                    if attempts >= self.max_attempts {
                        tracing::warn!(
                            batch_id = %entry.batch_id,
                            attempts,
                            records = entry.record_count,
                            error = %err,
                            "Dropping batch after exhausting retries"
                        );
                        self.stats.incr(PipelineCounter::BatchesDropped, 1);
                        self.stats
                            .incr(PipelineCounter::RecordsDropped, entry.record_count as u64);
                        if let Err(e) = self.cache.remove(entry.batch_id).await {
                            tracing::warn!(batch_id = %entry.batch_id, error = %e, "Failed to remove dropped entry");
                        }
                        pass.dropped += 1;
                    } else {
                        let next_retry_at = self.policy.next_retry_at(attempts);
                        tracing::debug!(
                            batch_id = %entry.batch_id,
                            attempts,
                            next_retry_at = %next_retry_at,
                            error = %err,
                            "Retry failed, rescheduling"
                        );
                        if let Err(e) = self
                            .cache
                            .reschedule(entry.batch_id, attempts, next_retry_at)
                            .await
                        {
                            tracing::warn!(batch_id = %entry.batch_id, error = %e, "Failed to reschedule entry");
                        }
                        pass.rescheduled += 1;
                    }
                }
            }
        }

        pass
    }
}
