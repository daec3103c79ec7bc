//! Batcher task

use crate::observability::{PipelineCounter, PipelineStats};
use crate::record::{Batch, OpenBatch, TelemetryRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for batching
#[derive(Debug, Clone, Copy)]
pub struct BatcherConfig {
    pub max_batch_size: usize,
    pub max_batch_age: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            max_batch_age: Duration::from_secs(15),
        }
    }
}

/// Sole owner of the open batch.
///
/// Records arrive over a channel, so appending and sealing never race.
pub struct Batcher {
    config: BatcherConfig,
    rx: mpsc::Receiver<TelemetryRecord>,
    out: mpsc::Sender<Batch>,
    stats: Arc<PipelineStats>,
}

impl Batcher {
    pub fn new(
        config: BatcherConfig,
        rx: mpsc::Receiver<TelemetryRecord>,
        out: mpsc::Sender<Batch>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let config = BatcherConfig {
            max_batch_size: config.max_batch_size.max(1),
            ..config
        };
        Self {
            config,
            rx,
            out,
            stats,
        }
    }

    /// Run until cancelled or until every record sender is gone.
    ///
    /// Either way the queue is drained and the remainder sealed and forwarded
    /// before returning; dropping `self` then closes the batch channel.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut open = OpenBatch::new(self.config.max_batch_size);

        loop {
            let deadline = open.deadline(self.config.max_batch_age);

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.drain(&mut open).await;
                    tracing::info!("Batcher shutting down");
                    break;
                }

                result = self.rx.recv() => {
                    match result {
                        Some(record) => {
                            open.push(record);
                            if open.len() >= self.config.max_batch_size {
                                self.seal_and_forward(&mut open).await;
                            }
                        }
                        None => {
                            self.seal_and_forward(&mut open).await;
                            tracing::info!("Record channel closed, batcher exiting");
                            break;
                        }
                    }
                }

                _ = sleep_until(deadline) => {
                    self.seal_and_forward(&mut open).await;
                }
            }
        }
    }

    /// Stop accepting, then batch up whatever is still queued
    async fn drain(&mut self, open: &mut OpenBatch) {
        self.rx.close();
        while let Some(record) = self.rx.recv().await {
            open.push(record);
            if open.len() >= self.config.max_batch_size {
                self.seal_and_forward(open).await;
            }
        }
        self.seal_and_forward(open).await;
    }

    async fn seal_and_forward(&self, open: &mut OpenBatch) {
        let Some(batch) = open.seal() else {
            return;
        };

        let count = batch.len();
        self.stats.incr(PipelineCounter::BatchesSealed, 1);
        tracing::debug!(batch_id = %batch.id(), count, "Sealed batch");

        if self.out.send(batch).await.is_err() {
            tracing::warn!(count, "Dispatcher gone, dropping sealed batch");
            self.stats.incr(PipelineCounter::RecordsDropped, count as u64);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
