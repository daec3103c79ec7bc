//! Live metrics channel
//!
//! A lossy, low-latency side stream of sampled records. It has its own small
//! buffer and never touches the retry cache: anything that cannot be pushed
//! right away is dropped.

mod sampler;
mod sink;

pub use sampler::Sampler;
pub use sink::{HttpLiveSink, LiveSink, LIVE_POST_PATH};

use crate::config::LiveMetricsConfig;
use crate::observability::{PipelineCounter, PipelineStats};
use crate::record::TelemetryRecord;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Producer side of the live stream, held by the client
pub struct LiveChannel {
    tx: mpsc::Sender<TelemetryRecord>,
    sampler: Sampler,
    stats: Arc<PipelineStats>,
}

impl LiveChannel {
    /// Start the streamer task
    pub fn spawn(
        config: &LiveMetricsConfig,
        sink: Arc<dyn LiveSink>,
        stats: Arc<PipelineStats>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let handle = tokio::spawn(stream(rx, sink, stats.clone(), shutdown));

        let channel = Self {
            tx,
            sampler: Sampler::new(config.sample_rate, config.max_per_second),
            stats,
        };
        (channel, handle)
    }

    /// Offer a record; never blocks
    pub fn offer(&self, record: &TelemetryRecord) {
        if !self.sampler.sample() {
            return;
        }
        if self.tx.try_send(record.clone()).is_err() {
            self.stats.incr(PipelineCounter::LiveDropped, 1);
        }
    }
}

async fn stream(
    mut rx: mpsc::Receiver<TelemetryRecord>,
    sink: Arc<dyn LiveSink>,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            record = rx.recv() => {
                let Some(record) = record else { break };
                match sink.push(&record).await {
                    Ok(()) => stats.incr(PipelineCounter::LiveSent, 1),
                    Err(e) => {
                        tracing::debug!(error = %e, kind = record.kind(), "Live push failed, dropping");
                        stats.incr(PipelineCounter::LiveDropped, 1);
                    }
                }
            }
        }
    }

    tracing::debug!("Live metrics stream stopped");
}
