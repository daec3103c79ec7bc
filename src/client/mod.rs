//! Telemetry client
//!
//! The application-facing handle. Every `track_*` call is synchronous and
//! never performs I/O: the record is stamped, validated, offered to the live
//! channel and queued for the batcher. A full queue drops the record.

mod dependency;

use crate::live::LiveChannel;
use crate::observability::{PipelineCounter, PipelineStats, StatsSnapshot};
use crate::record::{
    DependencyRecord, EventRecord, ExceptionRecord, MetricRecord, MonotonicClock, RecordBody,
    RequestRecord, Severity, TelemetryRecord,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

enum Mode {
    Active {
        tx: mpsc::Sender<TelemetryRecord>,
        live: Option<LiveChannel>,
    },
    Disabled {
        reason: String,
    },
}

struct ClientInner {
    mode: Mode,
    clock: MonotonicClock,
    stats: Arc<PipelineStats>,
    warned: AtomicBool,
}

/// Cloneable handle for recording telemetry
#[derive(Clone)]
pub struct TelemetryClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for TelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl TelemetryClient {
    pub(crate) fn active(
        tx: mpsc::Sender<TelemetryRecord>,
        live: Option<LiveChannel>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self::with_mode(Mode::Active { tx, live }, stats)
    }

    /// A client that accepts every call and records nothing
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::with_mode(
            Mode::Disabled {
                reason: reason.into(),
            },
            Arc::new(PipelineStats::new()),
        )
    }

    fn with_mode(mode: Mode, stats: Arc<PipelineStats>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                mode,
                clock: MonotonicClock::new(),
                stats,
                warned: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.inner.mode, Mode::Active { .. })
    }

    /// Snapshot of the pipeline counters
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Records queued but not yet taken by the batcher
    pub fn queue_depth(&self) -> usize {
        match &self.inner.mode {
            Mode::Active { tx, .. } => tx.max_capacity() - tx.capacity(),
            Mode::Disabled { .. } => 0,
        }
    }

    pub fn track_event(&self, event: EventRecord) {
        self.track(RecordBody::Event(event));
    }

    pub fn track_metric(&self, metric: MetricRecord) {
        self.track(RecordBody::Metric(metric));
    }

    pub fn track_exception(&self, exception: ExceptionRecord) {
        self.track(RecordBody::Exception(exception));
    }

    pub fn track_dependency(&self, dependency: DependencyRecord) {
        self.track(RecordBody::Dependency(dependency));
    }

    pub fn track_request(&self, request: RequestRecord) {
        self.track(RecordBody::Request(request));
    }

    /// Record an error and its source chain as an exception
    pub fn track_error(&self, error: &(dyn std::error::Error + 'static), severity: Severity) {
        self.track_exception(ExceptionRecord::from_error(error).with_severity(severity));
    }

    /// Stamp, validate and enqueue a record
    pub fn track(&self, body: RecordBody) {
        let (tx, live) = match &self.inner.mode {
            Mode::Active { tx, live } => (tx, live),
            Mode::Disabled { reason } => {
                if !self.inner.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(reason = %reason, "Telemetry disabled, records will be discarded");
                } else {
                    tracing::trace!(kind = body.kind(), "Telemetry disabled, record discarded");
                }
                return;
            }
        };

        if let Err(e) = body.validate() {
            tracing::warn!(error = %e, "Rejected invalid telemetry record");
            self.inner.stats.incr(PipelineCounter::RecordsRejected, 1);
            return;
        }

        let record = TelemetryRecord::new(self.inner.clock.now(), body);
        if let Some(live) = live {
            live.offer(&record);
        }

        match tx.try_send(record) {
            Ok(()) => self.inner.stats.incr(PipelineCounter::RecordsTracked, 1),
            Err(TrySendError::Full(record)) => {
                tracing::warn!(kind = record.kind(), "Telemetry queue full, dropping record");
                self.inner.stats.incr(PipelineCounter::RecordsDropped, 1);
            }
            Err(TrySendError::Closed(record)) => {
                tracing::debug!(kind = record.kind(), "Telemetry pipeline stopped, dropping record");
                self.inner.stats.incr(PipelineCounter::RecordsDropped, 1);
            }
        }
    }
}
