//! Record model
//!
//! Typed telemetry records (event, metric, exception, dependency, request),
//! the batches they travel in, and the clock that stamps them.

mod batch;
mod clock;
mod types;

pub use batch::{Batch, BatchEnvelope, EncodedBatch, OpenBatch};
pub use clock::MonotonicClock;
pub use types::{
    DependencyRecord, EventRecord, ExceptionRecord, MetricRecord, Properties, RecordBody,
    RequestRecord, Severity, TelemetryRecord, TrackingError,
};
