//! Transport module
//!
//! Delivers encoded batches to the collector. Failures feed the retry cache.

mod dispatcher;
mod http;
mod types;

pub use dispatcher::{DispatchOutcome, Dispatcher, FlushDeadline};
pub use http::{HttpTransport, TRACK_PATH};
pub use types::{Ack, TransportError};

use crate::record::EncodedBatch;
use async_trait::async_trait;

/// Trait for collector transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one batch. Any non-2xx answer is an error.
    async fn send(&self, batch: &EncodedBatch) -> Result<Ack, TransportError>;
}
