//! Transport types

use thiserror::Error;

/// Acknowledgement of a delivered batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// HTTP status returned by the collector
    pub status: u16,
    /// Records the collector accepted
    pub accepted: usize,
}

/// Delivery failures. Never surfaced to application code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),
    /// Collector answered with a non-2xx status
    #[error("collector returned {status}: {body}")]
    Status { status: u16, body: String },
    /// No response within the send timeout
    #[error("request timed out")]
    Timeout,
    /// HTTP client could not be built
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl TransportError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}
