//! Per-request reporting guard

use crate::client::TelemetryClient;
use crate::record::RequestRecord;
use axum::http::StatusCode;
use std::time::Instant;

/// Lifecycle of an intercepted request. `Reported` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Started,
    Completed,
    Reported,
}

/// Emits exactly one [`RequestRecord`] per request.
///
/// A guard dropped before it was reported (the handler future was cancelled
/// or unwound) reports the request with status 500.
pub struct RequestGuard {
    client: TelemetryClient,
    method: String,
    path: String,
    started: Instant,
    status: StatusCode,
    phase: RequestPhase,
}

impl RequestGuard {
    pub fn start(
        client: TelemetryClient,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            client,
            method: method.into(),
            path: path.into(),
            started: Instant::now(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            phase: RequestPhase::Started,
        }
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Record the final status. Ignored once completed.
    pub fn complete(&mut self, status: StatusCode) {
        if self.phase == RequestPhase::Started {
            self.status = status;
            self.phase = RequestPhase::Completed;
        }
    }

    /// Emit the request record
    pub fn report(mut self) {
        self.emit();
    }

    fn emit(&mut self) {
        if self.phase == RequestPhase::Reported {
            return;
        }
        if self.phase == RequestPhase::Started {
            self.complete(StatusCode::INTERNAL_SERVER_ERROR);
        }

        self.client.track_request(RequestRecord::new(
            self.method.clone(),
            self.path.clone(),
            self.status.as_u16(),
            self.started.elapsed(),
        ));
        self.phase = RequestPhase::Reported;
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.phase != RequestPhase::Reported {
            tracing::debug!(method = %self.method, path = %self.path, "Request ended without a response");
            self.emit();
        }
    }
}
