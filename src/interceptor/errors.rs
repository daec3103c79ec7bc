//! Handler errors and panic capture

use crate::client::TelemetryClient;
use crate::record::{ExceptionRecord, Severity};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

/// Error returned by instrumented handlers
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::NotFound(_) => StatusCode::NOT_FOUND,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Marker left on error responses so [`capture_errors`] can report them
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub message: String,
    pub stack_trace: String,
    pub status: StatusCode,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let failure = match &self {
            HandlerError::Internal(e) => HandlerFailure {
                message: e.to_string(),
                stack_trace: e
                    .chain()
                    .skip(1)
                    .map(|cause| format!("caused by: {}", cause))
                    .collect::<Vec<_>>()
                    .join("\n"),
                status,
            },
            other => HandlerFailure {
                message: other.to_string(),
                stack_trace: String::new(),
                status,
            },
        };

        // Internal details stay out of 5xx bodies
        let public = if status.is_server_error() {
            "An error occurred".to_string()
        } else {
            failure.message.clone()
        };

        let mut response = (status, Json(json!({ "error": public }))).into_response();
        response.extensions_mut().insert(failure);
        response
    }
}

/// Reports handler failures and turns panics into 500 responses
pub async fn capture_errors(
    State(client): State<TelemetryClient>,
    req: Request,
    next: Next,
) -> Response {
    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(mut response) => {
            if let Some(failure) = response.extensions_mut().remove::<HandlerFailure>() {
                let severity = if failure.status.is_server_error() {
                    Severity::High
                } else {
                    Severity::Low
                };
                client.track_exception(
                    ExceptionRecord::new(failure.message)
                        .with_stack_trace(failure.stack_trace)
                        .with_severity(severity)
                        .with_property("statusCode", failure.status.as_u16().to_string()),
                );
            }
            response
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(panic = %message, "Handler panicked");
            client.track_exception(
                ExceptionRecord::new(format!("handler panicked: {}", message))
                    .with_severity(Severity::High),
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "An error occurred" })),
            )
                .into_response()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
