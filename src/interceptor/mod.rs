//! Request interceptor
//!
//! axum middleware that reports one [`RequestRecord`](crate::record::RequestRecord)
//! per request, plus an inner error-capture layer that reports handler
//! failures and panics as exceptions.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/", get(index))
//!     .with_telemetry(client.clone());
//! ```

mod errors;
mod guard;

pub use errors::{capture_errors, HandlerError, HandlerFailure};
pub use guard::{RequestGuard, RequestPhase};

use crate::client::TelemetryClient;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;

/// Times the request and reports it once the response is ready
pub async fn track_requests(
    State(client): State<TelemetryClient>,
    req: Request,
    next: Next,
) -> Response {
    let mut guard = RequestGuard::start(client, req.method().as_str(), req.uri().path());
    let response = next.run(req).await;
    guard.complete(response.status());
    guard.report();
    response
}

/// Wrap every route of `router` with request tracking and error capture
pub fn instrument<S>(router: Router<S>, client: TelemetryClient) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(middleware::from_fn_with_state(client.clone(), capture_errors))
        .layer(middleware::from_fn_with_state(client, track_requests))
}

/// Extension trait for adding telemetry to a router
pub trait TelemetryRouterExt {
    fn with_telemetry(self, client: TelemetryClient) -> Self;
}

impl<S> TelemetryRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_telemetry(self, client: TelemetryClient) -> Self {
        instrument(self, client)
    }
}
