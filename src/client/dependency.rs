//! Outbound call tracking
//!
//! Wrappers that time a call the application makes and record it as a
//! dependency. The call's own result is always returned unchanged.

use super::TelemetryClient;
use crate::record::DependencyRecord;
use std::future::Future;
use std::time::Instant;

/// Dependency type recorded for HTTP calls
pub const HTTP_DEPENDENCY_TYPE: &str = "HTTP";

impl TelemetryClient {
    /// Send an HTTP request and record it as a dependency.
    ///
    /// The target is the request host (with port when explicit), the name is
    /// `METHOD path` and the data is the URL without its query. A request
    /// that never got a response is recorded with result code 0.
    pub async fn track_http(
        &self,
        request: reqwest::RequestBuilder,
    ) -> reqwest::Result<reqwest::Response> {
        let (client, request) = request.build_split();
        let request = request?;

        let mut url = request.url().clone();
        let target = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => url.scheme().to_string(),
        };
        let name = format!("{} {}", request.method(), url.path());
        url.set_query(None);
        url.set_fragment(None);

        let started = Instant::now();
        let result = client.execute(request).await;
        let elapsed = started.elapsed();

        let (result_code, success) = match &result {
            Ok(response) => (
                i32::from(response.status().as_u16()),
                response.status().is_success(),
            ),
            Err(e) => {
                tracing::debug!(host = %target, error = %e, "Outbound HTTP call failed");
                (0, false)
            }
        };

        self.track_dependency(
            DependencyRecord::new(target, name)
                .with_data(url.as_str())
                .with_duration(elapsed)
                .with_result(result_code, success)
                .with_type_name(HTTP_DEPENDENCY_TYPE),
        );

        result
    }

    /// Time any fallible call and record it as a dependency.
    ///
    /// `Ok` is recorded as success with result code 0, `Err` as failure with
    /// result code -1.
    pub async fn track_call<T, E, F>(
        &self,
        target: &str,
        name: &str,
        type_name: &str,
        call: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = call.await;

        let (result_code, success) = match &result {
            Ok(_) => (0, true),
            Err(_) => (-1, false),
        };
        self.track_dependency(
            DependencyRecord::new(target, name)
                .with_duration(started.elapsed())
                .with_result(result_code, success)
                .with_type_name(type_name),
        );

        result
    }
}
