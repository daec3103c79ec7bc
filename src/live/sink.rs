//! Live stream destinations

use crate::record::TelemetryRecord;
use crate::transport::TransportError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Path appended to the live endpoint
pub const LIVE_POST_PATH: &str = "/QuickPulseService.svc/post";

/// Trait for live stream destinations
#[async_trait]
pub trait LiveSink: Send + Sync {
    /// Push one record; failures are reported but never retried
    async fn push(&self, record: &TelemetryRecord) -> Result<(), TransportError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivePost<'a> {
    instrumentation_key: &'a str,
    record: &'a TelemetryRecord,
}

/// Posts sampled records to the live metrics endpoint
pub struct HttpLiveSink {
    client: Client,
    url: String,
    instrumentation_key: String,
}

impl HttpLiveSink {
    pub fn new(
        live_endpoint: &str,
        instrumentation_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", live_endpoint.trim_end_matches('/'), LIVE_POST_PATH),
            instrumentation_key: instrumentation_key.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LiveSink for HttpLiveSink {
    async fn push(&self, record: &TelemetryRecord) -> Result<(), TransportError> {
        let body = LivePost {
            instrumentation_key: &self.instrumentation_key,
            record,
        };

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        Ok(())
    }
}
