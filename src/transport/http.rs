//! HTTP transport to the ingestion endpoint

use super::{Ack, Transport, TransportError};
use crate::record::EncodedBatch;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Path appended to the ingestion endpoint
pub const TRACK_PATH: &str = "/v2/track";

/// Posts encoded batches to the collector over HTTPS
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for the given ingestion endpoint
    pub fn new(ingestion_endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", ingestion_endpoint.trim_end_matches('/'), TRACK_PATH),
        })
    }

    /// Full submission URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &EncodedBatch) -> Result<Ack, TransportError> {
        tracing::debug!(
            url = %self.url,
            batch_id = %batch.batch_id,
            records = batch.record_count,
            "Posting telemetry batch"
        );

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header("x-batch-id", batch.batch_id.to_string())
            .body(batch.payload.clone())
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Ack {
            status: status.as_u16(),
            accepted: batch.record_count,
        })
    }
}
