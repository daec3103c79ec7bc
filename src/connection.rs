//! Collector connection string parsing
//!
//! Format: `InstrumentationKey=<key>;IngestionEndpoint=<url>;LiveEndpoint=<url>;ApplicationId=<id>`.
//! Keys are case-insensitive; unknown keys are ignored.

use reqwest::Url;
use std::str::FromStr;
use thiserror::Error;

/// Ingestion endpoint used when the connection string does not name one
pub const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com";
/// Live metrics endpoint used when the connection string does not name one
pub const DEFAULT_LIVE_ENDPOINT: &str = "https://rt.services.visualstudio.com";

/// Connection string errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("connection string is empty")]
    Empty,
    #[error("connection string has no InstrumentationKey")]
    MissingInstrumentationKey,
    #[error("malformed connection string segment `{0}`")]
    MalformedSegment(String),
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
}

/// Parsed collector connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub instrumentation_key: String,
    pub ingestion_endpoint: String,
    pub live_endpoint: String,
    pub application_id: Option<String>,
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        let mut instrumentation_key = None;
        let mut ingestion_endpoint = None;
        let mut live_endpoint = None;
        let mut application_id = None;

        for segment in s.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "instrumentationkey" => instrumentation_key = Some(value.to_string()),
                "ingestionendpoint" => ingestion_endpoint = Some(normalize_endpoint(value)?),
                "liveendpoint" => live_endpoint = Some(normalize_endpoint(value)?),
                "applicationid" => application_id = Some(value.to_string()),
                _ => {}
            }
        }

        let instrumentation_key = instrumentation_key
            .filter(|k| !k.is_empty())
            .ok_or(ConnectionStringError::MissingInstrumentationKey)?;

        Ok(Self {
            instrumentation_key,
            ingestion_endpoint: ingestion_endpoint
                .unwrap_or_else(|| DEFAULT_INGESTION_ENDPOINT.to_string()),
            live_endpoint: live_endpoint.unwrap_or_else(|| DEFAULT_LIVE_ENDPOINT.to_string()),
            application_id,
        })
    }
}

fn normalize_endpoint(value: &str) -> Result<String, ConnectionStringError> {
    let url = Url::parse(value)
        .map_err(|_| ConnectionStringError::InvalidEndpoint(value.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConnectionStringError::InvalidEndpoint(value.to_string()));
    }
    Ok(value.trim_end_matches('/').to_string())
}
