//! insight-relay: in-process telemetry capture for axum services
//!
//! This library provides:
//! - Typed telemetry records (events, metrics, exceptions, dependencies, requests)
//! - A non-blocking client handle for recording them
//! - Size- and age-based batching on a single background writer
//! - HTTP delivery with a bounded, durable retry cache and exponential backoff
//! - An optional sampled live metrics stream
//! - Outbound call tracking and optional periodic performance metrics
//! - axum middleware reporting every request and handler failure
//!
//! ```ignore
//! let (client, pipeline) = insight_relay::pipeline::init(config).await;
//! let app = Router::new().route("/", get(index)).with_telemetry(client.clone());
//! // ...
//! pipeline.shutdown().await;
//! ```

pub mod buffer;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod interceptor;
pub mod live;
pub mod observability;
pub mod performance;
pub mod pipeline;
pub mod record;
pub mod transport;

pub use client::TelemetryClient;
pub use interceptor::TelemetryRouterExt;
pub use pipeline::{PipelineBuilder, PipelineHandle, ShutdownReport};
