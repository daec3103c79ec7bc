//! Serve command implementation

use crate::client::TelemetryClient;
use crate::config::Config;
use crate::interceptor::{HandlerError, TelemetryRouterExt};
use crate::pipeline::PipelineBuilder;
use crate::record::{EventRecord, MetricRecord};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use clap::Args;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
}

impl ServeArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let (client, pipeline) = PipelineBuilder::new(config).start().await;

        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        tracing::info!(addr = %listener.local_addr()?, "Server listening");
        client.track_event(
            EventRecord::new("serverStartup").with_property("port", self.port.to_string()),
        );

        axum::serve(listener, demo_router(client))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        let report = pipeline.shutdown().await;
        if !report.completed {
            tracing::warn!(
                unflushed = report.unflushed_records,
                "Telemetry shutdown timed out"
            );
        }

        Ok(())
    }
}

/// Demo routes, instrumented with request tracking and error capture
pub fn demo_router(client: TelemetryClient) -> Router {
    let routes = Router::new()
        .route("/", get(index))
        .route("/api/data", get(data))
        .route("/api/error", get(error))
        .with_state::<()>(client.clone());
    routes.with_telemetry(client)
}

async fn index(State(client): State<TelemetryClient>) -> &'static str {
    client.track_event(
        EventRecord::new("homePageVisited").with_property("customProperty", "customValue"),
    );
    "Hello from insight-relay!"
}

async fn data(State(client): State<TelemetryClient>) -> Json<Value> {
    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    client.track_metric(MetricRecord::new("ProcessingTime", elapsed_ms));

    Json(json!({ "message": "Data processed successfully" }))
}

async fn error() -> Result<Json<Value>, HandlerError> {
    Err(HandlerError::Internal(anyhow::anyhow!("This is a test error")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
