//! Local observability for the relay itself
//!
//! Logging and self-metrics; never forwarded to the collector.

mod logging;
mod metrics;

pub use self::metrics::{set_gauge, GaugeMetric, PipelineCounter, PipelineStats, StatsSnapshot};
pub use logging::{init_logging, LogFormat};

use crate::config::ObservabilityConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize logging and, when a port is configured, the Prometheus exporter.
///
/// Must be called from within a Tokio runtime when `metrics_port` is set.
pub fn init_observability(config: &ObservabilityConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level, config.log_format)?;

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
        tracing::info!(port, "Prometheus metrics exporter listening");
    }

    Ok(())
}
