//! Configuration types for insight-relay
//!
//! Loaded from a TOML file, then overridden from the environment. Every field
//! has a default, so an empty file (or no file) is a valid configuration.

use crate::observability::LogFormat;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Primary connection string variable
pub const ENV_CONNECTION_STRING: &str = "APPLICATIONINSIGHTS_CONNECTION_STRING";
/// Fallback connection string variable
pub const ENV_CONNECTION_STRING_FALLBACK: &str = "AZURE_APP_INSIGHTS_CONNECTION_STRING";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub live_metrics: LiveMetricsConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Collector connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// `InstrumentationKey=...;IngestionEndpoint=...` string.
    /// When absent the client runs in no-op mode.
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Timeout for a single batch submission (milliseconds)
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Upper bound on the final flush at shutdown (milliseconds)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_send_timeout_ms() -> u64 {
    10_000
}
fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            send_timeout_ms: default_send_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl CollectorConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Batching configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BatchingConfig {
    /// Seal the open batch once it holds this many records
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Seal the open batch once its first record is this old (milliseconds)
    #[serde(default = "default_max_batch_age_ms")]
    pub max_batch_age_ms: u64,

    /// Records buffered between `track_*` callers and the batcher
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_batch_size() -> usize {
    500
}
fn default_max_batch_age_ms() -> u64 {
    15_000
}
fn default_queue_capacity() -> usize {
    10_000
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_batch_age_ms: default_max_batch_age_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl BatchingConfig {
    pub fn max_batch_age(&self) -> Duration {
        Duration::from_millis(self.max_batch_age_ms)
    }
}

/// Retry and durable cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total send attempts before a batch is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after the first failure (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Extra random delay as a fraction of the backoff, in [0, 1]
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// How often the retry loop scans the cache (milliseconds)
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Persist failed batches to disk so they survive restarts
    #[serde(default = "default_true")]
    pub disk_retry_enabled: bool,

    /// Directory for persisted batches
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Maximum number of cached batches
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    /// Maximum total payload bytes held by the cache
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    10
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    300_000 // 5 minutes
}
fn default_jitter_ratio() -> f64 {
    0.1
}
fn default_scan_interval_ms() -> u64 {
    1_000
}
fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("insight-relay")
}
fn default_max_cache_entries() -> usize {
    100
}
fn default_max_cache_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
            scan_interval_ms: default_scan_interval_ms(),
            disk_retry_enabled: true,
            cache_dir: default_cache_dir(),
            max_cache_entries: default_max_cache_entries(),
            max_cache_bytes: default_max_cache_bytes(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(1))
    }
}

/// Live metrics side channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LiveMetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Fraction of records streamed, in [0, 1]
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Hard cap on streamed records per second (0 = unlimited)
    #[serde(default = "default_max_per_second")]
    pub max_per_second: u32,

    /// Records buffered for the streamer before new ones are dropped
    #[serde(default = "default_live_buffer")]
    pub buffer: usize,

    /// Timeout for a single live post (milliseconds)
    #[serde(default = "default_live_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sample_rate() -> f64 {
    1.0
}
fn default_max_per_second() -> u32 {
    50
}
fn default_live_buffer() -> usize {
    64
}
fn default_live_timeout_ms() -> u64 {
    2_000
}

impl Default for LiveMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: default_sample_rate(),
            max_per_second: default_max_per_second(),
            buffer: default_live_buffer(),
            timeout_ms: default_live_timeout_ms(),
        }
    }
}

impl LiveMetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Periodic process and pipeline metrics
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Collection period (milliseconds)
    #[serde(default = "default_performance_interval_ms")]
    pub interval_ms: u64,
}

fn default_performance_interval_ms() -> u64 {
    60_000
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_performance_interval_ms(),
        }
    }
}

impl PerformanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Local logging and self-metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Serve Prometheus self-metrics on this port when set
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults plus process environment overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let connection = lookup(ENV_CONNECTION_STRING)
            .or_else(|| lookup(ENV_CONNECTION_STRING_FALLBACK))
            .filter(|s| !s.trim().is_empty());
        if connection.is_some() {
            self.collector.connection_string = connection;
        }

        override_from(&lookup, "INSIGHT_MAX_BATCH_SIZE", &mut self.batching.max_batch_size);
        override_from(&lookup, "INSIGHT_MAX_BATCH_AGE_MS", &mut self.batching.max_batch_age_ms);
        override_from(&lookup, "INSIGHT_MAX_ATTEMPTS", &mut self.retry.max_attempts);
        override_from(&lookup, "INSIGHT_RETRY_BASE_MS", &mut self.retry.base_delay_ms);
        override_from(&lookup, "INSIGHT_RETRY_MAX_MS", &mut self.retry.max_delay_ms);
        override_from(&lookup, "INSIGHT_CACHE_DIR", &mut self.retry.cache_dir);
        override_from(&lookup, "INSIGHT_DISK_RETRY", &mut self.retry.disk_retry_enabled);
        override_from(&lookup, "INSIGHT_LIVE_METRICS", &mut self.live_metrics.enabled);
        override_from(&lookup, "INSIGHT_LIVE_SAMPLE_RATE", &mut self.live_metrics.sample_rate);
        override_from(&lookup, "INSIGHT_PERFORMANCE", &mut self.performance.enabled);
        override_from(&lookup, "INSIGHT_LOG_LEVEL", &mut self.observability.log_level);
    }
}

fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid environment override");
        }
    }
}
