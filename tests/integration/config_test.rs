//! Configuration loading

use insight_relay::config::Config;
use insight_relay::observability::LogFormat;
use std::collections::HashMap;

#[test]
fn test_config_example_matches_defaults() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example")).unwrap();
    let defaults = Config::default();

    assert!(config.collector.connection_string.is_none());
    assert_eq!(config.batching.max_batch_size, defaults.batching.max_batch_size);
    assert_eq!(config.batching.max_batch_age_ms, defaults.batching.max_batch_age_ms);
    assert_eq!(config.retry.max_attempts, defaults.retry.max_attempts);
    assert_eq!(config.retry.max_delay_ms, defaults.retry.max_delay_ms);
    assert_eq!(config.retry.max_cache_bytes, defaults.retry.max_cache_bytes);
    assert_eq!(config.live_metrics.max_per_second, defaults.live_metrics.max_per_second);
    assert_eq!(config.performance.enabled, defaults.performance.enabled);
    assert_eq!(config.performance.interval_ms, defaults.performance.interval_ms);
    assert_eq!(config.observability.log_format, LogFormat::Pretty);
}

#[test]
fn test_env_overrides_file() {
    let toml = r#"
        [batching]
        max_batch_size = 100

        [live_metrics]
        enabled = false
    "#;
    let mut config: Config = toml::from_str(toml).unwrap();

    let env: HashMap<&str, &str> = [
        ("AZURE_APP_INSIGHTS_CONNECTION_STRING", "InstrumentationKey=abc"),
        ("INSIGHT_MAX_BATCH_SIZE", "250"),
        ("INSIGHT_LIVE_METRICS", "true"),
        ("INSIGHT_MAX_ATTEMPTS", "not-a-number"),
    ]
    .into_iter()
    .collect();
    config.apply_env(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(
        config.collector.connection_string.as_deref(),
        Some("InstrumentationKey=abc")
    );
    assert_eq!(config.batching.max_batch_size, 250);
    assert!(config.live_metrics.enabled);
    // Invalid value ignored
    assert_eq!(config.retry.max_attempts, 10);
}
