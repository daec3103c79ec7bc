use clap::Parser;
use insight_relay::cli::{Cli, Commands};
use insight_relay::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });
    config.apply_env(|key| std::env::var(key).ok());

    // Initialize logging and self-metrics
    insight_relay::observability::init_observability(&config.observability)?;

    match cli.command {
        Commands::Serve(args) => {
            tracing::info!("Starting demo server");
            args.execute(config).await?;
        }
        Commands::Cache(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Collector: {}",
                if config.collector.connection_string.is_some() {
                    "configured"
                } else {
                    "not configured (telemetry disabled)"
                }
            );
            println!(
                "  Batching: size={}, age={}ms, queue={}",
                config.batching.max_batch_size,
                config.batching.max_batch_age_ms,
                config.batching.queue_capacity
            );
            println!(
                "  Retry: attempts={}, base={}ms, max={}ms, disk={} ({})",
                config.retry.max_attempts,
                config.retry.base_delay_ms,
                config.retry.max_delay_ms,
                config.retry.disk_retry_enabled,
                config.retry.cache_dir.display()
            );
            println!(
                "  Live metrics: enabled={}, sample_rate={}",
                config.live_metrics.enabled, config.live_metrics.sample_rate
            );
            println!(
                "  Logging: level={}, format={:?}",
                config.observability.log_level, config.observability.log_format
            );
        }
    }

    Ok(())
}
