//! Cache command implementation

use crate::cache::{CacheLimits, RetryCache};
use crate::config::Config;
use crate::observability::PipelineStats;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Cache directory (defaults to `retry.cache_dir`)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

impl CacheArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dir = self
            .dir
            .clone()
            .unwrap_or_else(|| config.retry.cache_dir.clone());
        let cache = RetryCache::open(
            &dir,
            CacheLimits::from(&config.retry),
            Arc::new(PipelineStats::new()),
        )
        .await?;

        let entries = cache.entries().await;
        println!("Retry cache at {}", dir.display());
        println!(
            "  Entries: {}  Bytes: {}",
            entries.len(),
            cache.total_bytes().await
        );
        for entry in entries {
            println!(
                "  {}  records={}  attempts={}  next_retry={}",
                entry.batch_id,
                entry.record_count,
                entry.attempts,
                entry.next_retry_at.to_rfc3339()
            );
        }

        Ok(())
    }
}
