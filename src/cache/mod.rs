//! Retry cache
//!
//! Undelivered batches are kept here, on disk when enabled, and resubmitted
//! by [`RetryWorker`] with exponential backoff until delivered, evicted or
//! out of attempts.

mod backoff;
mod retry;
mod store;

pub use backoff::BackoffPolicy;
pub use retry::{RetryPass, RetryWorker};
pub use store::{CacheError, CacheLimits, RetryCache, RetryCacheEntry};

use crate::config::RetryConfig;

impl From<&RetryConfig> for CacheLimits {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_entries: config.max_cache_entries,
            max_bytes: config.max_cache_bytes,
        }
    }
}
