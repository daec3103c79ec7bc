//! Buffer/batcher module
//!
//! Accumulates records into batches sealed by size or age, and drains on
//! shutdown.

mod batcher;

pub use batcher::{Batcher, BatcherConfig};

use crate::config::BatchingConfig;

impl From<&BatchingConfig> for BatcherConfig {
    fn from(config: &BatchingConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            max_batch_age: config.max_batch_age(),
        }
    }
}
