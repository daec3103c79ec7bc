//! Exponential backoff with jitter

use crate::config::RetryConfig;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::time::Duration;

/// Retry delay policy: `min(base * 2^(attempt-1), cap)` plus jitter
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter as a fraction of the capped delay, in [0, 1]
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            jitter_ratio: 0.1,
        }
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter_ratio: config.jitter_ratio,
        }
    }
}

impl BackoffPolicy {
    /// Delay after `attempt` failed sends (1-based), before jitter
    pub fn base_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay after `attempt` failed sends, with random jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, jitter_sample())
    }

    /// Delay with an explicit jitter sample in [0, 1)
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.base_for(attempt);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0) * sample.clamp(0.0, 1.0);
        base + base.mul_f64(ratio)
    }

    /// Wall-clock time of the next attempt
    pub fn next_retry_at(&self, attempt: u32) -> DateTime<Utc> {
        deadline_after(Utc::now(), self.delay(attempt))
    }
}

fn deadline_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(delay).unwrap_or(TimeDelta::days(1));
    now.checked_add_signed(delta).unwrap_or(now)
}

/// Uniform sample in [0, 1)
fn jitter_sample() -> f64 {
    rand::thread_rng().gen_range(0.0..1.0)
}
