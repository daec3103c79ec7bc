//! Live stream sampling

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Deterministic fraction sampler with a per-second ceiling
#[derive(Debug)]
pub struct Sampler {
    rate: f64,
    max_per_second: u32,
    seen: AtomicU64,
    window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    admitted: u32,
}

impl Sampler {
    /// `rate` is clamped to [0, 1]; `max_per_second == 0` means no ceiling
    pub fn new(rate: f64, max_per_second: u32) -> Self {
        let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            rate,
            max_per_second,
            seen: AtomicU64::new(0),
            window: Mutex::new(Window {
                started: Instant::now(),
                admitted: 0,
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whether the next record should be streamed
    pub fn sample(&self) -> bool {
        if !self.passes_fraction() {
            return false;
        }
        self.admit_within_rate(Instant::now())
    }

    // Keeps exactly floor(n * rate) of the first n records
    fn passes_fraction(&self) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        let n = self.seen.fetch_add(1, Ordering::Relaxed) as f64;
        ((n + 1.0) * self.rate).floor() > (n * self.rate).floor()
    }

    fn admit_within_rate(&self, now: Instant) -> bool {
        if self.max_per_second == 0 {
            return true;
        }

        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if now.duration_since(window.started) >= Duration::from_secs(1) {
            window.started = now;
            window.admitted = 0;
        }
        if window.admitted >= self.max_per_second {
            return false;
        }
        window.admitted += 1;
        true
    }
}
