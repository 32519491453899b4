//! Politeness throttle for independent match-detail fetches.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Spaces out callers so that consecutive acquisitions are at least
/// `min_interval` apart, plus up to `jitter` of extra delay.
#[derive(Clone)]
pub struct RateLimiter {
    next_slot: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
    jitter: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `min_interval` - Minimum time between two acquisitions
    /// * `jitter` - Upper bound of the random extra delay per acquisition
    pub fn new(min_interval: Duration, jitter: Duration) -> Self {
        Self {
            next_slot: Arc::new(Mutex::new(None)),
            min_interval,
            jitter,
        }
    }

    /// Throttle with 20% jitter on top of the interval
    pub fn with_interval(min_interval: Duration) -> Self {
        Self::new(min_interval, min_interval / 5)
    }

    /// Wait until the next slot is free, then claim it
    pub async fn acquire(&self) {
        let wait_until = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(slot + self.min_interval + self.jitter.mul_f64(rand_factor()));
            slot
        };

        tokio::time::sleep_until(wait_until).await;
    }
}

/// Generate a pseudo-random factor (0.0 - 1.0)
fn rand_factor() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5), Duration::ZERO);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_acquisitions_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(40), Duration::ZERO);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // Three slots: 0, 40, 80ms
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_rand_factor_range() {
        let f = rand_factor();
        assert!((0.0..1.0).contains(&f));
    }
}
