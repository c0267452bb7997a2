//! Minimum call interval limiter, one slot per provider.
//!
//! Fragile upstreams get a configurable gap between consecutive calls.
//! Unlike a failing limiter, callers wait for their slot rather than
//! erroring: fan-out latency absorbs the spacing.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::time::{sleep, Duration, Instant};

/// Pool of per-provider interval limiters.
pub struct IntervalLimiter {
    intervals: HashMap<String, Duration>,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl IntervalLimiter {
    /// Build the pool from (provider, minimum interval) pairs. Providers
    /// absent from the map are not limited.
    pub fn new(intervals: HashMap<String, Duration>) -> Self {
        Self {
            intervals,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Wait until this provider's next call slot. Concurrent callers are
    /// serialized: each reserves the slot after the previous one.
    pub async fn acquire(&self, provider: &str) {
        let Some(interval) = self.intervals.get(provider).copied() else {
            return;
        };
        if interval.is_zero() {
            return;
        }

        let wait = {
            let mut slots = self.next_slot.lock().expect("limiter lock poisoned");
            let now = Instant::now();
            let slot = slots
                .get(provider)
                .copied()
                .map_or(now, |next| next.max(now));
            slots.insert(provider.to_string(), slot + interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// The configured interval for a provider, if any.
    pub fn interval(&self, provider: &str) -> Option<Duration> {
        self.intervals.get(provider).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_provider_returns_immediately() {
        let limiter = IntervalLimiter::empty();
        let start = Instant::now();
        limiter.acquire("anything").await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_first_call_is_not_delayed() {
        let limiter = IntervalLimiter::new(HashMap::from([(
            "slow".to_string(),
            Duration::from_millis(200),
        )]));
        let start = Instant::now();
        limiter.acquire("slow").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_second_call_waits_for_interval() {
        let limiter = IntervalLimiter::new(HashMap::from([(
            "slow".to_string(),
            Duration::from_millis(50),
        )]));
        let start = Instant::now();
        limiter.acquire("slow").await;
        limiter.acquire("slow").await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_intervals_are_per_provider() {
        let limiter = IntervalLimiter::new(HashMap::from([(
            "slow".to_string(),
            Duration::from_millis(200),
        )]));
        limiter.acquire("slow").await;

        // A different provider is unaffected by slow's reservation.
        let start = Instant::now();
        limiter.acquire("other").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        use std::sync::Arc;

        let limiter = Arc::new(IntervalLimiter::new(HashMap::from([(
            "slow".to_string(),
            Duration::from_millis(100),
        )])));

        let start = Instant::now();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire("slow").await;
                    Instant::now()
                })
            })
            .collect();

        let mut finish_times = Vec::new();
        for task in tasks {
            finish_times.push(task.await.unwrap());
        }
        finish_times.sort();

        // Three callers: slots at +0ms, +100ms, +200ms.
        assert!(finish_times[2].duration_since(start) >= Duration::from_millis(200));
    }

    #[test]
    fn test_interval_lookup() {
        let limiter = IntervalLimiter::new(HashMap::from([(
            "slow".to_string(),
            Duration::from_millis(100),
        )]));
        assert_eq!(limiter.interval("slow"), Some(Duration::from_millis(100)));
        assert_eq!(limiter.interval("other"), None);
    }
}
