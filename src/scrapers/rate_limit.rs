//! Sliding-window limiter shared by every outbound upstream call.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use crate::config::RateLimitConfig;

/// Admits at most `max_calls` calls in any window of length `window`.
///
/// Waiters queue on the inner mutex, so permits are handed out in arrival
/// order.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, config.window)
    }

    /// Waits until one more call fits in the window, then records it.
    pub async fn acquire(&self) {
        let mut calls = self.calls.lock().await;
        loop {
            let now = Instant::now();
            while calls
                .front()
                .is_some_and(|&t| now.duration_since(t) >= self.window)
            {
                calls.pop_front();
            }

            if calls.len() < self.max_calls {
                calls.push_back(now);
                return;
            }

            if let Some(&oldest) = calls.front() {
                let ready_at = oldest + self.window;
                trace!(wait_ms = (ready_at - now).as_millis() as u64, "Rate limit reached");
                sleep_until(ready_at).await;
            }
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_limit_is_immediate() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit_in_any_window() {
        let window = Duration::from_secs(1);
        let limiter = SlidingWindowLimiter::new(3, window);
        let mut stamps = Vec::new();
        for _ in 0..10 {
            limiter.acquire().await;
            stamps.push(Instant::now());
        }

        for w in stamps.windows(4) {
            assert!(w[3] - w[0] >= window, "4 calls inside one window");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_the_window() {
        let window = Duration::from_secs(1);
        let limiter = Arc::new(SlidingWindowLimiter::new(3, window));
        let handles: Vec<_> = (0..9)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for w in stamps.windows(4) {
            assert!(w[3] - w[0] >= window);
        }
        assert!(stamps[8] - stamps[0] >= Duration::from_secs(2));
    }
}
