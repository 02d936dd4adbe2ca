//! Fixed-window rate limiting, keyed by remote address. One counter per
//! window per key; the window resets wholesale rather than sliding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 100,
        }
    }
}

struct Window {
    started_at: tokio::time::Instant,
    count: u32,
}

pub struct RateLimiter {
    windows: RwLock<HashMap<String, Window>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            windows: RwLock::new(HashMap::new()),
            config,
        })
    }

    /// Returns `true` if the request for `key` is within the current
    /// window's budget, incrementing the counter as a side effect. A new
    /// window starts as soon as the previous one has elapsed.
    pub async fn check(&self, key: &str) -> bool {
        let now = tokio::time::Instant::now();
        let mut windows = self.windows.write().await;

        match windows.get_mut(key) {
            Some(window) if now.duration_since(window.started_at) < self.config.window => {
                if window.count >= self.config.max_requests {
                    false
                } else {
                    window.count += 1;
                    true
                }
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        started_at: now,
                        count: 1,
                    },
                );
                true
            }
        }
    }

    /// Drops windows that closed at least one window-length ago, so the
    /// table doesn't grow unboundedly with transient callers.
    pub async fn cleanup_expired(&self) {
        let now = tokio::time::Instant::now();
        let window = self.config.window;
        self.windows
            .write()
            .await
            .retain(|_, w| now.duration_since(w.started_at) < window * 2);
    }
}

/// Ticks [`RateLimiter::cleanup_expired`] every five minutes.
pub fn spawn_cleanup(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup_expired().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_within_budget() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests: 3,
        });
        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-a").await);
    }

    #[tokio::test]
    async fn rejects_requests_over_budget_within_window() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests: 2,
        });
        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-a").await);
        assert!(!limiter.check("client-a").await);
    }

    #[tokio::test]
    async fn tracks_keys_independently() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests: 1,
        });
        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-b").await);
        assert!(!limiter.check("client-a").await);
    }

    #[tokio::test]
    async fn window_resets_once_elapsed() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(20),
            max_requests: 1,
        });
        assert!(limiter.check("client-a").await);
        assert!(!limiter.check("client-a").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("client-a").await);
    }
}
