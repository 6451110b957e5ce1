//! Rate limiting implementation
//!
//! Uses the governor crate for token bucket rate limiting. One limiter is
//! shared by every request the client makes, retries and concurrent batches
//! included.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Airtable's published ceiling: five requests per second per base
pub const AIRTABLE_REQUESTS_PER_SECOND: u32 = 5;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per second
    pub requests_per_second: u32,
    /// Burst size (max tokens in bucket)
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: AIRTABLE_REQUESTS_PER_SECOND,
            burst_size: AIRTABLE_REQUESTS_PER_SECOND,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Config with a bucket exactly as deep as the per-second rate
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, requests_per_second)
    }
}

/// Token bucket rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimiterConfig::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use std::time::Duration;

    fn permit(limiter: &RateLimiter) -> bool {
        limiter.limiter.check().is_ok()
    }

    #[test]
    fn test_rate_limiter_config_default_matches_airtable() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.requests_per_second, 5);
        assert_eq!(config.burst_size, 5);
    }

    #[test]
    fn test_rate_limiter_config_per_second() {
        let config = RateLimiterConfig::per_second(50);
        assert_eq!(config, RateLimiterConfig::new(50, 50));
    }

    #[test]
    fn test_rate_limiter_exhausts_burst() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(1, 3));

        for _ in 0..3 {
            assert!(permit(&limiter));
        }
        assert!(!permit(&limiter));
    }

    #[test]
    fn test_rate_limiter_zero_config_falls_back_to_one() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(0, 0));
        assert!(permit(&limiter));
        assert!(!permit(&limiter));
    }

    #[test]
    fn test_rate_limiter_wait_within_burst() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(100, 10));
        tokio_test::block_on(limiter.wait());
    }

    #[tokio::test]
    async fn test_rate_limiter_wait_with_timeout() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(100, 10));
        assert!(tokio::time::timeout(Duration::from_millis(100), limiter.wait())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rate_limiter_times_out_when_empty() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(1, 1));
        assert!(permit(&limiter));
        assert!(tokio::time::timeout(Duration::from_millis(50), limiter.wait())
            .await
            .is_err());
    }

    #[test]
    fn test_clones_share_one_bucket() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(1, 2));
        let clone = limiter.clone();
        assert!(permit(&limiter));
        assert!(permit(&clone));
        assert!(!permit(&limiter));
    }
}
