//! Rate limiting for admission control
//!
//! Provides a non-blocking token bucket backed by the governor crate. Callers
//! ask for a permit and get an immediate answer; nothing here ever waits.

use crate::error::ResilienceError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Token bucket rate limiter
///
/// # Example
/// ```
/// use podwatch_core_resilience::RateLimiter;
///
/// // 100 permits per second, bursts of up to 100
/// let limiter = RateLimiter::per_second(100).unwrap();
/// assert!(limiter.try_acquire().is_ok());
/// ```
pub struct RateLimiter {
    limiter: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    max_requests: u32,
    period: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Permits replenished over `period`; also the burst size
    /// * `period` - Time period for the rate limit
    pub fn new(max_requests: u32, period: Duration) -> Result<Self, ResilienceError> {
        let burst = NonZeroU32::new(max_requests).ok_or_else(|| {
            ResilienceError::InvalidQuota("max_requests must be > 0".to_string())
        })?;

        // One permit every period / max_requests
        let replenish = period / max_requests;
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| ResilienceError::InvalidQuota("period must be > 0".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: GovernorRateLimiter::direct(quota),
            max_requests,
            period,
        })
    }

    /// Create a rate limiter with requests per second
    pub fn per_second(requests_per_second: u32) -> Result<Self, ResilienceError> {
        Self::new(requests_per_second, Duration::from_secs(1))
    }

    /// Take one permit without waiting
    ///
    /// Returns `RateLimitExceeded` when the bucket is empty.
    pub fn try_acquire(&self) -> Result<(), ResilienceError> {
        self.limiter
            .check()
            .map_err(|_| ResilienceError::RateLimitExceeded)
    }

    /// Get the maximum requests per period
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Get the rate limit period
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("period", &self.period)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_quota_rejected() {
        let err = RateLimiter::per_second(0).unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidQuota(_)));
    }

    #[test]
    fn test_burst_then_exhausted() {
        // 5/s replenishes one permit every 200ms, far slower than this loop
        let limiter = RateLimiter::per_second(5).unwrap();

        for _ in 0..5 {
            assert!(limiter.try_acquire().is_ok());
        }
        assert_eq!(
            limiter.try_acquire(),
            Err(ResilienceError::RateLimitExceeded)
        );
    }

    #[test]
    fn test_replenishes_over_time() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100)).unwrap();
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn test_rate_limiter_config() {
        let limiter = RateLimiter::per_second(100).unwrap();
        assert_eq!(limiter.max_requests(), 100);
        assert_eq!(limiter.period(), Duration::from_secs(1));
    }
}
