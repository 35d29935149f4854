//! Per-origin admission control
//!
//! One token bucket per configured resource origin. Changing the allow-list
//! rebuilds the whole table, so every origin starts again with a full burst.

use crate::error::{AdmissionError, ConfigError};
use parking_lot::RwLock;
use podwatch_core_resilience::{RateLimiter, ResilienceError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default reports per second admitted per origin
pub const DEFAULT_RATE_PER_SECOND: u32 = 100;

pub struct AdmissionLimiter {
    rate_per_second: u32,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl AdmissionLimiter {
    /// Build a limiter table for `origins`, each allowing `rate_per_second` with an equal burst
    pub fn new<I, S>(rate_per_second: u32, origins: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let limiter = Self {
            rate_per_second,
            limiters: RwLock::new(HashMap::new()),
        };
        limiter.rebuild(origins)?;
        Ok(limiter)
    }

    /// Drop every bucket and create one fresh bucket per origin
    pub fn rebuild<I, S>(&self, origins: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = HashMap::new();
        for origin in origins {
            let limiter = RateLimiter::per_second(self.rate_per_second)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            table.insert(origin.into(), Arc::new(limiter));
        }

        info!(origins = table.len(), rate = self.rate_per_second, "admission table rebuilt");
        *self.limiters.write() = table;
        Ok(())
    }

    /// Take one token for `origin`
    pub fn allow(&self, origin: &str) -> Result<(), AdmissionError> {
        let limiter = self
            .limiters
            .read()
            .get(origin)
            .cloned()
            .ok_or_else(|| AdmissionError::NotConfigured(origin.to_string()))?;

        limiter.try_acquire().map_err(|e| match e {
            ResilienceError::RateLimitExceeded => {
                debug!(origin, "report rate exceeded");
                AdmissionError::RateLimited(origin.to_string())
            }
            ResilienceError::InvalidQuota(_) => AdmissionError::NotConfigured(origin.to_string()),
        })
    }

    /// Configured origins, sorted
    pub fn origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self.limiters.read().keys().cloned().collect();
        origins.sort();
        origins
    }

    pub fn rate_per_second(&self) -> u32 {
        self.rate_per_second
    }
}

impl std::fmt::Debug for AdmissionLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionLimiter")
            .field("rate_per_second", &self.rate_per_second)
            .field("origins", &self.origins())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_origin_not_configured() {
        let limiter = AdmissionLimiter::new(10, ["npu-agent"]).unwrap();
        assert_eq!(
            limiter.allow("rogue"),
            Err(AdmissionError::NotConfigured("rogue".into()))
        );
    }

    #[test]
    fn test_exhausted_bucket_rate_limited() {
        let limiter = AdmissionLimiter::new(3, ["npu-agent"]).unwrap();
        for _ in 0..3 {
            assert!(limiter.allow("npu-agent").is_ok());
        }
        assert_eq!(
            limiter.allow("npu-agent"),
            Err(AdmissionError::RateLimited("npu-agent".into()))
        );
    }

    #[test]
    fn test_buckets_are_per_origin() {
        let limiter = AdmissionLimiter::new(1, ["npu-agent", "node-agent"]).unwrap();
        assert!(limiter.allow("npu-agent").is_ok());
        assert!(limiter.allow("npu-agent").is_err());
        assert!(limiter.allow("node-agent").is_ok());
    }

    #[test]
    fn test_rebuild_refills_and_replaces_origins() {
        let limiter = AdmissionLimiter::new(1, ["npu-agent"]).unwrap();
        assert!(limiter.allow("npu-agent").is_ok());
        assert!(limiter.allow("npu-agent").is_err());

        limiter.rebuild(["npu-agent", "switch-agent"]).unwrap();
        assert!(limiter.allow("npu-agent").is_ok());
        assert!(limiter.allow("switch-agent").is_ok());
        assert_eq!(limiter.origins(), vec!["npu-agent", "switch-agent"]);

        limiter.rebuild(["switch-agent"]).unwrap();
        assert_eq!(
            limiter.allow("npu-agent"),
            Err(AdmissionError::NotConfigured("npu-agent".into()))
        );
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(AdmissionLimiter::new(0, ["npu-agent"]).is_err());
    }
}
