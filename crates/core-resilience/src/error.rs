//! Error types for the resilience primitives

use thiserror::Error;

/// Errors that can occur in resilience operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// Token bucket has no permit available right now
    #[error("Rate limit exceeded, retry after cooldown")]
    RateLimitExceeded,

    /// Limiter was constructed with an unusable quota
    #[error("Invalid quota: {0}")]
    InvalidQuota(String),
}

impl ResilienceError {
    /// Check if this error is transient and can be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, ResilienceError::RateLimitExceeded)
    }
}
