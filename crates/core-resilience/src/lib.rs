//! Podwatch Core Resilience: Pure-logic admission and scheduling primitives
//!
//! # Overview
//!
//! Building blocks the daemon uses to stay bounded under bursty input and to
//! defer work without blocking callers:
//!
//! - **Rate Limiter**: Non-blocking token bucket (governor) for admission control
//! - **Deadline Queue**: Min-heap of delayed items released in deadline order
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Fault reports, topology, or any cluster concepts
//! - Storage systems and external stores
//! - How long to sleep (callers own their timers and cancellation)
//!
//! # Architecture
//!
//! ```text
//!        inbound report
//!              │
//!              ▼
//! ┌─────────────────────────────────────────┐
//! │       Rate Limiter                      │  ← Admit or reject, never wait
//! │  (Token bucket per origin)              │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         state mutation
//!               │
//!          deferred work:
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Deadline Queue                    │  ← Earliest deadline first
//! │  (Min-heap, FIFO among equal deadlines) │
//! └─────────────────────────────────────────┘
//! ```

pub mod deadline_queue;
pub mod error;
pub mod rate_limiter;

// Re-export main types for convenience
pub use deadline_queue::DeadlineQueue;
pub use error::ResilienceError;
pub use rate_limiter::RateLimiter;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use podwatch_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::deadline_queue::DeadlineQueue;
    pub use super::error::ResilienceError;
    pub use super::rate_limiter::RateLimiter;
}
