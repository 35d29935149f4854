/*!
 * Podwatch - fault lifecycle and superpod topology daemon
 *
 * - Validated, rate-limited fault report ingestion
 * - Active-fault cache with deferred recovery deletion
 * - Superpod topology reconciliation into config objects and files
 * - Network detection (PingMesh) controller management
 */

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fault;
pub mod logging;
pub mod pingmesh;
pub mod topology;

// Re-export commonly used types
pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use error::{PodwatchError, Result};
pub use fault::{FaultCache, FaultIngestor, FaultReport};
pub use topology::{TopologyPublisher, TopologyStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
