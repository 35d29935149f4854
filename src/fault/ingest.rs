//! Fault ingestion front door
//!
//! Validation, admission and the cache update happen synchronously on the
//! caller's task. Business rejections come back as response codes, never as
//! transport errors.

use crate::error::{AdmissionError, ConfigError, ValidationError};
use crate::fault::admission::AdmissionLimiter;
use crate::fault::cache::{FaultCache, Transition};
use crate::fault::model::FaultReport;
use crate::fault::validator::Validator;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CODE_SUCCESS: u32 = 0;
pub const CODE_INVALID: u32 = 2001;
pub const CODE_RATE_LIMITED: u32 = 3001;
pub const CODE_NOT_CONFIGURED: u32 = 3002;

/// Outcome returned to the reporting agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub code: u32,
    pub message: String,
}

impl IngestResponse {
    pub fn success() -> Self {
        Self {
            code: CODE_SUCCESS,
            message: "success".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

impl From<&ValidationError> for IngestResponse {
    fn from(err: &ValidationError) -> Self {
        Self {
            code: CODE_INVALID,
            message: err.to_string(),
        }
    }
}

impl From<&AdmissionError> for IngestResponse {
    fn from(err: &AdmissionError) -> Self {
        let code = match err {
            AdmissionError::RateLimited(_) => CODE_RATE_LIMITED,
            AdmissionError::NotConfigured(_) => CODE_NOT_CONFIGURED,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Running ingestion counters
#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    invalid: AtomicU64,
    rejected: AtomicU64,
    events: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    pub accepted: u64,
    pub invalid: u64,
    pub rejected: u64,
    pub events: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
        }
    }
}

pub struct FaultIngestor {
    validator: Arc<Validator>,
    admission: Arc<AdmissionLimiter>,
    cache: Arc<FaultCache>,
    stats: IngestStats,
}

impl FaultIngestor {
    pub fn new(
        validator: Arc<Validator>,
        admission: Arc<AdmissionLimiter>,
        cache: Arc<FaultCache>,
    ) -> Self {
        Self {
            validator,
            admission,
            cache,
            stats: IngestStats::default(),
        }
    }

    /// Validate, admit and apply one report
    pub fn report(&self, report: &FaultReport) -> IngestResponse {
        let validated = match self.validator.check(report) {
            Ok(validated) => validated,
            Err(err) => {
                self.stats.invalid.fetch_add(1, Ordering::Relaxed);
                warn!(report = %report.id, resource = %report.resource, error = %err, "report rejected");
                return IngestResponse::from(&err);
            }
        };

        if let Err(err) = self.admission.allow(&validated.resource) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(report = %validated.id, error = %err, "report not admitted");
            return IngestResponse::from(&err);
        }

        let transitions = self.cache.apply_all(&validated.events);
        let created = transitions
            .iter()
            .filter(|t| matches!(t, Transition::Created))
            .count();

        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        self.stats
            .events
            .fetch_add(transitions.len() as u64, Ordering::Relaxed);
        debug!(
            report = %validated.id,
            resource = %validated.resource,
            events = transitions.len(),
            created,
            "report applied"
        );
        IngestResponse::success()
    }

    /// Swap the resource allow-list for both validation and admission
    pub fn reload_origins(&self, origins: &[String]) -> Result<(), ConfigError> {
        self.admission.rebuild(origins.iter().cloned())?;
        self.validator.set_allowed_origins(origins.iter().cloned());
        info!(origins = ?origins, "resource origins reloaded");
        Ok(())
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cache(&self) -> &Arc<FaultCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::catalog::StaticFaultCatalog;
    use crate::fault::deletion::DeletionQueue;
    use crate::fault::model::{Fault, FaultLevel, Influence};
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    fn ingestor(rate: u32) -> FaultIngestor {
        let catalog = StaticFaultCatalog::new().with_code("80E018010", FaultLevel::RestartNpu);
        let registry: HashMap<String, String> = HashMap::new();
        let validator = Validator::new(Arc::new(catalog), Arc::new(registry), ["npu-agent"]);
        let admission = AdmissionLimiter::new(rate, ["npu-agent"]).unwrap();
        let queue = Arc::new(DeletionQueue::default());
        let cache = FaultCache::new(Duration::from_secs(5), queue);
        FaultIngestor::new(Arc::new(validator), Arc::new(admission), Arc::new(cache))
    }

    fn report(id: &str) -> FaultReport {
        FaultReport {
            id: id.into(),
            timestamp: 1_700_000_000,
            version: "1.0".into(),
            resource: "npu-agent".into(),
            faults: vec![Fault {
                fault_id: "hbm-ecc".into(),
                fault_type: "NPU".into(),
                fault_code: "80E018010".into(),
                fault_time: 1_700_000_000,
                assertion: "occur".into(),
                fault_location: BTreeMap::new(),
                influence: vec![Influence {
                    node_name: Some("node-a".into()),
                    node_sn: None,
                    device_ids: vec![4],
                }],
                description: String::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_success_updates_cache() {
        let ingestor = ingestor(10);
        let response = ingestor.report(&report("report-0001"));
        assert!(response.is_success());
        assert!(ingestor.cache().contains("node-a", "npu-agent/hbm-ecc"));
        assert_eq!(ingestor.stats().accepted, 1);
        assert_eq!(ingestor.stats().events, 1);
    }

    #[tokio::test]
    async fn test_invalid_report_code() {
        let ingestor = ingestor(10);
        let response = ingestor.report(&report("short"));
        assert_eq!(response.code, CODE_INVALID);
        assert!(ingestor.cache().is_empty());
        assert_eq!(ingestor.stats().invalid, 1);
    }

    #[tokio::test]
    async fn test_rate_limited_code() {
        let ingestor = ingestor(2);
        assert!(ingestor.report(&report("report-0001")).is_success());
        assert!(ingestor.report(&report("report-0002")).is_success());
        assert_eq!(
            ingestor.report(&report("report-0003")).code,
            CODE_RATE_LIMITED
        );
        assert_eq!(ingestor.stats().rejected, 1);
    }

    #[test]
    fn test_not_configured_code() {
        let response = IngestResponse::from(&AdmissionError::NotConfigured("x".into()));
        assert_eq!(response.code, CODE_NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn test_reload_origins() {
        let ingestor = ingestor(10);
        ingestor
            .reload_origins(&["node-agent".to_string()])
            .unwrap();
        assert_eq!(ingestor.report(&report("report-0001")).code, CODE_INVALID);
    }
}
