//! Fault ingestion and lifecycle tracking
//!
//! ```text
//! FaultReport ─▶ Validator ─▶ AdmissionLimiter ─▶ FaultCache ─▶ DeletionQueue
//!                                                      ▲              │
//!                                                      └─ DeletionWorker
//! ```

pub mod admission;
pub mod cache;
pub mod catalog;
pub mod deletion;
pub mod ingest;
pub mod model;
pub mod validator;

pub use admission::AdmissionLimiter;
pub use cache::{FaultCache, FaultRecord, Transition};
pub use catalog::{SeverityCatalog, StaticFaultCatalog};
pub use deletion::{DeletionJob, DeletionQueue, DeletionWorker};
pub use ingest::{FaultIngestor, IngestResponse};
pub use model::{Assertion, FaultEvent, FaultLevel, FaultReport, FaultType, ValidatedReport};
pub use validator::Validator;
