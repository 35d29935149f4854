/*!
 * Error types for podwatch
 */

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PodwatchError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 2;

/// A fault report failed structural or semantic validation.
///
/// Never retried and never partially applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("report id must be 8-128 characters of [a-zA-Z0-9-_.], got {0:?}")]
    InvalidReportId(String),

    #[error("timestamp {0} is not a 10-digit epoch second at or after the floor")]
    InvalidTimestamp(i64),

    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(String),

    #[error("resource origin {0:?} is not in the allow-list")]
    ResourceNotAllowed(String),

    #[error("fault list must hold 1-{max} entries, got {actual}")]
    FaultCount { actual: usize, max: usize },

    #[error("fault id must be 1-128 characters of [a-zA-Z0-9-_.], got {0:?}")]
    InvalidFaultId(String),

    #[error("fault {fault_id}: type {fault_type:?} is not allowed")]
    InvalidFaultType { fault_id: String, fault_type: String },

    #[error("fault {fault_id}: code {code:?} must be exactly {expected} characters")]
    InvalidFaultCodeLength {
        fault_id: String,
        code: String,
        expected: usize,
    },

    #[error("fault {fault_id}: code {code:?} has no configured severity")]
    UnknownFaultCode { fault_id: String, code: String },

    #[error("fault {fault_id}: fault time {time} is not a 10-digit epoch second at or after the floor")]
    InvalidFaultTime { fault_id: String, time: i64 },

    #[error("fault {fault_id}: assertion {assertion:?} must be occur or recover")]
    InvalidAssertion { fault_id: String, assertion: String },

    #[error("fault {fault_id}: location map is invalid: {reason}")]
    InvalidLocation { fault_id: String, reason: String },

    #[error("fault {fault_id}: description exceeds {max} characters")]
    DescriptionTooLong { fault_id: String, max: usize },

    #[error("fault {fault_id}: influence list must hold 1-{max} entries, got {actual}")]
    InfluenceCount {
        fault_id: String,
        actual: usize,
        max: usize,
    },

    #[error("fault {fault_id}: influence does not resolve to a known node (name {node_name:?}, sn {node_sn:?})")]
    UnresolvedNode {
        fault_id: String,
        node_name: Option<String>,
        node_sn: Option<String>,
    },

    #[error("fault {fault_id}: device list on {node} must hold 1-32 ids, got {actual}")]
    DeviceCount {
        fault_id: String,
        node: String,
        actual: usize,
    },

    #[error("fault {fault_id}: device id {device_id} on {node} is outside [0,31]")]
    DeviceOutOfRange {
        fault_id: String,
        node: String,
        device_id: i64,
    },

    #[error("fault {fault_id}: device id {device_id} appears twice on {node}")]
    DuplicateDevice {
        fault_id: String,
        node: String,
        device_id: i64,
    },
}

/// Admission control rejected a structurally valid report.
///
/// The caller may retry later.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("resource origin {0:?} has no configured limiter")]
    NotConfigured(String),

    #[error("resource origin {0:?} exceeded its report rate")]
    RateLimited(String),
}

/// An external store (config objects, files, detection controller) failed.
///
/// Reconciliation converts these into a requeue; they never reach ingestion callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config object {namespace}/{name}: {message}")]
    ConfigObject {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to write {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("refusing to write through symbolic link {0}")]
    Symlink(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Daemon or detection configuration could not be loaded.
///
/// For detection configuration the previous known-good value stays in effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for library entry points
#[derive(Debug, Error)]
pub enum PodwatchError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PodwatchError {
    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            PodwatchError::Admission(AdmissionError::RateLimited(_)) => true,
            PodwatchError::Store(_) => true,
            PodwatchError::Io(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging and instrumentation
    pub fn category(&self) -> ErrorCategory {
        match self {
            PodwatchError::Validation(_) => ErrorCategory::Validation,
            PodwatchError::Admission(_) => ErrorCategory::Admission,
            PodwatchError::Store(_) => ErrorCategory::Store,
            PodwatchError::Config(_) => ErrorCategory::Configuration,
            PodwatchError::Io(_) => ErrorCategory::IoError,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or disallowed input
    Validation,
    /// Unconfigured origin or rate exceeded
    Admission,
    /// External store failures
    Store,
    /// Configuration errors
    Configuration,
    /// I/O operation errors
    IoError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Admission => write!(f, "admission"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
        }
    }
}
