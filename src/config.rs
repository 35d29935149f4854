/*!
 * Configuration types for podwatch
 */

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level daemon configuration, loaded once at startup from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub faults: FaultConfig,

    #[serde(default)]
    pub topology: TopologyConfig,

    #[serde(default)]
    pub pingmesh: PingMeshSettings,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Logging output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for level = debug)
    #[serde(default)]
    pub verbose: bool,
}

/// Fault report admission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Resource origins allowed to submit fault reports
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Token bucket rate per origin (reports per second, also the burst size)
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            rate_per_second: default_rate_per_second(),
        }
    }
}

/// Fault lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Grace window before a recover may remove a fault, in seconds
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Deletion worker poll interval when its queue is empty, in milliseconds
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// JSON file mapping severity levels to fault codes
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            idle_poll_ms: default_idle_poll_ms(),
            catalog_path: None,
        }
    }
}

impl FaultConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// Topology reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Reconciliation tick, in seconds
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Maximum superpods processed per reconciliation cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Root of the per-superpod file tree
    #[serde(default = "default_file_root")]
    pub file_root: PathBuf,

    /// Namespace for published config objects
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Directory backing the config-object store (None = in-memory only)
    #[serde(default)]
    pub object_dir: Option<PathBuf>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
            batch_size: default_batch_size(),
            file_root: default_file_root(),
            namespace: default_namespace(),
            object_dir: None,
        }
    }
}

impl TopologyConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Network detection (PingMesh) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMeshSettings {
    /// JSON file holding the per-superpod detection configuration
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    /// How often the configuration source is re-read, in seconds
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Where the effective detection configuration is written for the controller
    #[serde(default = "default_pingmesh_output")]
    pub output_file: PathBuf,

    /// Detection controller program (None = log-only controller)
    #[serde(default)]
    pub controller_program: Option<PathBuf>,

    /// Arguments passed to the controller program
    #[serde(default)]
    pub controller_args: Vec<String>,
}

impl Default for PingMeshSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            check_interval_secs: default_check_interval_secs(),
            output_file: default_pingmesh_output(),
            controller_program: None,
            controller_args: Vec::new(),
        }
    }
}

impl PingMeshSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// HTTP ingress settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable the HTTP ingress
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_allowed_origins() -> Vec<String> {
    vec!["npu-agent".to_string(), "node-agent".to_string()]
}

fn default_rate_per_second() -> u32 {
    100
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_idle_poll_ms() -> u64 {
    500
}

fn default_reconcile_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    5
}

fn default_file_root() -> PathBuf {
    PathBuf::from("/var/lib/podwatch/superpods")
}

fn default_namespace() -> String {
    "cluster-system".to_string()
}

fn default_check_interval_secs() -> u64 {
    10
}

fn default_pingmesh_output() -> PathBuf {
    PathBuf::from("/var/lib/podwatch/superpods/pingmesh.json")
}

fn default_bind() -> String {
    "127.0.0.1:8750".to_string()
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DaemonConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.allowed_origins.is_empty() {
            return Err(ConfigError::Invalid(
                "ingest.allowed_origins must name at least one origin".to_string(),
            ));
        }

        if self.ingest.rate_per_second == 0 {
            return Err(ConfigError::Invalid(
                "ingest.rate_per_second must be greater than 0".to_string(),
            ));
        }

        if self.faults.grace_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "faults.grace_period_secs must be greater than 0".to_string(),
            ));
        }

        if self.faults.idle_poll_ms == 0 || self.faults.idle_poll_ms > 1000 {
            return Err(ConfigError::Invalid(
                "faults.idle_poll_ms must be within 1-1000".to_string(),
            ));
        }

        if self.topology.reconcile_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "topology.reconcile_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.topology.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "topology.batch_size must be at least 1".to_string(),
            ));
        }

        if self.topology.namespace.is_empty() {
            return Err(ConfigError::Invalid(
                "topology.namespace must not be empty".to_string(),
            ));
        }

        if self.pingmesh.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "pingmesh.check_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.faults.grace_period(), Duration::from_secs(5));
        assert_eq!(config.faults.idle_poll(), Duration::from_millis(500));
        assert_eq!(config.topology.batch_size, 5);
        assert_eq!(config.ingest.rate_per_second, 100);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [ingest]
            allowed_origins = ["npu-agent"]

            [topology]
            batch_size = 10
        "#;

        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ingest.allowed_origins, vec!["npu-agent".to_string()]);
        assert_eq!(config.ingest.rate_per_second, 100);
        assert_eq!(config.topology.batch_size, 10);
        assert_eq!(config.topology.reconcile_interval_secs, 5);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[topology]\nbatch_size = 0").unwrap();

        let err = DaemonConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[faults\ngrace_period_secs = ").unwrap();

        let err = DaemonConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = DaemonConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: DaemonConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.topology.namespace, config.topology.namespace);
        assert_eq!(parsed.api.bind, config.api.bind);
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
    }
}
