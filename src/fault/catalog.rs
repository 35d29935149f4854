//! Static fault-code catalog
//!
//! Maps a fault code to the severity level the cluster acts on. The catalog is
//! loaded once at startup from a JSON file grouped by level:
//!
//! ```json
//! { "Separate": ["40F84E00A"], "SubHealth": ["80C98009B", "80CB8009C"] }
//! ```

use crate::error::ConfigError;
use crate::fault::model::FaultLevel;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Source of truth for fault-code severities
pub trait SeverityCatalog: Send + Sync {
    /// Severity for `code`, or `None` when the code is unknown
    fn severity_for(&self, code: &str) -> Option<FaultLevel>;
}

/// In-memory catalog built from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticFaultCatalog {
    codes: HashMap<String, FaultLevel>,
}

impl StaticFaultCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single code (builder style)
    pub fn with_code(mut self, code: &str, level: FaultLevel) -> Self {
        self.codes.insert(code.to_ascii_uppercase(), level);
        self
    }

    /// Parse the level-grouped JSON layout
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        let grouped: BTreeMap<FaultLevel, Vec<String>> = serde_json::from_str(contents)?;

        let mut catalog = Self::new();
        for (level, codes) in grouped {
            for code in codes {
                // A code listed under two levels keeps the more severe one
                let entry = catalog
                    .codes
                    .entry(code.to_ascii_uppercase())
                    .or_insert(level);
                if level > *entry {
                    *entry = level;
                }
            }
        }
        Ok(catalog)
    }

    /// Load the catalog from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl SeverityCatalog for StaticFaultCatalog {
    fn severity_for(&self, code: &str) -> Option<FaultLevel> {
        self.codes.get(&code.to_ascii_uppercase()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = StaticFaultCatalog::new().with_code("40f84e00a", FaultLevel::Separate);
        assert_eq!(catalog.severity_for("40F84E00A"), Some(FaultLevel::Separate));
        assert_eq!(catalog.severity_for("00000000X"), None);
    }

    #[test]
    fn test_grouped_json() {
        let catalog = StaticFaultCatalog::from_json_str(
            r#"{"Separate": ["40F84E00A"], "SubHealth": ["80C98009B", "80CB8009C"]}"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.severity_for("80CB8009C"), Some(FaultLevel::SubHealth));
    }

    #[test]
    fn test_duplicate_code_keeps_most_severe() {
        let catalog = StaticFaultCatalog::from_json_str(
            r#"{"SubHealth": ["40F84E00A"], "Separate": ["40F84E00A"]}"#,
        )
        .unwrap();
        assert_eq!(catalog.severity_for("40F84E00A"), Some(FaultLevel::Separate));
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!(StaticFaultCatalog::from_json_str(r#"{"Explode": ["1"]}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"RestartNpu": ["8C2FA009A"]}}"#).unwrap();

        let catalog = StaticFaultCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.severity_for("8C2FA009A"), Some(FaultLevel::RestartNpu));
    }
}
