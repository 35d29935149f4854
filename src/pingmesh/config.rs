//! Network detection configuration
//!
//! Keyed by superpod id, or `"global"` for cluster-wide settings:
//!
//! ```json
//! {
//!   "global": { "activate": true, "taskInterval": 5 },
//!   "12":     { "activate": false, "taskInterval": 10 }
//! }
//! ```
//!
//! Unknown item fields are kept and take part in change detection.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const GLOBAL_KEY: &str = "global";

/// Accepted `taskInterval` range in seconds
pub const TASK_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMeshItem {
    pub activate: bool,
    pub task_interval: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PingMeshItem {
    pub fn new(activate: bool, task_interval: u64) -> Self {
        Self {
            activate,
            task_interval,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PingMeshConfig {
    items: BTreeMap<String, PingMeshItem>,
}

impl PingMeshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, key: impl Into<String>, item: PingMeshItem) -> Self {
        self.items.insert(key.into(), item);
        self
    }

    /// Parse and validate
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| ConfigError::Invalid(format!("detection config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, item) in &self.items {
            if key.is_empty() {
                return Err(ConfigError::Invalid(
                    "detection config key must not be empty".to_string(),
                ));
            }
            if !TASK_INTERVAL_RANGE.contains(&item.task_interval) {
                return Err(ConfigError::Invalid(format!(
                    "detection config {:?}: taskInterval {} outside {}-{} seconds",
                    key,
                    item.task_interval,
                    TASK_INTERVAL_RANGE.start(),
                    TASK_INTERVAL_RANGE.end()
                )));
            }
        }
        Ok(())
    }

    /// True when any item asks for detection
    pub fn want_running(&self) -> bool {
        self.items.values().any(|item| item.activate)
    }

    /// Keys added, removed or modified relative to `previous`
    pub fn changed_keys(&self, previous: &Self) -> BTreeSet<String> {
        let keys: BTreeSet<&String> = self.items.keys().chain(previous.items.keys()).collect();
        keys.into_iter()
            .filter(|key| self.items.get(*key) != previous.items.get(*key))
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&PingMeshItem> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_extra_fields() {
        let config = PingMeshConfig::from_json_str(
            r#"{"global": {"activate": true, "taskInterval": 5, "protocol": "icmp"}}"#,
        )
        .unwrap();
        let item = config.get(GLOBAL_KEY).unwrap();
        assert!(item.activate);
        assert_eq!(item.extra["protocol"], "icmp");
        assert!(config.want_running());
    }

    #[test]
    fn test_task_interval_bounds() {
        assert!(PingMeshConfig::new()
            .with_item("1", PingMeshItem::new(true, 0))
            .validate()
            .is_err());
        assert!(PingMeshConfig::new()
            .with_item("1", PingMeshItem::new(true, 61))
            .validate()
            .is_err());
        assert!(PingMeshConfig::new()
            .with_item("1", PingMeshItem::new(true, 60))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_changed_keys() {
        let old = PingMeshConfig::new()
            .with_item("global", PingMeshItem::new(true, 5))
            .with_item("1", PingMeshItem::new(false, 5))
            .with_item("2", PingMeshItem::new(true, 5));
        let new = PingMeshConfig::new()
            .with_item("global", PingMeshItem::new(true, 5))
            .with_item("1", PingMeshItem::new(true, 5))
            .with_item("3", PingMeshItem::new(true, 5));

        let changed: Vec<String> = new.changed_keys(&old).into_iter().collect();
        assert_eq!(changed, vec!["1", "2", "3"]);
        assert!(new.changed_keys(&new.clone()).is_empty());
    }

    #[test]
    fn test_extra_field_change_detected() {
        let mut a = PingMeshItem::new(true, 5);
        a.extra.insert("protocol".into(), "icmp".into());
        let mut b = a.clone();
        b.extra.insert("protocol".into(), "udp".into());

        let old = PingMeshConfig::new().with_item("1", a);
        let new = PingMeshConfig::new().with_item("1", b);
        assert_eq!(new.changed_keys(&old).len(), 1);
    }
}
