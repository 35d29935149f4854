//! Superpod topology records
//!
//! Maps are `BTreeMap`s so the JSON rendering of a snapshot is canonical and its
//! checksum only changes when the content does.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// One accelerator card as seen from its node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub phy_id: u32,
    pub logical_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// A node and its devices within a superpod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDevice {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub server_index: u32,
    #[serde(default)]
    pub devices: BTreeMap<u32, Device>,
}

impl NodeDevice {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            serial_number: None,
            server_index: 0,
            devices: BTreeMap::new(),
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.insert(device.phy_id, device);
        self
    }
}

/// Authoritative in-memory topology of one superpod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperPodDevice {
    pub super_pod_id: String,
    pub node_device_map: BTreeMap<String, NodeDevice>,
}

impl SuperPodDevice {
    pub fn new(super_pod_id: impl Into<String>) -> Self {
        Self {
            super_pod_id: super_pod_id.into(),
            node_device_map: BTreeMap::new(),
        }
    }

    /// Canonical JSON payload written to external stores
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Content hash of the canonical payload
    pub fn checksum(&self) -> Result<String, serde_json::Error> {
        Ok(checksum_of(&serde_json::to_vec(self)?))
    }
}

/// Superpod ids become path components and object names: no separators, no NUL, not `.`/`..`
pub fn is_super_pod_id(id: &str) -> bool {
    !(id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']))
}

/// SHA-256 hex digest of a payload
pub fn checksum_of(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Pending change for a superpod, as coalesced in the event map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Update,
    Delete,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Add => write!(f, "add"),
            Operator::Update => write!(f, "update"),
            Operator::Delete => write!(f, "delete"),
        }
    }
}
