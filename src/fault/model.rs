//! Fault report wire model and the typed records produced by validation
//!
//! `FaultReport` is what agents send: loosely typed strings and integers,
//! camelCase on the wire. `ValidatedReport` is what the rest of the daemon sees
//! after the validator has checked everything once.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A batch of fault observations from one resource origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultReport {
    pub id: String,
    pub timestamp: i64,
    pub version: String,
    /// Resource origin (the agent family that produced the report)
    pub resource: String,
    #[serde(default)]
    pub faults: Vec<Fault>,
}

/// One fault as reported on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    pub fault_id: String,
    pub fault_type: String,
    pub fault_code: String,
    pub fault_time: i64,
    pub assertion: String,
    #[serde(default)]
    pub fault_location: BTreeMap<String, String>,
    #[serde(default)]
    pub influence: Vec<Influence>,
    #[serde(default)]
    pub description: String,
}

/// A node (by name or serial number) and the devices on it a fault touches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Influence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, rename = "nodeSN", skip_serializing_if = "Option::is_none")]
    pub node_sn: Option<String>,
    #[serde(default)]
    pub device_ids: Vec<i64>,
}

/// Fault domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultType {
    #[serde(rename = "NPU")]
    Npu,
    Node,
    Network,
    Storage,
}

impl FaultType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NPU" => Some(FaultType::Npu),
            "Node" => Some(FaultType::Node),
            "Network" => Some(FaultType::Network),
            "Storage" => Some(FaultType::Storage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultType::Npu => "NPU",
            FaultType::Node => "Node",
            FaultType::Network => "Network",
            FaultType::Storage => "Storage",
        }
    }
}

/// Whether a fault started or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assertion {
    Occur,
    Recover,
}

impl Assertion {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "occur" => Some(Assertion::Occur),
            "recover" => Some(Assertion::Recover),
            _ => None,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Occur => write!(f, "occur"),
            Assertion::Recover => write!(f, "recover"),
        }
    }
}

/// Severity a fault code maps to in the static catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FaultLevel {
    NotHandle,
    SubHealth,
    RestartRequest,
    RestartBusiness,
    RestartNpu,
    FreeRestartNpu,
    PreSeparate,
    Separate,
}

impl FaultLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultLevel::NotHandle => "NotHandle",
            FaultLevel::SubHealth => "SubHealth",
            FaultLevel::RestartRequest => "RestartRequest",
            FaultLevel::RestartBusiness => "RestartBusiness",
            FaultLevel::RestartNpu => "RestartNpu",
            FaultLevel::FreeRestartNpu => "FreeRestartNpu",
            FaultLevel::PreSeparate => "PreSeparate",
            FaultLevel::Separate => "Separate",
        }
    }
}

impl fmt::Display for FaultLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key for a fault: resource origin and fault id
///
/// `/` cannot appear in a validated fault id, so keys never collide across origins.
pub fn fault_key(resource: &str, fault_id: &str) -> String {
    format!("{}/{}", resource, fault_id)
}

/// A single fault assertion against one node, ready for the lifecycle cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultEvent {
    pub node_name: String,
    pub fault_key: String,
    pub fault_type: FaultType,
    pub fault_code: String,
    pub level: FaultLevel,
    pub assertion: Assertion,
    pub device_ids: BTreeSet<u32>,
    pub fault_time: i64,
}

/// Output of a successful validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedReport {
    pub id: String,
    pub resource: String,
    pub events: Vec<FaultEvent>,
}
