//! Fault report validation
//!
//! Checks run in a fixed order and stop at the first failure. A report either
//! comes out fully typed as a [`ValidatedReport`] or nothing of it is used.

use crate::error::ValidationError;
use crate::fault::catalog::SeverityCatalog;
use crate::fault::model::{
    fault_key, Assertion, Fault, FaultEvent, FaultReport, FaultType, ValidatedReport,
};
use crate::topology::store::NodeRegistry;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};

/// Only protocol version accepted
pub const PROTOCOL_VERSION: &str = "1.0";

/// Earliest accepted epoch second (2020-01-01T00:00:00Z)
pub const EPOCH_FLOOR: i64 = 1_577_836_800;

pub const MAX_FAULTS: usize = 100;
pub const FAULT_CODE_LEN: usize = 9;
pub const MAX_LOCATION_ENTRIES: usize = 10;
pub const MAX_LOCATION_KEY_LEN: usize = 64;
pub const MAX_LOCATION_VALUE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 512;
pub const MAX_INFLUENCES: usize = 1000;
pub const MAX_DEVICES: usize = 32;
pub const MAX_DEVICE_ID: i64 = 31;
pub const MAX_NODE_NAME_LEN: usize = 253;

static REPORT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-_.]{8,128}$").expect("static pattern"));

static FAULT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-_.]{1,128}$").expect("static pattern"));

// Lowercase RFC-1123 subdomain
static NODE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("static pattern")
});

fn is_epoch_seconds(value: i64) -> bool {
    (1_000_000_000..=9_999_999_999).contains(&value) && value >= EPOCH_FLOOR
}

/// Lowercase RFC-1123 subdomain of at most 253 characters
pub fn is_node_name(value: &str) -> bool {
    value.len() <= MAX_NODE_NAME_LEN && NODE_NAME.is_match(value)
}

/// Stateless report checker over a severity catalog and the live node registry
pub struct Validator {
    catalog: Arc<dyn SeverityCatalog>,
    registry: Arc<dyn NodeRegistry>,
    allowed_origins: RwLock<HashSet<String>>,
}

impl Validator {
    pub fn new<I, S>(
        catalog: Arc<dyn SeverityCatalog>,
        registry: Arc<dyn NodeRegistry>,
        origins: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            catalog,
            registry,
            allowed_origins: RwLock::new(origins.into_iter().map(Into::into).collect()),
        }
    }

    /// Replace the resource allow-list
    pub fn set_allowed_origins<I, S>(&self, origins: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.allowed_origins.write() = origins.into_iter().map(Into::into).collect();
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.read().contains(origin)
    }

    /// Validate a report and expand it into per-node fault events
    pub fn check(&self, report: &FaultReport) -> Result<ValidatedReport, ValidationError> {
        if !REPORT_ID.is_match(&report.id) {
            return Err(ValidationError::InvalidReportId(report.id.clone()));
        }
        if !is_epoch_seconds(report.timestamp) {
            return Err(ValidationError::InvalidTimestamp(report.timestamp));
        }
        if report.version != PROTOCOL_VERSION {
            return Err(ValidationError::UnsupportedVersion(report.version.clone()));
        }
        if !self.is_origin_allowed(&report.resource) {
            return Err(ValidationError::ResourceNotAllowed(report.resource.clone()));
        }
        if report.faults.is_empty() || report.faults.len() > MAX_FAULTS {
            return Err(ValidationError::FaultCount {
                actual: report.faults.len(),
                max: MAX_FAULTS,
            });
        }

        let mut events = Vec::new();
        for fault in &report.faults {
            self.check_fault(&report.resource, fault, &mut events)?;
        }

        Ok(ValidatedReport {
            id: report.id.clone(),
            resource: report.resource.clone(),
            events,
        })
    }

    fn check_fault(
        &self,
        resource: &str,
        fault: &Fault,
        events: &mut Vec<FaultEvent>,
    ) -> Result<(), ValidationError> {
        let id = &fault.fault_id;
        if !FAULT_ID.is_match(id) {
            return Err(ValidationError::InvalidFaultId(id.clone()));
        }

        let fault_type =
            FaultType::parse(&fault.fault_type).ok_or_else(|| ValidationError::InvalidFaultType {
                fault_id: id.clone(),
                fault_type: fault.fault_type.clone(),
            })?;

        if fault.fault_code.chars().count() != FAULT_CODE_LEN {
            return Err(ValidationError::InvalidFaultCodeLength {
                fault_id: id.clone(),
                code: fault.fault_code.clone(),
                expected: FAULT_CODE_LEN,
            });
        }
        let level = self.catalog.severity_for(&fault.fault_code).ok_or_else(|| {
            ValidationError::UnknownFaultCode {
                fault_id: id.clone(),
                code: fault.fault_code.clone(),
            }
        })?;

        if !is_epoch_seconds(fault.fault_time) {
            return Err(ValidationError::InvalidFaultTime {
                fault_id: id.clone(),
                time: fault.fault_time,
            });
        }

        let assertion =
            Assertion::parse(&fault.assertion).ok_or_else(|| ValidationError::InvalidAssertion {
                fault_id: id.clone(),
                assertion: fault.assertion.clone(),
            })?;

        check_location(id, &fault.fault_location)?;

        if fault.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::DescriptionTooLong {
                fault_id: id.clone(),
                max: MAX_DESCRIPTION_LEN,
            });
        }

        if fault.influence.is_empty() || fault.influence.len() > MAX_INFLUENCES {
            return Err(ValidationError::InfluenceCount {
                fault_id: id.clone(),
                actual: fault.influence.len(),
                max: MAX_INFLUENCES,
            });
        }

        // Two influences naming the same node merge into one event
        let mut per_node: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
        for influence in &fault.influence {
            let node = self
                .resolve_node(influence.node_name.as_deref(), influence.node_sn.as_deref())
                .ok_or_else(|| ValidationError::UnresolvedNode {
                    fault_id: id.clone(),
                    node_name: influence.node_name.clone(),
                    node_sn: influence.node_sn.clone(),
                })?;
            let devices = check_devices(id, &node, &influence.device_ids)?;
            per_node.entry(node).or_default().extend(devices);
        }

        let key = fault_key(resource, id);
        events.extend(per_node.into_iter().map(|(node_name, device_ids)| FaultEvent {
            node_name,
            fault_key: key.clone(),
            fault_type,
            fault_code: fault.fault_code.clone(),
            level,
            assertion,
            device_ids,
            fault_time: fault.fault_time,
        }));
        Ok(())
    }

    fn resolve_node(&self, name: Option<&str>, serial: Option<&str>) -> Option<String> {
        if let Some(name) = name.filter(|n| is_node_name(n)) {
            return Some(name.to_string());
        }
        serial
            .filter(|sn| !sn.is_empty())
            .and_then(|sn| self.registry.resolve_name_by_serial(sn))
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("allowed_origins", &*self.allowed_origins.read())
            .finish_non_exhaustive()
    }
}

fn check_location(
    fault_id: &str,
    location: &BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidLocation {
        fault_id: fault_id.to_string(),
        reason,
    };

    if location.len() > MAX_LOCATION_ENTRIES {
        return Err(invalid(format!(
            "{} entries exceeds {}",
            location.len(),
            MAX_LOCATION_ENTRIES
        )));
    }
    for (key, value) in location {
        let key_len = key.chars().count();
        if key_len == 0 || key_len > MAX_LOCATION_KEY_LEN {
            return Err(invalid(format!(
                "key {:?} must be 1-{} characters",
                key, MAX_LOCATION_KEY_LEN
            )));
        }
        if value.chars().count() > MAX_LOCATION_VALUE_LEN {
            return Err(invalid(format!(
                "value for {:?} exceeds {} characters",
                key, MAX_LOCATION_VALUE_LEN
            )));
        }
    }
    Ok(())
}

fn check_devices(fault_id: &str, node: &str, ids: &[i64]) -> Result<BTreeSet<u32>, ValidationError> {
    if ids.is_empty() || ids.len() > MAX_DEVICES {
        return Err(ValidationError::DeviceCount {
            fault_id: fault_id.to_string(),
            node: node.to_string(),
            actual: ids.len(),
        });
    }

    let mut seen = BTreeSet::new();
    for &device_id in ids {
        if !(0..=MAX_DEVICE_ID).contains(&device_id) {
            return Err(ValidationError::DeviceOutOfRange {
                fault_id: fault_id.to_string(),
                node: node.to_string(),
                device_id,
            });
        }
        if !seen.insert(device_id as u32) {
            return Err(ValidationError::DuplicateDevice {
                fault_id: fault_id.to_string(),
                node: node.to_string(),
                device_id,
            });
        }
    }
    Ok(seen)
}
