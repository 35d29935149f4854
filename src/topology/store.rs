//! Topology store: the in-memory superpod/device catalog
//!
//! Node observations mutate the catalog and report which superpods changed so the
//! caller can queue reconciliation events. The store also answers serial-number
//! lookups for the fault validator.

use crate::topology::model::{NodeDevice, Operator, SuperPodDevice};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Live registry resolving node serial numbers to node names
pub trait NodeRegistry: Send + Sync {
    fn resolve_name_by_serial(&self, serial: &str) -> Option<String>;
}

/// Fixed serial → name table
impl NodeRegistry for HashMap<String, String> {
    fn resolve_name_by_serial(&self, serial: &str) -> Option<String> {
        self.get(serial).cloned()
    }
}

#[derive(Debug, Default)]
struct Catalog {
    pods: HashMap<String, SuperPodDevice>,
    /// node name → superpod id
    node_index: HashMap<String, String>,
    /// serial number → node name
    serial_index: HashMap<String, String>,
}

impl Catalog {
    /// Remove a node wherever it lives; returns the superpod and its resulting operator
    fn detach(&mut self, node_name: &str) -> Option<(String, Operator)> {
        let pod_id = self.node_index.remove(node_name)?;
        let pod = self.pods.get_mut(&pod_id)?;

        if let Some(old) = pod.node_device_map.remove(node_name) {
            if let Some(serial) = old.serial_number {
                if self.serial_index.get(&serial).map(String::as_str) == Some(node_name) {
                    self.serial_index.remove(&serial);
                }
            }
        }

        if pod.node_device_map.is_empty() {
            self.pods.remove(&pod_id);
            Some((pod_id, Operator::Delete))
        } else {
            Some((pod_id, Operator::Update))
        }
    }
}

/// Thread-safe superpod catalog
#[derive(Debug, Default)]
pub struct TopologyStore {
    catalog: RwLock<Catalog>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node in `super_pod_id`.
    ///
    /// Returns one `(superpod, operator)` pair per superpod whose content changed.
    /// A node moving between superpods yields an event for both.
    pub fn upsert_node(&self, super_pod_id: &str, node: NodeDevice) -> Vec<(String, Operator)> {
        let mut catalog = self.catalog.write();
        let mut changes = Vec::new();

        let unchanged = catalog
            .pods
            .get(super_pod_id)
            .and_then(|pod| pod.node_device_map.get(&node.node_name))
            .is_some_and(|existing| *existing == node);
        if unchanged {
            return changes;
        }

        let previous_pod = catalog.node_index.get(&node.node_name).cloned();
        if let Some(previous_pod) = previous_pod {
            if previous_pod != super_pod_id {
                if let Some(change) = catalog.detach(&node.node_name) {
                    changes.push(change);
                }
            } else if let Some(old_serial) = catalog
                .pods
                .get(super_pod_id)
                .and_then(|pod| pod.node_device_map.get(&node.node_name))
                .and_then(|old| old.serial_number.clone())
            {
                // Another node may have taken the serial since
                if catalog.serial_index.get(&old_serial).map(String::as_str)
                    == Some(node.node_name.as_str())
                {
                    catalog.serial_index.remove(&old_serial);
                }
            }
        }

        let operator = if catalog.pods.contains_key(super_pod_id) {
            Operator::Update
        } else {
            Operator::Add
        };

        if let Some(serial) = &node.serial_number {
            catalog
                .serial_index
                .insert(serial.clone(), node.node_name.clone());
        }
        catalog
            .node_index
            .insert(node.node_name.clone(), super_pod_id.to_string());
        catalog
            .pods
            .entry(super_pod_id.to_string())
            .or_insert_with(|| SuperPodDevice::new(super_pod_id))
            .node_device_map
            .insert(node.node_name.clone(), node);

        debug!(super_pod_id, %operator, "node upserted");
        changes.push((super_pod_id.to_string(), operator));
        changes
    }

    /// Remove a node; the superpod record goes away with its last node
    pub fn delete_node(&self, node_name: &str) -> Option<(String, Operator)> {
        let change = self.catalog.write().detach(node_name);
        if let Some((pod_id, operator)) = &change {
            debug!(node_name, super_pod_id = %pod_id, %operator, "node removed");
        }
        change
    }

    /// Snapshot of one superpod
    pub fn get(&self, super_pod_id: &str) -> Option<SuperPodDevice> {
        self.catalog.read().pods.get(super_pod_id).cloned()
    }

    /// Ids of every known superpod, sorted
    pub fn super_pod_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.catalog.read().pods.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Superpod a node currently belongs to
    pub fn super_pod_of(&self, node_name: &str) -> Option<String> {
        self.catalog.read().node_index.get(node_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.catalog.read().pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.read().pods.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.catalog.read().node_index.len()
    }
}

impl NodeRegistry for TopologyStore {
    fn resolve_name_by_serial(&self, serial: &str) -> Option<String> {
        self.catalog.read().serial_index.get(serial).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_node_adds_superpod() {
        let store = TopologyStore::new();
        let changes = store.upsert_node("1", NodeDevice::new("node-a"));
        assert_eq!(changes, vec![("1".to_string(), Operator::Add)]);

        let changes = store.upsert_node("1", NodeDevice::new("node-b"));
        assert_eq!(changes, vec![("1".to_string(), Operator::Update)]);
        assert_eq!(store.get("1").unwrap().node_device_map.len(), 2);
    }

    #[test]
    fn test_identical_upsert_is_silent() {
        let store = TopologyStore::new();
        store.upsert_node("1", NodeDevice::new("node-a").with_serial("SN1"));
        assert!(store
            .upsert_node("1", NodeDevice::new("node-a").with_serial("SN1"))
            .is_empty());
    }

    #[test]
    fn test_last_node_removal_deletes_superpod() {
        let store = TopologyStore::new();
        store.upsert_node("1", NodeDevice::new("node-a"));
        store.upsert_node("1", NodeDevice::new("node-b"));

        assert_eq!(
            store.delete_node("node-a"),
            Some(("1".to_string(), Operator::Update))
        );
        assert_eq!(
            store.delete_node("node-b"),
            Some(("1".to_string(), Operator::Delete))
        );
        assert!(store.get("1").is_none());
        assert!(store.is_empty());
        assert_eq!(store.delete_node("node-b"), None);
    }

    #[test]
    fn test_node_moving_between_superpods() {
        let store = TopologyStore::new();
        store.upsert_node("1", NodeDevice::new("node-a"));
        store.upsert_node("1", NodeDevice::new("node-b"));

        let changes = store.upsert_node("2", NodeDevice::new("node-b"));
        assert_eq!(
            changes,
            vec![
                ("1".to_string(), Operator::Update),
                ("2".to_string(), Operator::Add)
            ]
        );
        assert_eq!(store.super_pod_of("node-b").as_deref(), Some("2"));
        assert_eq!(store.super_pod_ids(), vec!["1".to_string(), "2".to_string()]);
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_serial_lookup_follows_updates() {
        let store = TopologyStore::new();
        store.upsert_node("1", NodeDevice::new("node-a").with_serial("SN-OLD"));
        assert_eq!(
            store.resolve_name_by_serial("SN-OLD").as_deref(),
            Some("node-a")
        );

        store.upsert_node("1", NodeDevice::new("node-a").with_serial("SN-NEW"));
        assert_eq!(store.resolve_name_by_serial("SN-OLD"), None);
        assert_eq!(
            store.resolve_name_by_serial("SN-NEW").as_deref(),
            Some("node-a")
        );

        store.delete_node("node-a");
        assert_eq!(store.resolve_name_by_serial("SN-NEW"), None);
    }

    #[test]
    fn test_dropping_serial_keeps_new_owner() {
        let store = TopologyStore::new();
        store.upsert_node("1", NodeDevice::new("node-a").with_serial("SN-X"));
        store.upsert_node("1", NodeDevice::new("node-b").with_serial("SN-X"));
        store.upsert_node("1", NodeDevice::new("node-a"));

        assert_eq!(
            store.resolve_name_by_serial("SN-X").as_deref(),
            Some("node-b")
        );

        store.delete_node("node-a");
        assert_eq!(
            store.resolve_name_by_serial("SN-X").as_deref(),
            Some("node-b")
        );
    }

    #[test]
    fn test_static_registry() {
        let mut table = HashMap::new();
        table.insert("SN9".to_string(), "node-9".to_string());
        assert_eq!(table.resolve_name_by_serial("SN9").as_deref(), Some("node-9"));
        assert_eq!(table.resolve_name_by_serial("SN0"), None);
    }
}
