//! Cluster config-object store
//!
//! Superpod snapshots are published as namespaced key-value objects, one per
//! superpod. The client trait mirrors the CRUD surface of a cluster API server;
//! two implementations ship here: an in-memory one and one backed by a
//! directory of JSON files for standalone deployments.

use crate::error::StoreError;
use crate::topology::sink::TopologySink;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Object name prefix for superpod snapshots
pub const OBJECT_PREFIX: &str = "super-pod-";

/// Data key holding the snapshot JSON
pub const DATA_KEY: &str = "superPodDevice";

/// Label carrying the superpod id
pub const SUPER_POD_LABEL: &str = "podwatch/super-pod-id";

pub type Data = BTreeMap<String, String>;
pub type Labels = BTreeMap<String, String>;

/// A stored config object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigObject {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub labels: Labels,
}

/// CRUD over namespaced config objects
#[async_trait]
pub trait ConfigObjectClient: Send + Sync {
    /// Create; fails if the object exists
    async fn create(
        &self,
        name: &str,
        namespace: &str,
        data: &Data,
        labels: &Labels,
    ) -> Result<(), StoreError>;

    /// Replace; fails if the object does not exist
    async fn update(
        &self,
        name: &str,
        namespace: &str,
        data: &Data,
        labels: &Labels,
    ) -> Result<(), StoreError>;

    async fn get(&self, name: &str, namespace: &str) -> Result<Option<ConfigObject>, StoreError>;

    /// Delete; succeeds when the object is already gone
    async fn delete(&self, name: &str, namespace: &str) -> Result<(), StoreError>;
}

fn object_error(name: &str, namespace: &str, message: impl Into<String>) -> StoreError {
    StoreError::ConfigObject {
        namespace: namespace.to_string(),
        name: name.to_string(),
        message: message.into(),
    }
}

/// Config objects held in process memory
#[derive(Debug, Default)]
pub struct InMemoryConfigObjects {
    objects: RwLock<HashMap<(String, String), ConfigObject>>,
    mutations: AtomicUsize,
}

impl InMemoryConfigObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create/update calls
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn key(name: &str, namespace: &str) -> (String, String) {
        (namespace.to_string(), name.to_string())
    }
}

#[async_trait]
impl ConfigObjectClient for InMemoryConfigObjects {
    async fn create(
        &self,
        name: &str,
        namespace: &str,
        data: &Data,
        labels: &Labels,
    ) -> Result<(), StoreError> {
        let mut objects = self.objects.write();
        let key = Self::key(name, namespace);
        if objects.contains_key(&key) {
            return Err(object_error(name, namespace, "already exists"));
        }
        objects.insert(
            key,
            ConfigObject {
                name: name.to_string(),
                namespace: namespace.to_string(),
                data: data.clone(),
                labels: labels.clone(),
            },
        );
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(
        &self,
        name: &str,
        namespace: &str,
        data: &Data,
        labels: &Labels,
    ) -> Result<(), StoreError> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&Self::key(name, namespace))
            .ok_or_else(|| object_error(name, namespace, "not found"))?;
        object.data = data.clone();
        object.labels = labels.clone();
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, name: &str, namespace: &str) -> Result<Option<ConfigObject>, StoreError> {
        Ok(self.objects.read().get(&Self::key(name, namespace)).cloned())
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<(), StoreError> {
        self.objects.write().remove(&Self::key(name, namespace));
        Ok(())
    }
}

/// Config objects stored as `<root>/<namespace>/<name>.json`
#[derive(Debug, Clone)]
pub struct DirConfigObjects {
    root: PathBuf,
}

impl DirConfigObjects {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str, namespace: &str) -> Result<PathBuf, StoreError> {
        for part in [name, namespace] {
            if part.is_empty()
                || part == "."
                || part == ".."
                || part.contains(['/', '\\', '\0'])
            {
                return Err(object_error(name, namespace, "invalid object name"));
            }
        }
        Ok(self.root.join(namespace).join(format!("{}.json", name)))
    }

    async fn exists(path: &Path) -> Result<bool, StoreError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn store(&self, path: &Path, object: &ConfigObject) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let contents = serde_json::to_vec_pretty(object)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &contents)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }
}

#[async_trait]
impl ConfigObjectClient for DirConfigObjects {
    async fn create(
        &self,
        name: &str,
        namespace: &str,
        data: &Data,
        labels: &Labels,
    ) -> Result<(), StoreError> {
        let path = self.path_for(name, namespace)?;
        if Self::exists(&path).await? {
            return Err(object_error(name, namespace, "already exists"));
        }
        let object = ConfigObject {
            name: name.to_string(),
            namespace: namespace.to_string(),
            data: data.clone(),
            labels: labels.clone(),
        };
        self.store(&path, &object).await
    }

    async fn update(
        &self,
        name: &str,
        namespace: &str,
        data: &Data,
        labels: &Labels,
    ) -> Result<(), StoreError> {
        let path = self.path_for(name, namespace)?;
        if !Self::exists(&path).await? {
            return Err(object_error(name, namespace, "not found"));
        }
        let object = ConfigObject {
            name: name.to_string(),
            namespace: namespace.to_string(),
            data: data.clone(),
            labels: labels.clone(),
        };
        self.store(&path, &object).await
    }

    async fn get(&self, name: &str, namespace: &str) -> Result<Option<ConfigObject>, StoreError> {
        let path = self.path_for(name, namespace)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<(), StoreError> {
        let path = self.path_for(name, namespace)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}

/// Topology sink publishing one config object per superpod
pub struct ConfigObjectSink {
    client: Arc<dyn ConfigObjectClient>,
    namespace: String,
}

impl ConfigObjectSink {
    pub fn new(client: Arc<dyn ConfigObjectClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn object_name(super_pod_id: &str) -> String {
        format!("{}{}", OBJECT_PREFIX, super_pod_id)
    }
}

#[async_trait]
impl TopologySink for ConfigObjectSink {
    fn name(&self) -> &str {
        "config-object"
    }

    async fn write(&self, super_pod_id: &str, payload: &[u8]) -> Result<(), StoreError> {
        let name = Self::object_name(super_pod_id);
        let body = std::str::from_utf8(payload)
            .map_err(|e| object_error(&name, &self.namespace, e.to_string()))?;

        let data = Data::from([(DATA_KEY.to_string(), body.to_string())]);
        let labels = Labels::from([(SUPER_POD_LABEL.to_string(), super_pod_id.to_string())]);

        if self.client.get(&name, &self.namespace).await?.is_some() {
            self.client
                .update(&name, &self.namespace, &data, &labels)
                .await?;
        } else {
            self.client
                .create(&name, &self.namespace, &data, &labels)
                .await?;
        }
        debug!(namespace = %self.namespace, name, "config object published");
        Ok(())
    }

    async fn remove(&self, super_pod_id: &str) -> Result<(), StoreError> {
        let name = Self::object_name(super_pod_id);
        self.client.delete(&name, &self.namespace).await
    }
}
