//! External topology sinks and checksum-gated writes
//!
//! Each sink is wrapped in its own [`ChecksumGatedStore`], which remembers the
//! checksum of the last payload it successfully wrote per superpod and skips
//! writes whose content has not changed.

use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Durable destination for superpod snapshots
#[async_trait]
pub trait TopologySink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Write (create or replace) the payload for a superpod
    async fn write(&self, super_pod_id: &str, payload: &[u8]) -> Result<(), StoreError>;

    /// Remove a superpod. Removing an absent superpod succeeds.
    async fn remove(&self, super_pod_id: &str) -> Result<(), StoreError>;
}

/// Called after a sink changes topology that a downstream process reads
#[async_trait]
pub trait ReloadHook: Send + Sync {
    async fn on_topology_changed(&self);
}

/// Last successfully written checksum per key
#[derive(Debug, Default)]
pub struct PublishLog {
    checksums: RwLock<HashMap<String, String>>,
}

impl PublishLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.checksums.read().get(key).cloned()
    }

    pub fn matches(&self, key: &str, checksum: &str) -> bool {
        self.checksums.read().get(key).map(String::as_str) == Some(checksum)
    }

    pub fn record(&self, key: &str, checksum: &str) {
        self.checksums
            .write()
            .insert(key.to_string(), checksum.to_string());
    }

    pub fn forget(&self, key: &str) -> Option<String> {
        self.checksums.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.checksums.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.read().is_empty()
    }
}

/// A sink plus its publish log
pub struct ChecksumGatedStore {
    sink: Arc<dyn TopologySink>,
    log: PublishLog,
}

impl ChecksumGatedStore {
    pub fn new(sink: Arc<dyn TopologySink>) -> Self {
        Self {
            sink,
            log: PublishLog::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.sink.name()
    }

    /// Write unless `checksum` equals the last one written for `key`.
    ///
    /// Returns whether a write happened. The log is only updated on success.
    pub async fn write(
        &self,
        key: &str,
        checksum: &str,
        payload: &[u8],
    ) -> Result<bool, StoreError> {
        if self.log.matches(key, checksum) {
            debug!(sink = self.name(), key, "checksum unchanged, skipping write");
            return Ok(false);
        }
        self.write_forced(key, checksum, payload).await?;
        Ok(true)
    }

    /// Write regardless of the publish log
    pub async fn write_forced(
        &self,
        key: &str,
        checksum: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        self.sink.write(key, payload).await?;
        self.log.record(key, checksum);
        debug!(sink = self.name(), key, checksum, "snapshot written");
        Ok(())
    }

    /// Remove from the sink and drop the publish-log entry
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.sink.remove(key).await?;
        self.log.forget(key);
        debug!(sink = self.name(), key, "snapshot removed");
        Ok(())
    }

    pub fn last_checksum(&self, key: &str) -> Option<String> {
        self.log.get(key)
    }

    pub fn log(&self) -> &PublishLog {
        &self.log
    }
}

impl std::fmt::Debug for ChecksumGatedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumGatedStore")
            .field("sink", &self.name())
            .field("logged", &self.log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        writes: AtomicUsize,
        removes: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl TopologySink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn write(&self, super_pod_id: &str, _payload: &[u8]) -> Result<(), StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::ConfigObject {
                    namespace: "test".into(),
                    name: super_pod_id.into(),
                    message: "injected".into(),
                });
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove(&self, _super_pod_id: &str) -> Result<(), StoreError> {
            self.removes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unchanged_checksum_skips_write() {
        let sink = Arc::new(CountingSink::default());
        let store = ChecksumGatedStore::new(sink.clone());

        assert!(store.write("1", "aaa", b"{}").await.unwrap());
        assert!(!store.write("1", "aaa", b"{}").await.unwrap());
        assert!(store.write("1", "bbb", b"{}").await.unwrap());
        assert_eq!(sink.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_log_untouched() {
        let sink = Arc::new(CountingSink::default());
        let store = ChecksumGatedStore::new(sink.clone());

        sink.fail.store(true, Ordering::SeqCst);
        assert!(store.write("1", "aaa", b"{}").await.is_err());
        assert_eq!(store.last_checksum("1"), None);

        sink.fail.store(false, Ordering::SeqCst);
        assert!(store.write("1", "aaa", b"{}").await.unwrap());
        assert_eq!(store.last_checksum("1").as_deref(), Some("aaa"));
    }

    #[tokio::test]
    async fn test_forced_write_and_remove() {
        let sink = Arc::new(CountingSink::default());
        let store = ChecksumGatedStore::new(sink.clone());

        store.write_forced("1", "aaa", b"{}").await.unwrap();
        store.write_forced("1", "aaa", b"{}").await.unwrap();
        assert_eq!(sink.writes.load(Ordering::SeqCst), 2);

        store.remove("1").await.unwrap();
        assert!(store.log().is_empty());
        assert_eq!(sink.removes.load(Ordering::SeqCst), 1);
    }
}
