use async_trait::async_trait;
use podwatch::error::StoreError;
use podwatch::topology::{
    ChecksumGatedStore, ConfigObjectSink, Device, EventMap, FileSink, InMemoryConfigObjects,
    NodeDevice, Operator, TopologyPublisher, TopologySink, TopologyStore,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Sink that fails on demand and counts successful writes
#[derive(Default)]
struct FlakySink {
    failing: AtomicBool,
    writes: AtomicUsize,
}

#[async_trait]
impl TopologySink for FlakySink {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn write(&self, super_pod_id: &str, _payload: &[u8]) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::ConfigObject {
                namespace: "test".to_string(),
                name: super_pod_id.to_string(),
                message: "store unavailable".to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, _super_pod_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

struct Fixture {
    publisher: TopologyPublisher,
    objects: Arc<InMemoryConfigObjects>,
    object_store: Arc<ChecksumGatedStore>,
}

fn fixture() -> Fixture {
    let objects = Arc::new(InMemoryConfigObjects::new());
    let object_store = Arc::new(ChecksumGatedStore::new(Arc::new(ConfigObjectSink::new(
        objects.clone(),
        "cluster-system",
    ))));
    let publisher = TopologyPublisher::new(
        Arc::new(TopologyStore::new()),
        Arc::new(EventMap::new()),
        vec![object_store.clone()],
    );
    Fixture {
        publisher,
        objects,
        object_store,
    }
}

fn device(phy_id: u32) -> Device {
    Device {
        phy_id,
        logical_id: phy_id,
        ip_address: None,
    }
}

#[tokio::test]
async fn test_unchanged_superpod_is_written_once() {
    let f = fixture();
    f.publisher.observe_node("1", NodeDevice::new("node-a"));

    let stats = f.publisher.reconcile_once().await;
    assert_eq!(stats.written, 1);
    assert_eq!(f.objects.mutations(), 1);

    // Identical node: no event at all
    f.publisher.observe_node("1", NodeDevice::new("node-a"));
    assert!(f.publisher.events().is_empty());

    // A spurious update with identical content is gated by the checksum
    f.publisher.events().record("1", Operator::Update);
    let stats = f.publisher.reconcile_once().await;
    assert_eq!(stats.skipped, 1);
    assert_eq!(f.objects.mutations(), 1);
}

#[tokio::test]
async fn test_content_change_invalidates_checksum() {
    let f = fixture();
    f.publisher.observe_node("1", NodeDevice::new("node-a"));
    f.publisher.reconcile_once().await;
    let first = f.object_store.last_checksum("1").unwrap();

    f.publisher
        .observe_node("1", NodeDevice::new("node-a").with_device(device(0)));
    let stats = f.publisher.reconcile_once().await;

    assert_eq!(stats.written, 1);
    assert_eq!(f.objects.mutations(), 2);
    assert_ne!(f.object_store.last_checksum("1").unwrap(), first);
}

#[tokio::test]
async fn test_failed_write_is_retried_next_cycle() {
    let flaky = Arc::new(FlakySink::default());
    let store = Arc::new(ChecksumGatedStore::new(flaky.clone()));
    let publisher = TopologyPublisher::new(
        Arc::new(TopologyStore::new()),
        Arc::new(EventMap::new()),
        vec![store.clone()],
    );

    flaky.failing.store(true, Ordering::SeqCst);
    publisher.observe_node("7", NodeDevice::new("node-a"));

    let stats = publisher.reconcile_once().await;
    assert_eq!(stats.requeued, 1);
    assert_eq!(publisher.events().get("7"), Some(Operator::Add));
    assert!(store.last_checksum("7").is_none());

    flaky.failing.store(false, Ordering::SeqCst);
    let stats = publisher.reconcile_once().await;
    assert_eq!(stats.written, 1);
    assert_eq!(flaky.writes.load(Ordering::SeqCst), 1);
    assert!(store.last_checksum("7").is_some());
    assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn test_newer_event_wins_over_requeue() {
    let flaky = Arc::new(FlakySink::default());
    let publisher = TopologyPublisher::new(
        Arc::new(TopologyStore::new()),
        Arc::new(EventMap::new()),
        vec![Arc::new(ChecksumGatedStore::new(flaky.clone()))],
    );
    publisher.observe_node("1", NodeDevice::new("node-a"));
    assert!(!publisher.events().requeue("1", Operator::Update));
    assert_eq!(publisher.events().get("1"), Some(Operator::Add));
}

#[tokio::test]
async fn test_add_then_delete_coalesces_into_single_delete() {
    let f = fixture();
    f.publisher.observe_node("1", NodeDevice::new("node-a"));
    f.publisher.observe_node("1", NodeDevice::new("node-b"));
    f.publisher.reconcile_once().await;
    assert_eq!(f.objects.len(), 1);

    assert!(f.publisher.remove_node("node-a"));
    assert!(f.publisher.remove_node("node-b"));
    assert_eq!(f.publisher.events().len(), 1);
    assert_eq!(f.publisher.events().get("1"), Some(Operator::Delete));

    let stats = f.publisher.reconcile_once().await;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.removed, 1);
    assert!(f.objects.is_empty());
    assert!(f.object_store.last_checksum("1").is_none());
}

#[tokio::test]
async fn test_node_move_updates_both_superpods() {
    let f = fixture();
    f.publisher.observe_node("1", NodeDevice::new("node-a"));
    f.publisher.observe_node("1", NodeDevice::new("node-b"));
    f.publisher.reconcile_once().await;

    f.publisher.observe_node("2", NodeDevice::new("node-b"));
    assert_eq!(f.publisher.events().get("1"), Some(Operator::Update));
    assert_eq!(f.publisher.events().get("2"), Some(Operator::Add));

    let stats = f.publisher.reconcile_once().await;
    assert_eq!(stats.written, 2);
    assert_eq!(f.objects.len(), 2);
    assert_eq!(f.publisher.topology().super_pod_of("node-b").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_file_and_object_stores_stay_in_step() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(InMemoryConfigObjects::new());
    let file_sink = Arc::new(FileSink::new(dir.path()));
    let publisher = TopologyPublisher::new(
        Arc::new(TopologyStore::new()),
        Arc::new(EventMap::new()),
        vec![
            Arc::new(ChecksumGatedStore::new(Arc::new(ConfigObjectSink::new(
                objects.clone(),
                "cluster-system",
            )))),
            Arc::new(ChecksumGatedStore::new(file_sink.clone())),
        ],
    );

    publisher.observe_node("3", NodeDevice::new("node-c").with_device(device(1)));
    let stats = publisher.reconcile_once().await;
    assert_eq!(stats.written, 2);

    let path = file_sink.path_for("3").unwrap();
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written["superPodId"], "3");
    assert_eq!(written["nodeDeviceMap"]["node-c"]["devices"]["1"]["phyId"], 1);

    publisher.remove_node("node-c");
    publisher.reconcile_once().await;
    assert!(!path.exists());
    assert!(objects.is_empty());
}
