use podwatch::pingmesh::{
    ControllerCommand, ControllerState, LogOnlyController, PingMeshConfig, PingMeshManager,
};
use podwatch::topology::{
    ChecksumGatedStore, EventMap, FileSink, NodeDevice, TopologyPublisher, TopologyStore,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_source(path: &Path, activate: bool, task_interval: u64) {
    let body = serde_json::json!({
        "global": {"activate": activate, "taskInterval": task_interval},
        "1": {"activate": activate, "taskInterval": task_interval, "protocol": "icmp"}
    });
    std::fs::write(path, serde_json::to_vec(&body).unwrap()).unwrap();
}

fn manager(dir: &TempDir) -> (Arc<PingMeshManager>, Arc<LogOnlyController>) {
    let controller = Arc::new(LogOnlyController::new());
    let manager = PingMeshManager::new(controller.clone(), dir.path().join("out/pingmesh.json"))
        .with_source(dir.path().join("pingmesh-source.json"), Duration::from_secs(1));
    (Arc::new(manager), controller)
}

#[tokio::test]
async fn test_source_file_drives_controller() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("pingmesh-source.json");
    let (manager, controller) = manager(&dir);

    // No file yet: nothing to do
    assert_eq!(manager.check_once().await.unwrap(), None);
    assert_eq!(manager.state(), ControllerState::Idle);

    write_source(&source, true, 5);
    assert_eq!(
        manager.check_once().await.unwrap(),
        Some(ControllerCommand::Start)
    );
    assert_eq!(manager.state(), ControllerState::Running);
    assert!(dir.path().join("out/pingmesh.json").exists());

    // Same content: no command
    assert_eq!(manager.check_once().await.unwrap(), None);

    write_source(&source, true, 10);
    assert_eq!(
        manager.check_once().await.unwrap(),
        Some(ControllerCommand::Reload)
    );

    write_source(&source, false, 10);
    assert_eq!(
        manager.check_once().await.unwrap(),
        Some(ControllerCommand::Stop)
    );
    assert_eq!(manager.state(), ControllerState::Stopped);

    // Re-enabling a stopped controller reloads it instead of starting a second one
    write_source(&source, true, 10);
    assert_eq!(
        manager.check_once().await.unwrap(),
        Some(ControllerCommand::Reload)
    );

    assert_eq!(controller.starts(), 1);
    assert_eq!(controller.stops(), 1);
    assert_eq!(controller.reloads(), 2);
}

#[tokio::test]
async fn test_invalid_source_keeps_previous_config() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("pingmesh-source.json");
    let (manager, _) = manager(&dir);

    write_source(&source, true, 5);
    manager.check_once().await.unwrap();

    write_source(&source, true, 600);
    assert!(manager.check_once().await.is_err());

    let current: PingMeshConfig = manager.current().await;
    assert_eq!(current.get("global").unwrap().task_interval, 5);
    assert_eq!(manager.state(), ControllerState::Running);
}

#[tokio::test]
async fn test_topology_file_change_reloads_running_controller() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("pingmesh-source.json");
    let (manager, controller) = manager(&dir);

    let file_sink = FileSink::new(dir.path().join("superpods")).with_reload_hook(manager.clone());
    let publisher = TopologyPublisher::new(
        Arc::new(TopologyStore::new()),
        Arc::new(EventMap::new()),
        vec![Arc::new(ChecksumGatedStore::new(Arc::new(file_sink)))],
    );

    // Not running yet: the write does not touch the controller
    publisher.observe_node("1", NodeDevice::new("node-a"));
    publisher.reconcile_once().await;
    assert_eq!(controller.reloads(), 0);

    write_source(&source, true, 5);
    manager.check_once().await.unwrap();

    publisher.observe_node("1", NodeDevice::new("node-b"));
    publisher.reconcile_once().await;
    assert_eq!(controller.reloads(), 1);
}
