//! PingMesh Config Manager
//!
//! Compares each new detection configuration with the last accepted one and
//! drives the detection controller through its lifecycle. The effective
//! configuration is written to disk before every start or reload so the
//! controller always picks up what was decided.

use crate::error::{ConfigError, PodwatchError};
use crate::pingmesh::config::PingMeshConfig;
use crate::pingmesh::controller::DetectionController;
use crate::pingmesh::lifecycle::{ControllerCommand, ControllerLifecycle, ControllerState};
use crate::topology::file_store::write_guarded;
use crate::topology::sink::ReloadHook;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default interval between configuration checks
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct ManagerState {
    current: PingMeshConfig,
    lifecycle: ControllerLifecycle,
}

pub struct PingMeshManager {
    controller: Arc<dyn DetectionController>,
    output_file: PathBuf,
    source: Option<PathBuf>,
    check_interval: Duration,
    state: Mutex<ManagerState>,
    /// Last lifecycle state, readable while a controller call holds `state`
    status: RwLock<ControllerState>,
}

impl PingMeshManager {
    /// `output_file` receives the effective configuration before each start or reload
    pub fn new(controller: Arc<dyn DetectionController>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            controller,
            output_file: output_file.into(),
            source: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
            state: Mutex::new(ManagerState::default()),
            status: RwLock::new(ControllerState::Idle),
        }
    }

    /// Poll `path` for new configuration in [`run`](Self::run)
    pub fn with_source(mut self, path: impl Into<PathBuf>, check_interval: Duration) -> Self {
        self.source = Some(path.into());
        self.check_interval = check_interval;
        self
    }

    /// Never waits on an in-flight start, reload or stop
    pub fn state(&self) -> ControllerState {
        *self.status.read()
    }

    fn record(&self, lifecycle: &ControllerLifecycle) {
        *self.status.write() = lifecycle.state();
    }

    pub async fn current(&self) -> PingMeshConfig {
        self.state.lock().await.current.clone()
    }

    /// Apply a new configuration.
    ///
    /// Returns the command issued, if any. On error the previous configuration
    /// stays in effect.
    pub async fn apply(
        &self,
        next: PingMeshConfig,
    ) -> Result<Option<ControllerCommand>, PodwatchError> {
        if let Err(e) = next.validate() {
            warn!(error = %e, "detection config rejected, keeping previous");
            return Err(e.into());
        }

        let mut state = self.state.lock().await;
        let changed = next.changed_keys(&state.current);

        if changed.is_empty() && !state.lifecycle.is_active() {
            return Ok(None);
        }

        let command = state
            .lifecycle
            .decide(next.want_running(), !changed.is_empty());
        debug!(changed = ?changed, state = %state.lifecycle.state(), ?command, "detection config evaluated");

        match command {
            Some(ControllerCommand::Start) => {
                self.write_effective(&next).await?;
                state.lifecycle.on_starting();
                self.record(&state.lifecycle);
                if let Err(e) = self.controller.start().await {
                    state.lifecycle.on_start_failed();
                    self.record(&state.lifecycle);
                    error!(controller = self.controller.name(), error = %e, "detection start failed");
                    return Err(e.into());
                }
                state.lifecycle.on_running();
            }
            Some(ControllerCommand::Reload) => {
                self.write_effective(&next).await?;
                self.controller.reload().await?;
                state.lifecycle.on_running();
            }
            Some(ControllerCommand::Stop) => {
                self.controller.stop().await?;
                state.lifecycle.on_stopped();
            }
            None => {}
        }
        self.record(&state.lifecycle);

        if let Some(command) = command {
            info!(%command, controller = self.controller.name(), state = %state.lifecycle.state(), "detection controller updated");
        }
        state.current = next;
        Ok(command)
    }

    /// Read the configured source once and apply it
    pub async fn check_once(&self) -> Result<Option<ControllerCommand>, PodwatchError> {
        let Some(path) = &self.source else {
            return Ok(None);
        };

        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(path = %path.display(), "no detection config present");
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                }
                .into())
            }
        }

        let config = load_config(path).await?;
        self.apply(config).await
    }

    /// Reload a running controller after topology files changed
    pub async fn on_topology_changed(&self) {
        let mut state = self.state.lock().await;
        if !state.lifecycle.is_active() {
            return;
        }
        match self.controller.reload().await {
            Ok(()) => {
                state.lifecycle.on_running();
                self.record(&state.lifecycle);
                debug!("detection controller reloaded for topology change");
            }
            Err(e) => warn!(error = %e, "detection reload after topology change failed"),
        }
    }

    /// Poll the configuration source until `cancel` fires, then stop a running controller
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            source = ?self.source,
            interval_s = self.check_interval.as_secs(),
            "pingmesh config manager started"
        );

        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        warn!(error = %e, "detection config check failed");
                    }
                }
            }
        }

        let mut state = self.state.lock().await;
        if state.lifecycle.is_active() {
            if let Err(e) = self.controller.stop().await {
                warn!(error = %e, "failed to stop detection controller on shutdown");
            } else {
                state.lifecycle.on_stopped();
                self.record(&state.lifecycle);
            }
        }
        info!("pingmesh config manager stopped");
    }

    async fn write_effective(&self, config: &PingMeshConfig) -> Result<(), PodwatchError> {
        let root = self.output_file.parent().unwrap_or_else(|| Path::new("."));
        let contents = serde_json::to_vec_pretty(config).map_err(crate::error::StoreError::from)?;
        write_guarded(root, &self.output_file, &contents).await?;
        debug!(path = %self.output_file.display(), "effective detection config written");
        Ok(())
    }
}

async fn load_config(path: &Path) -> Result<PingMeshConfig, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let config: PingMeshConfig =
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

#[async_trait]
impl ReloadHook for PingMeshManager {
    async fn on_topology_changed(&self) {
        PingMeshManager::on_topology_changed(self).await
    }
}

impl std::fmt::Debug for PingMeshManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingMeshManager")
            .field("controller", &self.controller.name())
            .field("output_file", &self.output_file)
            .field("source", &self.source)
            .finish()
    }
}
