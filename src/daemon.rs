//! Daemon wiring
//!
//! Builds every component from a [`DaemonConfig`], spawns the background loops
//! and shuts them down together on one cancellation token.

use crate::api::{self, AppState};
use crate::config::DaemonConfig;
use crate::error::Result;
use crate::fault::admission::AdmissionLimiter;
use crate::fault::cache::FaultCache;
use crate::fault::catalog::StaticFaultCatalog;
use crate::fault::deletion::{DeletionQueue, DeletionWorker};
use crate::fault::ingest::FaultIngestor;
use crate::fault::validator::Validator;
use crate::pingmesh::controller::{CommandController, DetectionController, LogOnlyController};
use crate::pingmesh::manager::PingMeshManager;
use crate::topology::config_object::{
    ConfigObjectClient, ConfigObjectSink, DirConfigObjects, InMemoryConfigObjects,
};
use crate::topology::events::EventMap;
use crate::topology::file_store::FileSink;
use crate::topology::publisher::TopologyPublisher;
use crate::topology::sink::ChecksumGatedStore;
use crate::topology::store::TopologyStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Daemon {
    config: DaemonConfig,
    deletions: Arc<DeletionQueue>,
    cache: Arc<FaultCache>,
    ingestor: Arc<FaultIngestor>,
    publisher: Arc<TopologyPublisher>,
    pingmesh: Arc<PingMeshManager>,
    cancel: CancellationToken,
}

impl Daemon {
    /// Construct all components; nothing runs until [`run`](Self::run)
    pub fn build(config: DaemonConfig) -> Result<Self> {
        config.validate()?;

        let catalog = match &config.faults.catalog_path {
            Some(path) => {
                let catalog = StaticFaultCatalog::from_file(path)?;
                info!(path = %path.display(), codes = catalog.len(), "fault catalog loaded");
                catalog
            }
            None => {
                warn!("no fault catalog configured, every fault code will be rejected");
                StaticFaultCatalog::new()
            }
        };

        let topology = Arc::new(TopologyStore::new());
        let origins = config.ingest.allowed_origins.clone();

        let validator = Arc::new(Validator::new(
            Arc::new(catalog),
            topology.clone(),
            origins.iter().cloned(),
        ));
        let admission = Arc::new(AdmissionLimiter::new(
            config.ingest.rate_per_second,
            origins.iter().cloned(),
        )?);

        let deletions = Arc::new(DeletionQueue::new(config.faults.idle_poll()));
        let cache = Arc::new(FaultCache::new(
            config.faults.grace_period(),
            deletions.clone(),
        ));
        let ingestor = Arc::new(FaultIngestor::new(validator, admission, cache.clone()));

        let controller: Arc<dyn DetectionController> = match &config.pingmesh.controller_program {
            Some(program) => Arc::new(CommandController::new(
                program,
                config.pingmesh.controller_args.clone(),
            )),
            None => Arc::new(LogOnlyController::new()),
        };
        let mut pingmesh = PingMeshManager::new(controller, &config.pingmesh.output_file);
        if let Some(source) = &config.pingmesh.config_path {
            pingmesh = pingmesh.with_source(source, config.pingmesh.check_interval());
        }
        let pingmesh = Arc::new(pingmesh);

        let objects: Arc<dyn ConfigObjectClient> = match &config.topology.object_dir {
            Some(dir) => Arc::new(DirConfigObjects::new(dir)),
            None => Arc::new(InMemoryConfigObjects::new()),
        };
        let object_sink = ConfigObjectSink::new(objects, &config.topology.namespace);
        let file_sink =
            FileSink::new(&config.topology.file_root).with_reload_hook(pingmesh.clone());

        let publisher = Arc::new(
            TopologyPublisher::new(
                topology,
                Arc::new(EventMap::new()),
                vec![
                    Arc::new(ChecksumGatedStore::new(Arc::new(object_sink))),
                    Arc::new(ChecksumGatedStore::new(Arc::new(file_sink))),
                ],
            )
            .with_interval(config.topology.reconcile_interval())
            .with_batch_size(config.topology.batch_size),
        );

        Ok(Self {
            config,
            deletions,
            cache,
            ingestor,
            publisher,
            pingmesh,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops every loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ingestor(&self) -> &Arc<FaultIngestor> {
        &self.ingestor
    }

    pub fn publisher(&self) -> &Arc<TopologyPublisher> {
        &self.publisher
    }

    pub fn cache(&self) -> &Arc<FaultCache> {
        &self.cache
    }

    pub fn pingmesh(&self) -> &Arc<PingMeshManager> {
        &self.pingmesh
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            ingestor: self.ingestor.clone(),
            publisher: self.publisher.clone(),
            deletions: self.deletions.clone(),
            pingmesh: self.pingmesh.clone(),
            started_at: Instant::now(),
        }
    }

    /// Run until the cancellation token fires
    pub async fn run(self) -> Result<()> {
        info!("podwatch v{} starting", env!("CARGO_PKG_VERSION"));

        // Bind before spawning so a bind failure leaves nothing running
        let listener = if self.config.api.enabled {
            let listener = tokio::net::TcpListener::bind(&self.config.api.bind).await?;
            info!(bind = %self.config.api.bind, "HTTP ingress listening");
            Some(listener)
        } else {
            None
        };

        let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

        let worker = DeletionWorker::new(self.deletions.clone(), self.cache.clone());
        tasks.push(("deletion-worker", tokio::spawn(worker.run(self.cancel.clone()))));

        tasks.push((
            "topology-publisher",
            tokio::spawn(self.publisher.clone().run(self.cancel.clone())),
        ));

        tasks.push((
            "pingmesh-manager",
            tokio::spawn(self.pingmesh.clone().run(self.cancel.clone())),
        ));

        let server = listener.map(|listener| {
            let app = api::router(self.app_state());
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { cancel.cancelled().await })
                    .await
            })
        });

        self.cancel.cancelled().await;
        info!("shutdown requested");

        if let Some(server) = server {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "HTTP ingress failed"),
                Err(e) => error!(error = %e, "HTTP ingress task panicked"),
            }
        }
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "background task panicked");
            }
        }

        info!(
            active_faults = self.cache.len(),
            pending_events = self.publisher.events().len(),
            "podwatch stopped"
        );
        Ok(())
    }
}
