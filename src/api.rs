//! HTTP ingress
//!
//! Routes:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `/api/v1/faults` | submit a fault report |
//! | GET | `/api/v1/faults` | active faults, optionally `?node=` |
//! | PUT | `/api/v1/superpods/:id/nodes/:node` | add or replace a node |
//! | DELETE | `/api/v1/nodes/:node` | remove a node |
//! | GET | `/api/v1/health` | counters and controller state |
//!
//! Fault submission always answers 200; the body carries the ingestion code.

use crate::fault::cache::FaultRecord;
use crate::fault::deletion::DeletionQueue;
use crate::fault::ingest::{FaultIngestor, IngestResponse, IngestStatsSnapshot, CODE_INVALID};
use crate::fault::model::FaultReport;
use crate::fault::validator::is_node_name;
use crate::pingmesh::lifecycle::ControllerState;
use crate::pingmesh::manager::PingMeshManager;
use crate::topology::model::{is_super_pod_id, Device, NodeDevice};
use crate::topology::publisher::TopologyPublisher;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<FaultIngestor>,
    pub publisher: Arc<TopologyPublisher>,
    pub deletions: Arc<DeletionQueue>,
    pub pingmesh: Arc<PingMeshManager>,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/faults", get(list_faults).post(submit_faults))
        .route("/api/v1/superpods/:id/nodes/:node", put(upsert_node))
        .route("/api/v1/nodes/:node", delete(remove_node))
        .route("/api/v1/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn submit_faults(
    State(state): State<AppState>,
    payload: Result<Json<FaultReport>, JsonRejection>,
) -> Json<IngestResponse> {
    match payload {
        Ok(Json(report)) => Json(state.ingestor.report(&report)),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "undecodable fault report");
            Json(IngestResponse {
                code: CODE_INVALID,
                message: rejection.body_text(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct FaultQuery {
    node: Option<String>,
}

async fn list_faults(
    State(state): State<AppState>,
    Query(query): Query<FaultQuery>,
) -> Json<BTreeMap<String, Vec<FaultRecord>>> {
    let cache = state.ingestor.cache();
    match query.node {
        Some(node) => {
            let records = cache.faults_on(&node);
            let mut snapshot = BTreeMap::new();
            if !records.is_empty() {
                snapshot.insert(node, records);
            }
            Json(snapshot)
        }
        None => Json(cache.snapshot()),
    }
}

/// Body of a node upsert
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBody {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub server_index: u32,
    #[serde(default)]
    pub devices: Vec<Device>,
}

async fn upsert_node(
    State(state): State<AppState>,
    Path((super_pod_id, node_name)): Path<(String, String)>,
    Json(body): Json<NodeBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    if !is_super_pod_id(&super_pod_id) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("invalid superpod id {:?}", super_pod_id),
        ));
    }
    if !is_node_name(&node_name) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("invalid node name {:?}", node_name),
        ));
    }

    let mut node = NodeDevice::new(node_name);
    node.serial_number = body.serial_number;
    node.server_index = body.server_index;
    for device in body.devices {
        node = node.with_device(device);
    }

    state.publisher.observe_node(&super_pod_id, node);
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_node(State(state): State<AppState>, Path(node_name): Path<String>) -> StatusCode {
    if state.publisher.remove_node(&node_name) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub active_faults: usize,
    pub faulty_nodes: usize,
    pub pending_deletions: usize,
    pub superpods: usize,
    pub nodes: usize,
    pub pending_events: usize,
    pub detection: ControllerState,
    pub ingest: IngestStatsSnapshot,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let cache = state.ingestor.cache();
    let topology = state.publisher.topology();
    Json(Health {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_faults: cache.len(),
        faulty_nodes: cache.node_count(),
        pending_deletions: state.deletions.len(),
        superpods: topology.len(),
        nodes: topology.node_count(),
        pending_events: state.publisher.events().len(),
        detection: state.pingmesh.state(),
        ingest: state.ingestor.stats(),
    })
}
