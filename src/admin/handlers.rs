use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::operations::OperationCounts;
use crate::registry::Heartbeat;
use crate::services::unix_now;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub network: String,
    pub pending_operations: usize,
}

#[derive(Serialize)]
pub struct NetworkStatus {
    pub name: String,
    pub alive: bool,
    pub heartbeat: Option<Heartbeat>,
    pub event_bookmark: Option<u64>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let pending = state.store.read(|t| t.pending_operation_count(state.network_id));
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        network: state.network_name.clone(),
        pending_operations: pending,
    })
}

pub async fn get_operations(State(state): State<AdminState>) -> Json<OperationCounts> {
    Json(state.store.read(|t| t.operation_counts(state.network_id)))
}

pub async fn get_network(State(state): State<AdminState>) -> Json<NetworkStatus> {
    let now = unix_now();
    let status = state.store.read(|t| NetworkStatus {
        name: state.network_name.clone(),
        alive: t.is_network_alive(state.network_id, &state.heartbeat, now),
        heartbeat: t.heartbeat(state.network_id),
        event_bookmark: t
            .network(state.network_id)
            .ok()
            .and_then(|n| n.metadata.event_bookmark),
    });
    Json(status)
}
