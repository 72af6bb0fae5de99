use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::security::BlockEntry;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub uptime_secs: u64,
    pub webhook_configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PipelineStats {
    pub active_blocks: usize,
    pub tracked_clients: usize,
    pub rate_limit_keys: usize,
    pub processed_events: usize,
    pub idempotency_capacity: usize,
    pub signatures: usize,
    pub log_sampling: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockRequest {
    pub client: String,
    pub duration_secs: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        webhook_configured: state.webhooks.is_configured(),
    })
}

pub async fn get_blocks(State(state): State<AppState>) -> Json<Vec<BlockEntry>> {
    Json(state.shield.registry().active())
}

/// Manual ban, e.g. after an out-of-band report.
pub async fn create_block(
    State(state): State<AppState>,
    Json(request): Json<BlockRequest>,
) -> Result<Json<BlockEntry>, StatusCode> {
    if request.client.trim().is_empty() || request.duration_secs == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let expires_at = state
        .shield
        .registry()
        .block(&request.client, request.duration_secs);
    tracing::info!(client = %request.client, expires_at, "Client blocked by operator");
    Ok(Json(BlockEntry {
        client: request.client,
        expires_at,
    }))
}

pub async fn delete_block(
    State(state): State<AppState>,
    Path(client): Path<String>,
) -> StatusCode {
    if state.shield.registry().unblock(&client) {
        tracing::info!(client = %client, "Client unblocked by operator");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn get_stats(State(state): State<AppState>) -> Json<PipelineStats> {
    let shield = &state.shield;
    Json(PipelineStats {
        active_blocks: shield.registry().active().len(),
        tracked_clients: shield.recon().tracked_clients(),
        rate_limit_keys: shield.limiter().tracked_keys(),
        processed_events: state.webhooks.processed().len(),
        idempotency_capacity: state.webhooks.processed().capacity(),
        signatures: shield.gate().signature_count(),
        log_sampling: shield.sampler().is_sampling(),
    })
}
