//! Mock remote routes.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use roster_sync_engine::EntityKey;

use crate::error::Result;
use crate::handlers::{
    handle_delete_remote, handle_get_remote, handle_put_remote, handle_set_offline,
    OfflineRequest, PutRemoteRequest, RemoteRecordResponse,
};
use crate::AppState;

/// Create mock remote routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/remote/offline", put(offline_handler))
        .route(
            "/remote/{entity_type}/{entity_id}",
            get(get_handler).put(put_handler).delete(delete_handler),
        )
}

/// PUT /remote/{entity_type}/{entity_id} - Write a remote record.
async fn put_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(request): Json<PutRemoteRequest>,
) -> Result<Json<RemoteRecordResponse>> {
    let key = EntityKey::new(entity_type, entity_id);
    Ok(Json(handle_put_remote(&state, key, request)?))
}

/// DELETE /remote/{entity_type}/{entity_id} - Tombstone a remote record.
async fn delete_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Json<RemoteRecordResponse> {
    Json(handle_delete_remote(
        &state,
        EntityKey::new(entity_type, entity_id),
    ))
}

/// GET /remote/{entity_type}/{entity_id} - Inspect a remote record.
async fn get_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<RemoteRecordResponse>> {
    Ok(Json(handle_get_remote(
        &state,
        EntityKey::new(entity_type, entity_id),
    )?))
}

/// PUT /remote/offline - Simulate a remote outage.
async fn offline_handler(
    State(state): State<AppState>,
    Json(request): Json<OfflineRequest>,
) -> Json<OfflineRequest> {
    Json(handle_set_offline(&state, request))
}
