//! Conflict routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use roster_sync_engine::SyncConflict;

use crate::error::Result;
use crate::handlers::{
    handle_list_conflicts, handle_resolve, ConflictsResponse, ResolveRequest, ResolveResponse,
};
use crate::AppState;

/// Create conflict routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/conflicts", get(list_handler))
        .route("/sync/conflicts/{id}", get(get_handler))
        .route("/sync/conflicts/{id}/resolve", post(resolve_handler))
}

/// GET /sync/conflicts - List open conflicts.
async fn list_handler(State(state): State<AppState>) -> Json<ConflictsResponse> {
    Json(handle_list_conflicts(&state.engine))
}

/// GET /sync/conflicts/{id} - Fetch one conflict.
async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncConflict>> {
    Ok(Json(state.engine.get_conflict(&id)?))
}

/// POST /sync/conflicts/{id}/resolve - Settle a conflict.
async fn resolve_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>> {
    Ok(Json(handle_resolve(&state.engine, &id, request)?))
}
