//! Operation queue routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use roster_sync_engine::{NewOperation, SyncOperation};

use crate::error::Result;
use crate::handlers::{
    handle_enqueue, handle_list, handle_purge, ListOperationsQuery, OperationsResponse,
    PurgeResponse,
};
use crate::AppState;

/// Create operation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/operations", get(list_handler).post(enqueue_handler))
        .route("/sync/operations/completed", delete(purge_handler))
        .route("/sync/operations/{id}", get(get_handler))
}

/// POST /sync/operations - Queue a local change.
async fn enqueue_handler(
    State(state): State<AppState>,
    Json(request): Json<NewOperation>,
) -> Result<(StatusCode, Json<SyncOperation>)> {
    let op = handle_enqueue(&state.engine, request)?;
    Ok((StatusCode::CREATED, Json(op)))
}

/// GET /sync/operations - List queued operations.
async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<ListOperationsQuery>,
) -> Result<Json<OperationsResponse>> {
    Ok(Json(handle_list(&state.engine, query)?))
}

/// GET /sync/operations/{id} - Fetch one operation.
async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncOperation>> {
    Ok(Json(state.engine.get_operation(&id)?))
}

/// DELETE /sync/operations/completed - Purge completed operations.
async fn purge_handler(State(state): State<AppState>) -> Json<PurgeResponse> {
    Json(handle_purge(&state.engine))
}
