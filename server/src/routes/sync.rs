//! Engine control routes - passes, stats, config and snapshots.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use roster_sync_engine::{
    ConfigUpdate, EngineConfig, EngineSnapshot, EntityKey, SnapshotMetadata, SyncStats,
};

use crate::error::Result;
use crate::handlers::SyncPointBody;
use crate::AppState;

/// Create sync control routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/pass", post(pass_handler))
        .route("/sync/stats", get(stats_handler))
        .route("/sync/config", get(get_config_handler).put(put_config_handler))
        .route(
            "/sync/snapshot",
            get(export_snapshot_handler).put(import_snapshot_handler),
        )
        .route(
            "/sync/points/{entity_type}/{entity_id}",
            get(get_sync_point_handler).put(put_sync_point_handler),
        )
}

/// POST /sync/pass - Run one sync pass now and return the resulting stats.
async fn pass_handler(State(state): State<AppState>) -> Json<SyncStats> {
    Json(state.engine.run_pass().await)
}

/// GET /sync/stats - Current queue stats.
async fn stats_handler(State(state): State<AppState>) -> Json<SyncStats> {
    Json(state.engine.stats())
}

/// GET /sync/config - Current engine config.
async fn get_config_handler(State(state): State<AppState>) -> Json<EngineConfig> {
    Json(state.engine.config())
}

/// PUT /sync/config - Apply a partial config change.
async fn put_config_handler(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<EngineConfig>> {
    Ok(Json(state.engine.update_config(update)?))
}

/// GET /sync/snapshot - Export the whole engine state.
async fn export_snapshot_handler(State(state): State<AppState>) -> Json<EngineSnapshot> {
    Json(state.engine.export_snapshot())
}

/// PUT /sync/snapshot - Replace the engine state.
async fn import_snapshot_handler(
    State(state): State<AppState>,
    Json(snapshot): Json<EngineSnapshot>,
) -> Result<Json<SnapshotMetadata>> {
    let metadata = SnapshotMetadata::from(&snapshot);
    state.engine.import_snapshot(snapshot).await?;
    Ok(Json(metadata))
}

/// GET /sync/points/{entity_type}/{entity_id} - Last agreed sync point.
async fn get_sync_point_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Json<SyncPointBody> {
    let timestamp = state
        .engine
        .sync_point(&EntityKey::new(entity_type, entity_id));
    Json(SyncPointBody { timestamp })
}

/// PUT /sync/points/{entity_type}/{entity_id} - Seed a sync point.
async fn put_sync_point_handler(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(body): Json<SyncPointBody>,
) -> Json<SyncPointBody> {
    state
        .engine
        .record_sync_point(EntityKey::new(entity_type, entity_id), body.timestamp);
    Json(body)
}
