//! Health check endpoint.
//!
//! The server answers `ok` whenever it can serve requests; the sync loop and
//! the mock remote report their own liveness alongside.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sync_loop_running: bool,
    pub remote_offline: bool,
    pub open_conflicts: usize,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// GET /health - Server, sync loop and remote liveness.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sync_loop_running: state.engine.is_running(),
        remote_offline: state.remote.is_offline(),
        open_conflicts: state.engine.stats().open_conflicts,
    })
}

async fn root() -> &'static str {
    "Roster Sync Server"
}
