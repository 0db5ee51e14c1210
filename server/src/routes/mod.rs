//! HTTP route definitions.

mod conflicts;
mod health;
mod operations;
mod remote;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(operations::routes())
        .merge(conflicts::routes())
        .merge(sync::routes())
        .merge(remote::routes())
}
