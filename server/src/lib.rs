//! Roster Sync Server - mock API over the Roster sync engine.
//!
//! Hosts one [`SyncEngine`] backed by an in-memory remote of record and
//! exposes its queue, conflicts, stats and config as a JSON HTTP API. The
//! `/remote` routes let callers play the part of the remote: seed records,
//! delete them, or take the whole remote offline.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

pub use config::{Config, ConfigError};
pub use error::{AppError, Result};

use axum::Router;
use roster_sync_engine::{Clock, MemoryRemote, SyncEngine, SystemClock};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The engine as the server hosts it.
pub type Engine = SyncEngine<Arc<MemoryRemote>>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub remote: Arc<MemoryRemote>,
}

impl AppState {
    /// Build a fresh engine and remote from configuration.
    pub fn new(config: &Config) -> std::result::Result<Self, roster_sync_engine::Error> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_clock(config, clock)
    }

    /// Same as [`AppState::new`] with an explicit clock.
    pub fn with_clock(
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, roster_sync_engine::Error> {
        let remote = MemoryRemote::new_shared(clock.clone());
        let engine = SyncEngine::with_clock(remote.clone(), config.engine.clone(), clock)?;

        Ok(Self {
            engine: Arc::new(engine),
            remote,
        })
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
