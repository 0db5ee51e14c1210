//! Conflict handlers - settle divergences with a resolution strategy.

use crate::error::Result;
use crate::Engine;
use roster_sync_engine::{ResolutionStrategy, SyncConflict, SyncOperation};
use serde::{Deserialize, Serialize};

/// Request body for resolving a conflict.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    /// Strategy tag; the configured default applies when absent
    #[serde(default)]
    pub strategy: Option<String>,
    /// Final value for the `manual` strategy
    #[serde(default)]
    pub resolved_data: Option<serde_json::Value>,
}

/// Response for a list of open conflicts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictsResponse {
    pub conflicts: Vec<SyncConflict>,
    pub count: usize,
}

/// Response for a resolved conflict.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub conflict_id: String,
    pub strategy: ResolutionStrategy,
    pub operation: SyncOperation,
}

pub fn handle_list_conflicts(engine: &Engine) -> ConflictsResponse {
    let conflicts = engine.list_conflicts();
    ConflictsResponse {
        count: conflicts.len(),
        conflicts,
    }
}

/// Resolve one conflict.
pub fn handle_resolve(
    engine: &Engine,
    conflict_id: &str,
    request: ResolveRequest,
) -> Result<ResolveResponse> {
    let strategy = match request.strategy.as_deref() {
        Some(tag) => tag.parse::<ResolutionStrategy>()?,
        None => engine.config().default_conflict_strategy,
    };

    let operation = engine.resolve(conflict_id, strategy, request.resolved_data)?;

    Ok(ResolveResponse {
        conflict_id: conflict_id.to_string(),
        strategy,
        operation,
    })
}
