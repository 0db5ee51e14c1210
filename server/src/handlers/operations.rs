//! Operation handlers - enqueue, inspect and purge queued changes.

use crate::error::{AppError, Result};
use crate::Engine;
use roster_sync_engine::{
    ChangeKind, NewOperation, OperationFilter, Priority, SyncOperation, SyncStatus,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Query string for listing operations.
///
/// `status` and `priority` take comma-separated lists.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOperationsQuery {
    pub status: Option<String>,
    pub entity_type: Option<String>,
    pub priority: Option<String>,
}

impl ListOperationsQuery {
    /// Turn the raw query into an engine filter.
    pub fn into_filter(self) -> Result<OperationFilter> {
        Ok(OperationFilter {
            status: parse_list::<SyncStatus>(self.status.as_deref())?,
            entity_type: self.entity_type.filter(|t| !t.is_empty()),
            priority: parse_list::<Priority>(self.priority.as_deref())?,
        })
    }
}

/// Response for a list of operations.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsResponse {
    pub operations: Vec<SyncOperation>,
    pub count: usize,
}

/// Response for a purge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    pub removed: usize,
}

fn parse_list<T>(raw: Option<&str>) -> Result<Vec<T>>
where
    T: FromStr<Err = String>,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.parse().map_err(AppError::BadRequest))
        .collect()
}

/// Validate and enqueue a new operation.
pub fn handle_enqueue(engine: &Engine, request: NewOperation) -> Result<SyncOperation> {
    if request.entity_type.trim().is_empty() {
        return Err(AppError::BadRequest("entityType must not be empty".into()));
    }
    if request.entity_id.trim().is_empty() {
        return Err(AppError::BadRequest("entityId must not be empty".into()));
    }
    if request.change_kind != ChangeKind::Delete && request.local_data.is_null() {
        return Err(AppError::BadRequest(format!(
            "{:?} requires localData",
            request.change_kind
        )));
    }

    let op = engine.enqueue(request);
    tracing::info!(
        operation_id = %op.id,
        entity = %op.entity_key(),
        "Operation accepted"
    );
    Ok(op)
}

/// List operations matching the query.
pub fn handle_list(engine: &Engine, query: ListOperationsQuery) -> Result<OperationsResponse> {
    let filter = query.into_filter()?;
    let operations = engine.list_operations(&filter);
    Ok(OperationsResponse {
        count: operations.len(),
        operations,
    })
}

/// Drop completed operations.
pub fn handle_purge(engine: &Engine) -> PurgeResponse {
    PurgeResponse {
        removed: engine.purge_completed(),
    }
}
