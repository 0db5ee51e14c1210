//! Mock remote handlers - let callers act as the remote of record.

use crate::error::{AppError, Result};
use crate::AppState;
use roster_sync_engine::{EntityKey, RemoteSnapshot, Timestamp};
use serde::{Deserialize, Serialize};

/// Request body for writing a remote record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRemoteRequest {
    pub data: serde_json::Value,
    /// Explicit last-modified time; the current time is used when absent
    #[serde(default)]
    pub last_modified: Option<Timestamp>,
}

/// Request body for the outage switch.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineRequest {
    pub offline: bool,
}

/// Request body for seeding a sync point.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPointBody {
    pub timestamp: Timestamp,
}

/// A remote record as served back to callers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecordResponse {
    #[serde(flatten)]
    pub key: EntityKey,
    pub deleted: bool,
    #[serde(flatten)]
    pub snapshot: RemoteSnapshot,
}

impl RemoteRecordResponse {
    fn new(key: EntityKey, snapshot: RemoteSnapshot) -> Self {
        Self {
            deleted: snapshot.is_deleted(),
            key,
            snapshot,
        }
    }
}

pub fn handle_put_remote(
    state: &AppState,
    key: EntityKey,
    request: PutRemoteRequest,
) -> Result<RemoteRecordResponse> {
    if request.data.is_null() {
        return Err(AppError::BadRequest(
            "data must not be null; use DELETE to tombstone".into(),
        ));
    }

    let snapshot = match request.last_modified {
        Some(at) => state.remote.put_at(key.clone(), request.data, at),
        None => state.remote.put(key.clone(), request.data),
    };
    Ok(RemoteRecordResponse::new(key, snapshot))
}

pub fn handle_delete_remote(state: &AppState, key: EntityKey) -> RemoteRecordResponse {
    let snapshot = state.remote.delete(key.clone());
    RemoteRecordResponse::new(key, snapshot)
}

pub fn handle_get_remote(state: &AppState, key: EntityKey) -> Result<RemoteRecordResponse> {
    state
        .remote
        .get(&key)
        .map(|snapshot| RemoteRecordResponse::new(key.clone(), snapshot))
        .ok_or_else(|| AppError::NotFound(format!("remote record {key}")))
}

pub fn handle_set_offline(state: &AppState, request: OfflineRequest) -> OfflineRequest {
    state.remote.set_offline(request.offline);
    tracing::info!(offline = request.offline, "Remote outage switch flipped");
    OfflineRequest {
        offline: state.remote.is_offline(),
    }
}
