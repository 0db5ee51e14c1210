//! Conflict records.
//!
//! A [`SyncConflict`] captures a divergence between what the local caller
//! wants to persist and what the remote of record currently holds. Each
//! conflict points back at exactly one operation by id.

use crate::{ConflictId, EntityId, EntityKey, EntityType, OperationId, Timestamp};
use serde::{Deserialize, Serialize};

/// Classification of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides hold a value and the values differ
    Data,
    /// One side deleted the record while the other changed it
    DeleteVsUpdate,
    /// The two values disagree on the shape of a field
    Schema,
}

/// A detected divergence, one-to-one with a `conflict`-status operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Conflict identifier
    pub id: ConflictId,
    /// The operation held in `conflict` status
    pub operation_id: OperationId,
    /// Target record type
    pub entity_type: EntityType,
    /// Target record id
    pub entity_id: EntityId,
    /// What the local caller wanted to write
    pub local_data: serde_json::Value,
    /// What the remote holds; null for a remote deletion
    pub remote_data: serde_json::Value,
    /// Sync point both sides last agreed on
    pub last_sync_timestamp: Timestamp,
    /// Remote last-modified time seen at detection; a resolution settles
    /// against this version, not against whatever the remote holds later
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_modified: Option<Timestamp>,
    /// Kind of divergence
    pub conflict_kind: ConflictKind,
    /// Whether a deterministic strategy can settle it without a human
    pub auto_resolvable: bool,
    /// When the divergence was detected
    pub detected_at: Timestamp,
}

impl SyncConflict {
    /// The entity in dispute.
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.clone(), self.entity_id.clone())
    }

    /// Whether the remote side is a deletion.
    pub fn remote_deleted(&self) -> bool {
        self.remote_data.is_null()
    }
}
