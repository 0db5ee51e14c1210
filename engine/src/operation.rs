//! Sync operation types.
//!
//! A [`SyncOperation`] is one desired change to one entity, tracked from the
//! moment it is enqueued until it reaches a terminal state. Operations are
//! never mutated in place by callers; the store applies an [`OperationPatch`].

use crate::{EntityId, EntityType, OperationId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

/// The kind of change an operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// Lifecycle status of an operation.
///
/// ```text
/// pending -> syncing -> completed
///                    -> conflict  (until resolved -> completed)
///                    -> pending   (transient failure, attempts left)
///                    -> failed    (transient failure, attempts exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Completed,
    Failed,
    Conflict,
}

impl SyncStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::Pending,
        SyncStatus::Syncing,
        SyncStatus::Completed,
        SyncStatus::Failed,
        SyncStatus::Conflict,
    ];

    /// Completed and failed operations never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status '{s}'"))
    }
}

/// Dispatch priority. Only affects ordering, never correctness.
///
/// Variants are declared low to high so the derived `Ord` matches urgency.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Identifies the record an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<EntityType>, entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A request to enqueue a new operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOperation {
    pub change_kind: ChangeKind,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    #[serde(default)]
    pub local_data: serde_json::Value,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl NewOperation {
    /// Build a request for the given change.
    pub fn new(
        change_kind: ChangeKind,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        local_data: serde_json::Value,
    ) -> Self {
        Self {
            change_kind,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            local_data,
            priority: None,
        }
    }

    pub fn create(
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        local_data: serde_json::Value,
    ) -> Self {
        Self::new(ChangeKind::Create, entity_type, entity_id, local_data)
    }

    pub fn update(
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        local_data: serde_json::Value,
    ) -> Self {
        Self::new(ChangeKind::Update, entity_type, entity_id, local_data)
    }

    /// Deletes carry no payload.
    pub fn delete(entity_type: impl Into<EntityType>, entity_id: impl Into<EntityId>) -> Self {
        Self::new(
            ChangeKind::Delete,
            entity_type,
            entity_id,
            serde_json::Value::Null,
        )
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// One queued change to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Unique, immutable identifier
    pub id: OperationId,
    /// What the change does
    pub change_kind: ChangeKind,
    /// Target record type
    pub entity_type: EntityType,
    /// Target record id
    pub entity_id: EntityId,
    /// Snapshot the caller wants to persist
    pub local_data: serde_json::Value,
    /// Remote value seen when a conflict was raised (audit only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_snapshot: Option<serde_json::Value>,
    /// Current lifecycle status
    pub status: SyncStatus,
    /// Dispatch priority
    pub priority: Priority,
    /// Failed attempts so far
    pub attempt_count: u32,
    /// Attempt budget fixed at enqueue time
    pub max_attempts: u32,
    /// When the operation was enqueued
    pub created_at: Timestamp,
    /// When the last attempt started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<Timestamp>,
    /// Backoff gate; the operation is not due before this time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<Timestamp>,
    /// Message from the most recent transient failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Insertion order, breaks ties between equal timestamps
    #[serde(default)]
    pub sequence: u64,
}

impl SyncOperation {
    /// Create a pending operation from an enqueue request.
    pub fn new(
        id: impl Into<OperationId>,
        request: NewOperation,
        created_at: Timestamp,
        sequence: u64,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: id.into(),
            change_kind: request.change_kind,
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            local_data: request.local_data,
            remote_snapshot: None,
            status: SyncStatus::Pending,
            priority: request.priority.unwrap_or_default(),
            attempt_count: 0,
            max_attempts,
            created_at,
            last_attempt_at: None,
            next_attempt_at: None,
            last_error: None,
            sequence,
        }
    }

    /// The entity this operation targets.
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.clone(), self.entity_id.clone())
    }

    /// Whether this operation targets the given entity.
    pub fn targets(&self, key: &EntityKey) -> bool {
        self.entity_type == key.entity_type && self.entity_id == key.entity_id
    }

    /// Pending and past its backoff gate.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == SyncStatus::Pending && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Sort key for dispatch: priority descending, then FIFO.
    pub fn dispatch_key(&self) -> (Reverse<Priority>, Timestamp, u64) {
        (Reverse(self.priority), self.created_at, self.sequence)
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: OperationPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(local_data) = patch.local_data {
            self.local_data = local_data;
        }
        if let Some(remote_snapshot) = patch.remote_snapshot {
            self.remote_snapshot = remote_snapshot;
        }
        if let Some(attempt_count) = patch.attempt_count {
            // The budget is a hard ceiling.
            self.attempt_count = attempt_count.min(self.max_attempts);
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            self.last_attempt_at = last_attempt_at;
        }
        if let Some(next_attempt_at) = patch.next_attempt_at {
            self.next_attempt_at = next_attempt_at;
        }
        if let Some(last_error) = patch.last_error {
            self.last_error = last_error;
        }
    }
}

/// A partial update to an operation.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPatch {
    pub status: Option<SyncStatus>,
    pub local_data: Option<serde_json::Value>,
    pub remote_snapshot: Option<Option<serde_json::Value>>,
    pub attempt_count: Option<u32>,
    pub last_attempt_at: Option<Option<Timestamp>>,
    pub next_attempt_at: Option<Option<Timestamp>>,
    pub last_error: Option<Option<String>>,
}

impl OperationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn local_data(mut self, data: serde_json::Value) -> Self {
        self.local_data = Some(data);
        self
    }

    pub fn remote_snapshot(mut self, snapshot: Option<serde_json::Value>) -> Self {
        self.remote_snapshot = Some(snapshot);
        self
    }

    pub fn attempt_count(mut self, count: u32) -> Self {
        self.attempt_count = Some(count);
        self
    }

    pub fn last_attempt_at(mut self, at: Timestamp) -> Self {
        self.last_attempt_at = Some(Some(at));
        self
    }

    pub fn next_attempt_at(mut self, at: Option<Timestamp>) -> Self {
        self.next_attempt_at = Some(at);
        self
    }

    pub fn last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(priority: Priority, created_at: Timestamp, sequence: u64) -> SyncOperation {
        SyncOperation::new(
            format!("op-{sequence}"),
            NewOperation::update("employee", "e1", json!({})).with_priority(priority),
            created_at,
            sequence,
            3,
        )
    }

    #[test]
    fn new_operation_is_pending() {
        let op = SyncOperation::new(
            "op-1",
            NewOperation::create("employee", "e1", json!({"name": "Jane"})),
            1000,
            0,
            3,
        );

        assert_eq!(op.status, SyncStatus::Pending);
        assert_eq!(op.priority, Priority::Medium);
        assert_eq!(op.attempt_count, 0);
        assert_eq!(op.max_attempts, 3);
        assert!(op.remote_snapshot.is_none());
        assert_eq!(op.entity_key(), EntityKey::new("employee", "e1"));
    }

    #[test]
    fn delete_request_has_null_payload() {
        let request = NewOperation::delete("asset", "a9");
        assert_eq!(request.change_kind, ChangeKind::Delete);
        assert!(request.local_data.is_null());
    }

    #[test]
    fn dispatch_order_priority_then_fifo() {
        let mut ops = vec![
            op(Priority::Low, 100, 0),
            op(Priority::High, 300, 1),
            op(Priority::Medium, 200, 2),
            op(Priority::High, 200, 3),
            op(Priority::High, 200, 4),
        ];
        ops.sort_by_key(SyncOperation::dispatch_key);

        let ids: Vec<_> = ops.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["op-3", "op-4", "op-1", "op-2", "op-0"]);
    }

    #[test]
    fn due_respects_backoff_gate() {
        let mut op = op(Priority::Medium, 100, 0);
        assert!(op.is_due(100));

        op.apply(OperationPatch::new().next_attempt_at(Some(500)));
        assert!(!op.is_due(499));
        assert!(op.is_due(500));

        op.apply(OperationPatch::new().status(SyncStatus::Syncing));
        assert!(!op.is_due(1_000));
    }

    #[test]
    fn patch_clears_optional_fields() {
        let mut op = op(Priority::Medium, 100, 0);
        op.apply(
            OperationPatch::new()
                .status(SyncStatus::Conflict)
                .remote_snapshot(Some(json!({"name": "Remote"}))),
        );
        assert_eq!(op.remote_snapshot, Some(json!({"name": "Remote"})));

        op.apply(
            OperationPatch::new()
                .status(SyncStatus::Completed)
                .remote_snapshot(None),
        );
        assert_eq!(op.status, SyncStatus::Completed);
        assert!(op.remote_snapshot.is_none());
    }

    #[test]
    fn patch_never_exceeds_attempt_budget() {
        let mut op = op(Priority::Medium, 100, 0);
        op.apply(OperationPatch::new().attempt_count(10));
        assert_eq!(op.attempt_count, 3);
    }

    #[test]
    fn status_parsing() {
        assert_eq!("conflict".parse::<SyncStatus>(), Ok(SyncStatus::Conflict));
        assert!("done".parse::<SyncStatus>().is_err());
        assert_eq!("high".parse::<Priority>(), Ok(Priority::High));
        assert!(SyncStatus::Completed.is_terminal());
        assert!(!SyncStatus::Conflict.is_terminal());
    }

    #[test]
    fn serialization_format() {
        let op = op(Priority::High, 100, 0);
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"changeKind\":\"update\""));
        assert!(json.contains("\"entityType\":\"employee\""));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"priority\":\"high\""));
        assert!(!json.contains("remoteSnapshot"));

        let parsed: SyncOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }
}
