//! Snapshot types for exporting and restoring engine state.
//!
//! A snapshot is the whole queue at one point in time: operations, open
//! conflicts and sync points. Maps are `BTreeMap`s so the same state always
//! serializes to the same bytes.

use crate::{
    error::Result, store::SyncState, ConflictId, EntityId, EntityKey, EntityType, Error,
    OperationId, SyncConflict, SyncOperation, SyncStatus, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Version of the snapshot format.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of the engine's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// When the snapshot was taken
    pub exported_at: Timestamp,
    /// All operations by id
    pub operations: BTreeMap<OperationId, SyncOperation>,
    /// Open conflicts by id
    pub conflicts: BTreeMap<ConflictId, SyncConflict>,
    /// Sync points by entity type, then entity id
    pub sync_points: BTreeMap<EntityType, BTreeMap<EntityId, Timestamp>>,
}

impl EngineSnapshot {
    /// Create an empty snapshot.
    pub fn new(exported_at: Timestamp) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            exported_at,
            operations: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            sync_points: BTreeMap::new(),
        }
    }

    /// Capture the given state.
    ///
    /// Operations caught mid-attempt are exported as `pending`; the attempt
    /// never finished, so it is neither counted nor lost.
    pub fn capture(state: &SyncState, exported_at: Timestamp) -> Self {
        let mut snapshot = Self::new(exported_at);

        for op in state.operations().iter() {
            let mut op = op.clone();
            if op.status == SyncStatus::Syncing {
                op.status = SyncStatus::Pending;
            }
            snapshot.operations.insert(op.id.clone(), op);
        }
        for conflict in state.conflicts().iter() {
            snapshot
                .conflicts
                .insert(conflict.id.clone(), conflict.clone());
        }
        for (key, at) in state.sync_points().iter() {
            snapshot.set_sync_point(key.clone(), *at);
        }

        snapshot
    }

    /// Add an operation.
    pub fn add_operation(&mut self, op: SyncOperation) {
        self.operations.insert(op.id.clone(), op);
    }

    /// Add a conflict.
    pub fn add_conflict(&mut self, conflict: SyncConflict) {
        self.conflicts.insert(conflict.id.clone(), conflict);
    }

    pub fn set_sync_point(&mut self, key: EntityKey, at: Timestamp) {
        self.sync_points
            .entry(key.entity_type)
            .or_default()
            .insert(key.entity_id, at);
    }

    pub fn sync_point(&self, key: &EntityKey) -> Option<Timestamp> {
        self.sync_points
            .get(&key.entity_type)?
            .get(&key.entity_id)
            .copied()
    }

    /// Check the snapshot describes a state the engine could have been in.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (expected {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        for (id, op) in &self.operations {
            if id != &op.id {
                return Err(Error::InvalidSnapshot(format!(
                    "operation keyed as {id} has id {}",
                    op.id
                )));
            }
            if op.status == SyncStatus::Syncing {
                return Err(Error::InvalidSnapshot(format!(
                    "operation {id} is mid-attempt"
                )));
            }
        }

        let mut referenced = BTreeSet::new();
        for (id, conflict) in &self.conflicts {
            if id != &conflict.id {
                return Err(Error::InvalidSnapshot(format!(
                    "conflict keyed as {id} has id {}",
                    conflict.id
                )));
            }
            if !referenced.insert(conflict.operation_id.as_str()) {
                return Err(Error::InvalidSnapshot(format!(
                    "operation {} has more than one conflict",
                    conflict.operation_id
                )));
            }
        }

        self.build_state().check_invariants().map_err(Error::InvalidSnapshot)
    }

    /// Validate and turn the snapshot into live state.
    pub fn into_state(self) -> Result<SyncState> {
        self.validate()?;
        Ok(self.build_state())
    }

    fn build_state(&self) -> SyncState {
        let mut state = SyncState::new();
        for op in self.operations.values() {
            state.operations.insert(op.clone());
        }
        for conflict in self.conflicts.values() {
            state.conflicts.insert(conflict.clone());
        }
        for (entity_type, points) in &self.sync_points {
            for (entity_id, at) in points {
                state
                    .sync_points
                    .set(EntityKey::new(entity_type.clone(), entity_id.clone()), *at);
            }
        }
        state
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Summary of a snapshot without the payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub exported_at: Timestamp,
    pub operation_count: usize,
    pub conflict_count: usize,
    pub entity_count: usize,
}

impl From<&EngineSnapshot> for SnapshotMetadata {
    fn from(snapshot: &EngineSnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            exported_at: snapshot.exported_at,
            operation_count: snapshot.operations.len(),
            conflict_count: snapshot.conflicts.len(),
            entity_count: snapshot.sync_points.values().map(BTreeMap::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConflictKind, NewOperation, OperationPatch};
    use serde_json::json;

    fn conflicted_state() -> (SyncState, SyncOperation) {
        let mut state = SyncState::new();
        let op = state.operations.enqueue(
            NewOperation::update("employee", "e1", json!({"name": "Jane"})),
            1000,
            3,
        );
        state.claim(&op.id, 1500);
        state
            .raise_conflict(SyncConflict {
                id: "c-1".into(),
                operation_id: op.id.clone(),
                entity_type: "employee".into(),
                entity_id: "e1".into(),
                local_data: json!({"name": "Jane"}),
                remote_data: json!({"name": "Janet"}),
                last_sync_timestamp: 500,
                remote_modified: Some(1500),
                conflict_kind: ConflictKind::Data,
                auto_resolvable: false,
                detected_at: 2000,
            })
            .unwrap();
        state
            .sync_points
            .set(EntityKey::new("employee", "e1"), 500);
        (state, op)
    }

    #[test]
    fn capture_and_restore() {
        let (state, op) = conflicted_state();
        let snapshot = EngineSnapshot::capture(&state, 3000);

        assert_eq!(snapshot.operations.len(), 1);
        assert_eq!(snapshot.conflicts.len(), 1);
        assert_eq!(
            snapshot.sync_point(&EntityKey::new("employee", "e1")),
            Some(500)
        );

        let restored = snapshot.into_state().unwrap();
        assert_eq!(restored.operations().get(&op.id).unwrap().status, SyncStatus::Conflict);
        assert_eq!(restored.conflicts().for_operation(&op.id).unwrap().id, "c-1");
        assert_eq!(
            restored.sync_points().get(&EntityKey::new("employee", "e1")),
            500
        );
    }

    #[test]
    fn capture_turns_in_flight_into_pending() {
        let mut state = SyncState::new();
        let op = state
            .operations
            .enqueue(NewOperation::delete("asset", "a1"), 1000, 3);
        state.claim(&op.id, 1500).unwrap();

        let snapshot = EngineSnapshot::capture(&state, 2000);
        assert_eq!(snapshot.operations[&op.id].status, SyncStatus::Pending);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn json_roundtrip() {
        let (state, _) = conflicted_state();
        let snapshot = EngineSnapshot::capture(&state, 3000);

        let json = snapshot.to_json().unwrap();
        let restored = EngineSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn deterministic_serialization() {
        let mut a = EngineSnapshot::new(0);
        let mut b = EngineSnapshot::new(0);

        a.set_sync_point(EntityKey::new("employee", "e1"), 1);
        a.set_sync_point(EntityKey::new("asset", "a1"), 2);
        b.set_sync_point(EntityKey::new("asset", "a1"), 2);
        b.set_sync_point(EntityKey::new("employee", "e1"), 1);

        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn reject_orphan_conflict() {
        let (state, op) = conflicted_state();
        let mut snapshot = EngineSnapshot::capture(&state, 3000);
        snapshot.operations.remove(&op.id);

        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn reject_conflict_status_without_conflict() {
        let (state, _) = conflicted_state();
        let mut snapshot = EngineSnapshot::capture(&state, 3000);
        snapshot.conflicts.clear();

        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn reject_duplicate_conflicts_for_one_operation() {
        let (state, _) = conflicted_state();
        let mut snapshot = EngineSnapshot::capture(&state, 3000);
        let mut second = snapshot.conflicts["c-1"].clone();
        second.id = "c-2".into();
        snapshot.add_conflict(second);

        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn reject_attempts_over_budget() {
        let mut snapshot = EngineSnapshot::new(0);
        let mut op = SyncOperation::new("op-1", NewOperation::delete("asset", "a1"), 0, 0, 3);
        op.attempt_count = 4;
        snapshot.add_operation(op);

        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn reject_syncing_operation() {
        let mut snapshot = EngineSnapshot::new(0);
        let mut op = SyncOperation::new("op-1", NewOperation::delete("asset", "a1"), 0, 0, 3);
        op.apply(OperationPatch::new().status(SyncStatus::Syncing));
        snapshot.add_operation(op);

        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn reject_future_format_version() {
        let json = r#"{
            "formatVersion": 999,
            "exportedAt": 0,
            "operations": {},
            "conflicts": {},
            "syncPoints": {}
        }"#;

        let result = EngineSnapshot::from_json(json);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn snapshot_metadata() {
        let (state, _) = conflicted_state();
        let snapshot = EngineSnapshot::capture(&state, 3000);
        let metadata: SnapshotMetadata = (&snapshot).into();

        assert_eq!(metadata.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(metadata.exported_at, 3000);
        assert_eq!(metadata.operation_count, 1);
        assert_eq!(metadata.conflict_count, 1);
        assert_eq!(metadata.entity_count, 1);
    }
}
