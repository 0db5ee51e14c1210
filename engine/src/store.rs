//! Stores - the in-memory state containers.
//!
//! [`OperationStore`] and [`ConflictStore`] are plain data with lookup. The
//! invariants that span both of them (a conflict exists iff its operation is
//! in `conflict` status, completion never coexists with an open conflict)
//! are enforced by [`SyncState`], which owns both and is the only thing the
//! engine mutates.

use crate::{
    error::Result, retry::RetryDecision, ConflictId, EntityKey, EntityType, Error, NewOperation,
    OperationId, OperationPatch, Priority, SyncConflict, SyncOperation, SyncStatus, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Filters for listing operations. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFilter {
    #[serde(default)]
    pub status: Vec<SyncStatus>,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub priority: Vec<Priority>,
}

impl OperationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.status.push(status);
        self
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<EntityType>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority.push(priority);
        self
    }

    /// Check whether an operation passes every filter.
    pub fn matches(&self, op: &SyncOperation) -> bool {
        (self.status.is_empty() || self.status.contains(&op.status))
            && self
                .entity_type
                .as_ref()
                .map_or(true, |t| &op.entity_type == t)
            && (self.priority.is_empty() || self.priority.contains(&op.priority))
    }
}

/// All known operations, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct OperationStore {
    operations: HashMap<OperationId, SyncOperation>,
    next_sequence: u64,
}

impl OperationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Create a pending operation from a request and return it.
    pub fn enqueue(
        &mut self,
        request: NewOperation,
        created_at: Timestamp,
        max_attempts: u32,
    ) -> SyncOperation {
        let id = uuid::Uuid::new_v4().to_string();
        let op = SyncOperation::new(id, request, created_at, self.next_sequence, max_attempts);
        self.next_sequence += 1;
        self.operations.insert(op.id.clone(), op.clone());
        op
    }

    /// Insert an existing operation as-is (used when restoring snapshots).
    pub fn insert(&mut self, op: SyncOperation) {
        self.next_sequence = self.next_sequence.max(op.sequence + 1);
        self.operations.insert(op.id.clone(), op);
    }

    /// Get an operation by id.
    pub fn get(&self, id: &str) -> Option<&SyncOperation> {
        self.operations.get(id)
    }

    /// Apply a patch and return the updated operation.
    pub fn update(&mut self, id: &str, patch: OperationPatch) -> Result<SyncOperation> {
        let op = self
            .operations
            .get_mut(id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;
        op.apply(patch);
        Ok(op.clone())
    }

    /// Operations whose status is any of `statuses`, oldest first.
    pub fn list_by_status(&self, statuses: &[SyncStatus]) -> Vec<SyncOperation> {
        self.list(&OperationFilter {
            status: statuses.to_vec(),
            ..OperationFilter::default()
        })
    }

    /// Operations matching a filter, oldest first.
    pub fn list(&self, filter: &OperationFilter) -> Vec<SyncOperation> {
        let mut ops: Vec<_> = self
            .operations
            .values()
            .filter(|op| filter.matches(op))
            .cloned()
            .collect();
        ops.sort_by_key(|op| (op.created_at, op.sequence));
        ops
    }

    /// Pending operations past their backoff gate, in dispatch order.
    pub fn due(&self, now: Timestamp) -> Vec<SyncOperation> {
        let mut ops: Vec<_> = self
            .operations
            .values()
            .filter(|op| op.is_due(now))
            .cloned()
            .collect();
        ops.sort_by_key(SyncOperation::dispatch_key);
        ops
    }

    /// Whether some operation on this entity is currently in flight.
    pub fn syncing_on(&self, key: &EntityKey) -> bool {
        self.operations
            .values()
            .any(|op| op.status == SyncStatus::Syncing && op.targets(key))
    }

    /// Drop every completed operation and return how many were removed.
    pub fn remove_completed(&mut self) -> usize {
        let before = self.operations.len();
        self.operations
            .retain(|_, op| op.status != SyncStatus::Completed);
        before - self.operations.len()
    }

    /// Iterate over all operations in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &SyncOperation> {
        self.operations.values()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Open conflicts, keyed by id with a reverse index by operation.
#[derive(Debug, Clone, Default)]
pub struct ConflictStore {
    conflicts: HashMap<ConflictId, SyncConflict>,
    by_operation: HashMap<OperationId, ConflictId>,
}

impl ConflictStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a conflict, replacing any previous one for the same operation.
    pub fn insert(&mut self, conflict: SyncConflict) {
        if let Some(previous) = self
            .by_operation
            .insert(conflict.operation_id.clone(), conflict.id.clone())
        {
            self.conflicts.remove(&previous);
        }
        self.conflicts.insert(conflict.id.clone(), conflict);
    }

    /// Get a conflict by id.
    pub fn get(&self, id: &str) -> Option<&SyncConflict> {
        self.conflicts.get(id)
    }

    /// The open conflict for an operation, if any.
    pub fn for_operation(&self, operation_id: &str) -> Option<&SyncConflict> {
        self.by_operation
            .get(operation_id)
            .and_then(|id| self.conflicts.get(id))
    }

    /// Remove a conflict and return it.
    pub fn remove(&mut self, id: &str) -> Option<SyncConflict> {
        let conflict = self.conflicts.remove(id)?;
        self.by_operation.remove(&conflict.operation_id);
        Some(conflict)
    }

    /// All open conflicts, oldest first.
    pub fn list(&self) -> Vec<SyncConflict> {
        let mut conflicts: Vec<_> = self.conflicts.values().cloned().collect();
        conflicts.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        conflicts
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncConflict> {
        self.conflicts.values()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// The last agreed sync point per entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPoints {
    points: HashMap<EntityKey, Timestamp>,
}

impl SyncPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync point for an entity; zero if it was never synced.
    pub fn get(&self, key: &EntityKey) -> Timestamp {
        self.points.get(key).copied().unwrap_or(0)
    }

    /// Overwrite the sync point for an entity.
    pub fn set(&mut self, key: EntityKey, at: Timestamp) {
        self.points.insert(key, at);
    }

    /// Move the sync point forward; never moves it back.
    pub fn advance(&mut self, key: EntityKey, at: Timestamp) {
        let point = self.points.entry(key).or_insert(0);
        *point = (*point).max(at);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &Timestamp)> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Both stores plus the sync points, mutated only through transitions that
/// keep them consistent with each other.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub(crate) operations: OperationStore,
    pub(crate) conflicts: ConflictStore,
    pub(crate) sync_points: SyncPoints,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &OperationStore {
        &self.operations
    }

    pub fn conflicts(&self) -> &ConflictStore {
        &self.conflicts
    }

    pub fn sync_points(&self) -> &SyncPoints {
        &self.sync_points
    }

    /// Mark a pending operation as `syncing`.
    ///
    /// Returns `None` if the operation is gone, no longer pending, or another
    /// operation on the same entity is already in flight.
    pub fn claim(&mut self, op_id: &str, now: Timestamp) -> Option<SyncOperation> {
        let op = self.operations.get(op_id)?;
        if op.status != SyncStatus::Pending || self.operations.syncing_on(&op.entity_key()) {
            return None;
        }

        self.operations
            .update(
                op_id,
                OperationPatch::new()
                    .status(SyncStatus::Syncing)
                    .last_attempt_at(now),
            )
            .ok()
    }

    /// Fail unless the operation exists and is `syncing`. Verdicts only land
    /// on the attempt that claimed the operation.
    fn ensure_in_flight(&self, op_id: &str) -> Result<()> {
        match self.operations.get(op_id) {
            None => Err(Error::OperationNotFound(op_id.to_string())),
            Some(op) if op.status != SyncStatus::Syncing => {
                Err(Error::NotInFlight(op_id.to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Mark an in-flight operation completed.
    ///
    /// The entity's sync point advances to `remote_modified`, the version the
    /// remote held when the change was checked. With no remote record it
    /// stays where it was. Fails with [`Error::ConflictStillOpen`] if a
    /// conflict still references the operation.
    pub fn complete(
        &mut self,
        op_id: &str,
        remote_modified: Option<Timestamp>,
    ) -> Result<SyncOperation> {
        if self.conflicts.for_operation(op_id).is_some() {
            return Err(Error::ConflictStillOpen(op_id.to_string()));
        }
        self.ensure_in_flight(op_id)?;
        self.finish(op_id, remote_modified)
    }

    fn finish(&mut self, op_id: &str, remote_modified: Option<Timestamp>) -> Result<SyncOperation> {
        let op = self.operations.update(
            op_id,
            OperationPatch::new()
                .status(SyncStatus::Completed)
                .remote_snapshot(None)
                .next_attempt_at(None)
                .last_error(None),
        )?;

        if let Some(at) = remote_modified {
            self.sync_points.advance(op.entity_key(), at);
        }
        Ok(op)
    }

    /// Record a conflict and move its in-flight operation into `conflict`
    /// status.
    pub fn raise_conflict(&mut self, conflict: SyncConflict) -> Result<SyncOperation> {
        self.ensure_in_flight(&conflict.operation_id)?;

        let remote = conflict.remote_data.clone();
        let op = self.operations.update(
            &conflict.operation_id,
            OperationPatch::new()
                .status(SyncStatus::Conflict)
                .remote_snapshot(Some(remote)),
        )?;
        self.conflicts.insert(conflict);
        Ok(op)
    }

    /// Settle a conflict: write the final value, complete the operation and
    /// drop the conflict, all in one step.
    ///
    /// The sync point advances to the remote version the conflict was raised
    /// against, so a remote edit made while the conflict was open still
    /// counts as newer on the next attempt.
    pub fn resolve(
        &mut self,
        conflict_id: &str,
        final_value: serde_json::Value,
    ) -> Result<SyncOperation> {
        let conflict = self
            .conflicts
            .get(conflict_id)
            .ok_or_else(|| Error::ConflictNotFound(conflict_id.to_string()))?;
        let operation_id = conflict.operation_id.clone();
        let remote_modified = conflict.remote_modified;

        if self.operations.get(&operation_id).is_none() {
            return Err(Error::OperationNotFound(operation_id));
        }

        self.conflicts.remove(conflict_id);
        self.operations
            .update(&operation_id, OperationPatch::new().local_data(final_value))?;
        self.finish(&operation_id, remote_modified)
    }

    /// Apply a retry decision after a transient failure of an in-flight
    /// operation.
    pub fn record_failure(
        &mut self,
        op_id: &str,
        decision: RetryDecision,
        error: impl Into<String>,
    ) -> Result<SyncOperation> {
        self.ensure_in_flight(op_id)?;

        let patch = match decision {
            RetryDecision::Retry {
                attempt,
                next_attempt_at,
            } => OperationPatch::new()
                .status(SyncStatus::Pending)
                .attempt_count(attempt)
                .next_attempt_at(Some(next_attempt_at)),
            RetryDecision::Exhausted { attempt } => OperationPatch::new()
                .status(SyncStatus::Failed)
                .attempt_count(attempt)
                .next_attempt_at(None),
        };
        self.operations
            .update(op_id, patch.last_error(Some(error.into())))
    }

    /// Check every cross-store invariant, returning the first violation.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for op in self.operations.iter() {
            if op.attempt_count > op.max_attempts {
                return Err(format!(
                    "operation {} has {} attempts of {}",
                    op.id, op.attempt_count, op.max_attempts
                ));
            }
            let has_conflict = self.conflicts.for_operation(&op.id).is_some();
            if (op.status == SyncStatus::Conflict) != has_conflict {
                return Err(format!(
                    "operation {} is {} but conflict record present = {}",
                    op.id, op.status, has_conflict
                ));
            }
            if op.status == SyncStatus::Completed && op.remote_snapshot.is_some() {
                return Err(format!(
                    "completed operation {} still carries a remote snapshot",
                    op.id
                ));
            }
        }

        for conflict in self.conflicts.iter() {
            match self.operations.get(&conflict.operation_id) {
                Some(op) if op.status == SyncStatus::Conflict => {}
                Some(op) => {
                    return Err(format!(
                        "conflict {} references operation {} in status {}",
                        conflict.id, op.id, op.status
                    ))
                }
                None => {
                    return Err(format!(
                        "conflict {} references missing operation {}",
                        conflict.id, conflict.operation_id
                    ))
                }
            }
        }

        Ok(())
    }
}
