//! The sync engine instance.
//!
//! [`SyncEngine`] owns the queue state, the configuration and the remote
//! provider. Every public operation takes the state lock for a short,
//! synchronous critical section; the only await points live in the pass
//! (see the scheduler module).

use crate::{
    clock::{Clock, SystemClock},
    config::{ConfigUpdate, EngineConfig},
    error::Result,
    remote::RemoteStateProvider,
    resolution::{self, ResolutionStrategy},
    scheduler::Ticker,
    snapshot::EngineSnapshot,
    stats::SyncStats,
    store::{OperationFilter, SyncState},
    EntityKey, Error, NewOperation, SyncConflict, SyncOperation, Timestamp,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

/// Offline-first sync engine over a remote of record.
///
/// Shared as `Arc<SyncEngine<P>>`; the scheduling loop holds its own clone.
#[derive(Debug)]
pub struct SyncEngine<P: RemoteStateProvider> {
    pub(crate) provider: P,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: Mutex<SyncState>,
    pub(crate) config: RwLock<EngineConfig>,
    /// Held for the whole of a pass so passes never overlap
    pub(crate) pass_lock: tokio::sync::Mutex<()>,
    pub(crate) ticker: Ticker,
}

impl<P: RemoteStateProvider> SyncEngine<P> {
    /// Create an engine on the system clock.
    pub fn new(provider: P, config: EngineConfig) -> Result<Self> {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    /// Create an engine on the given clock.
    pub fn with_clock(provider: P, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            clock,
            state: Mutex::new(SyncState::new()),
            config: RwLock::new(config),
            pass_lock: tokio::sync::Mutex::new(()),
            ticker: Ticker::new(),
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Queue a change. The returned operation is `pending`.
    pub fn enqueue(&self, request: NewOperation) -> SyncOperation {
        let max_attempts = self.config.read().max_attempts;
        let now = self.clock.now();
        let op = self.state.lock().operations.enqueue(request, now, max_attempts);

        debug!(
            operation_id = %op.id,
            entity = %op.entity_key(),
            change_kind = ?op.change_kind,
            priority = ?op.priority,
            "Operation enqueued"
        );
        op
    }

    pub fn get_operation(&self, id: &str) -> Result<SyncOperation> {
        self.state
            .lock()
            .operations()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))
    }

    /// Operations matching the filter, oldest first.
    pub fn list_operations(&self, filter: &OperationFilter) -> Vec<SyncOperation> {
        self.state.lock().operations().list(filter)
    }

    /// Open conflicts, oldest first.
    pub fn list_conflicts(&self) -> Vec<SyncConflict> {
        self.state.lock().conflicts().list()
    }

    pub fn get_conflict(&self, id: &str) -> Result<SyncConflict> {
        self.state
            .lock()
            .conflicts()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ConflictNotFound(id.to_string()))
    }

    /// Settle a conflict with the given strategy.
    ///
    /// The final value, the operation's completion and the conflict's removal
    /// happen under one lock. A second call for the same conflict fails with
    /// [`Error::ConflictNotFound`].
    pub fn resolve(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        resolved_data: Option<serde_json::Value>,
    ) -> Result<SyncOperation> {
        let policy = self.config.read().merge_policy;

        let mut state = self.state.lock();
        let final_value = {
            let conflict = state
                .conflicts()
                .get(conflict_id)
                .ok_or_else(|| Error::ConflictNotFound(conflict_id.to_string()))?;
            resolution::final_value(conflict, strategy, resolved_data, policy)?
        };
        let op = state.resolve(conflict_id, final_value)?;
        drop(state);

        info!(
            conflict_id,
            operation_id = %op.id,
            entity = %op.entity_key(),
            %strategy,
            "Conflict resolved"
        );
        Ok(op)
    }

    /// Current stats, computed fresh.
    pub fn stats(&self) -> SyncStats {
        let window = self.config.read().stats_window_seconds;
        let now = self.clock.now();
        SyncStats::compute(&self.state.lock(), now, window)
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Apply a partial config change. Invalid changes leave the config as it was.
    ///
    /// A new `maxAttempts` applies to operations enqueued afterwards; a new
    /// interval applies from the loop's next tick.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<EngineConfig> {
        let mut config = self.config.write();
        let next = config.apply(update)?;
        *config = next.clone();
        drop(config);

        info!(
            auto_sync_enabled = next.auto_sync_enabled,
            pass_interval_seconds = next.pass_interval_seconds,
            max_attempts = next.max_attempts,
            default_strategy = %next.default_conflict_strategy,
            "Sync config updated"
        );
        Ok(next)
    }

    /// Drop every completed operation.
    pub fn purge_completed(&self) -> usize {
        let removed = self.state.lock().operations.remove_completed();
        info!(removed, "Completed operations purged");
        removed
    }

    /// Seed the last agreed sync point for an entity.
    pub fn record_sync_point(&self, key: EntityKey, at: Timestamp) {
        debug!(entity = %key, at, "Sync point recorded");
        self.state.lock().sync_points.set(key, at);
    }

    pub fn sync_point(&self, key: &EntityKey) -> Timestamp {
        self.state.lock().sync_points().get(key)
    }

    /// Copy the whole state out.
    pub fn export_snapshot(&self) -> EngineSnapshot {
        let now = self.clock.now();
        EngineSnapshot::capture(&self.state.lock(), now)
    }

    /// Replace the whole state with a snapshot. Invalid snapshots change nothing.
    ///
    /// Waits for an in-flight pass to finish, so no attempt claimed against
    /// the old state can land its verdict on the new one.
    pub async fn import_snapshot(&self, snapshot: EngineSnapshot) -> Result<()> {
        let restored = snapshot.into_state()?;
        let _pass = self.pass_lock.lock().await;
        let operations = restored.operations().len();
        let conflicts = restored.conflicts().len();
        *self.state.lock() = restored;

        info!(operations, conflicts, "Snapshot imported");
        Ok(())
    }

    /// Check the cross-store invariants, returning the first violation.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.state.lock().check_invariants()
    }
}
