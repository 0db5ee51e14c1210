//! Sync passes and the background loop that drives them.
//!
//! A pass snapshots the due operations, groups them by entity and works the
//! groups concurrently (bounded by `maxConcurrency`). Operations on the same
//! entity run one after another, so at most one of them is ever `syncing`.
//!
//! The state lock is never held across an await: each attempt claims its
//! operation, releases the lock, asks the remote, then takes the lock again
//! to route the verdict.

use crate::{
    config::EngineConfig,
    detector::{Divergence, Verdict},
    remote::{ProviderError, RemoteStateProvider},
    resolution,
    stats::SyncStats,
    EntityKey, Error, SyncConflict, SyncEngine, SyncOperation, Timestamp,
};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handles for the background loop.
#[derive(Debug)]
pub(crate) struct Ticker {
    notify: Notify,
    shutdown: watch::Sender<bool>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    pub(crate) fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            notify: Notify::new(),
            shutdown,
            task: parking_lot::Mutex::new(None),
        }
    }
}

/// What happened to one due operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Conflict,
    AutoResolved,
    Retried,
    Failed,
    /// No longer claimable, or vanished mid-attempt
    Skipped,
}

/// Per-pass counters, for the summary log line.
#[derive(Debug, Default, Clone, Copy)]
struct PassTally {
    processed: usize,
    completed: usize,
    conflicts: usize,
    auto_resolved: usize,
    retried: usize,
    failed: usize,
}

impl PassTally {
    fn record(&mut self, outcome: Outcome) {
        if outcome != Outcome::Skipped {
            self.processed += 1;
        }
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Conflict => self.conflicts += 1,
            Outcome::AutoResolved => {
                self.conflicts += 1;
                self.auto_resolved += 1;
            }
            Outcome::Retried => self.retried += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => {}
        }
    }

    fn merge(mut self, other: PassTally) -> Self {
        self.processed += other.processed;
        self.completed += other.completed;
        self.conflicts += other.conflicts;
        self.auto_resolved += other.auto_resolved;
        self.retried += other.retried;
        self.failed += other.failed;
        self
    }
}

/// Split due operations into per-entity groups, keeping dispatch order both
/// across groups (by each group's most urgent operation) and within them.
fn group_by_entity(due: Vec<SyncOperation>) -> Vec<Vec<SyncOperation>> {
    let mut index: HashMap<EntityKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<SyncOperation>> = Vec::new();
    for op in due {
        let slot = *index.entry(op.entity_key()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(op);
    }
    groups
}

impl<P: RemoteStateProvider> SyncEngine<P> {
    /// Run one pass over every operation that is due now.
    ///
    /// Passes never overlap; a second caller waits for the first to finish.
    /// Individual failures are recorded on their operations and never abort
    /// the pass. Returns the stats after the pass.
    pub async fn run_pass(&self) -> SyncStats {
        let _pass = self.pass_lock.lock().await;
        let config = self.config();
        let due = self.state.lock().operations().due(self.clock.now());
        if due.is_empty() {
            return self.stats();
        }

        debug!(due = due.len(), "Sync pass started");
        let tallies: Vec<PassTally> = stream::iter(group_by_entity(due))
            .map(|group| self.process_group(group, &config))
            .buffer_unordered(config.max_concurrency)
            .collect()
            .await;
        let tally = tallies
            .into_iter()
            .fold(PassTally::default(), PassTally::merge);

        info!(
            processed = tally.processed,
            completed = tally.completed,
            conflicts = tally.conflicts,
            auto_resolved = tally.auto_resolved,
            retried = tally.retried,
            failed = tally.failed,
            "Sync pass finished"
        );
        self.stats()
    }

    async fn process_group(&self, group: Vec<SyncOperation>, config: &EngineConfig) -> PassTally {
        let mut tally = PassTally::default();
        for op in group {
            tally.record(self.attempt(&op.id, config).await);
        }
        tally
    }

    async fn attempt(&self, op_id: &str, config: &EngineConfig) -> Outcome {
        let claimed = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            state.claim(op_id, now).map(|op| {
                let last_sync = state.sync_points().get(&op.entity_key());
                (op, last_sync)
            })
        };
        let Some((op, last_sync)) = claimed else {
            return Outcome::Skipped;
        };

        let key = op.entity_key();
        let lookup = self.provider.fetch(&key);
        let fetched = match tokio::time::timeout(config.operation_timeout(), lookup).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(config.operation_timeout_ms)),
        };

        let verdict = Verdict::from_fetch(&op, fetched, last_sync);
        self.route(&op, verdict, last_sync, config)
    }

    fn route(
        &self,
        op: &SyncOperation,
        verdict: Verdict,
        last_sync: Timestamp,
        config: &EngineConfig,
    ) -> Outcome {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match verdict {
            Verdict::Clear { remote_modified } => match state.complete(&op.id, remote_modified) {
                Ok(_) => {
                    debug!(operation_id = %op.id, entity = %op.entity_key(), "Operation completed");
                    Outcome::Completed
                }
                Err(e) => {
                    warn!(operation_id = %op.id, error = %e, "Could not complete operation");
                    Outcome::Skipped
                }
            },

            Verdict::Conflict(divergence) => {
                let conflict = new_conflict(op, divergence, last_sync, now);
                let conflict_id = conflict.id.clone();
                let auto_resolvable = conflict.auto_resolvable;

                if let Err(e) = state.raise_conflict(conflict) {
                    warn!(operation_id = %op.id, error = %e, "Could not raise conflict");
                    return Outcome::Skipped;
                }
                info!(
                    conflict_id = %conflict_id,
                    operation_id = %op.id,
                    entity = %op.entity_key(),
                    auto_resolvable,
                    "Conflict detected"
                );

                if !(config.auto_resolve && auto_resolvable) {
                    return Outcome::Conflict;
                }

                let strategy = config.default_conflict_strategy;
                let value = match state.conflicts().get(&conflict_id) {
                    Some(conflict) => {
                        resolution::final_value(conflict, strategy, None, config.merge_policy)
                    }
                    None => Err(Error::ConflictNotFound(conflict_id.clone())),
                };
                let settled = value.and_then(|value| state.resolve(&conflict_id, value));
                match settled {
                    Ok(_) => {
                        info!(conflict_id = %conflict_id, %strategy, "Conflict auto-resolved");
                        Outcome::AutoResolved
                    }
                    Err(e) => {
                        warn!(conflict_id = %conflict_id, error = %e, "Auto-resolution failed");
                        Outcome::Conflict
                    }
                }
            }

            Verdict::Transient(error) => {
                let decision = config
                    .retry_policy()
                    .decide(op.attempt_count, op.max_attempts, now);
                if let Err(e) = state.record_failure(&op.id, decision, error.clone()) {
                    warn!(operation_id = %op.id, error = %e, "Could not record failure");
                    return Outcome::Skipped;
                }

                if decision.is_exhausted() {
                    warn!(
                        operation_id = %op.id,
                        attempts = decision.attempt(),
                        error = %error,
                        "Operation failed, attempts exhausted"
                    );
                    Outcome::Failed
                } else {
                    warn!(
                        operation_id = %op.id,
                        attempt = decision.attempt(),
                        max_attempts = op.max_attempts,
                        error = %error,
                        "Transient failure, will retry"
                    );
                    Outcome::Retried
                }
            }
        }
    }

    /// Spawn the background loop. Does nothing if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.ticker.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        self.ticker.shutdown.send_replace(false);
        let shutdown = self.ticker.shutdown.subscribe();
        let engine = Arc::clone(self);
        *task = Some(tokio::spawn(async move { engine.run_loop(shutdown).await }));

        info!("Sync loop started");
    }

    /// Signal the loop to stop and wait for it. An in-flight pass finishes first.
    pub async fn stop(&self) {
        self.ticker.shutdown.send_replace(true);
        let handle = self.ticker.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync loop ended abnormally");
            }
            info!("Sync loop stopped");
        }
    }

    /// Ask the loop for a pass now, regardless of `autoSyncEnabled`.
    pub fn trigger(&self) {
        self.ticker.notify.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let interval = self.config.read().pass_interval();
            let triggered = tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.ticker.notify.notified() => true,
                _ = tokio::time::sleep(interval) => false,
            };
            if *shutdown.borrow() {
                break;
            }

            if triggered || self.config.read().auto_sync_enabled {
                self.run_pass().await;
            }
        }
    }
}

fn new_conflict(
    op: &SyncOperation,
    divergence: Divergence,
    last_sync: Timestamp,
    now: Timestamp,
) -> SyncConflict {
    SyncConflict {
        id: uuid::Uuid::new_v4().to_string(),
        operation_id: op.id.clone(),
        entity_type: op.entity_type.clone(),
        entity_id: op.entity_id.clone(),
        local_data: op.local_data.clone(),
        remote_data: divergence.remote_data,
        last_sync_timestamp: last_sync,
        remote_modified: divergence.remote_modified,
        conflict_kind: divergence.kind,
        auto_resolvable: divergence.auto_resolvable,
        detected_at: now,
    }
}
