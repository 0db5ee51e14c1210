//! # Roster Sync Engine
//!
//! Offline-first synchronization and conflict resolution for Roster's HR
//! records.
//!
//! Local changes are queued as operations and pushed through sync passes.
//! Each pass compares the change against the remote of record, completes it
//! when nothing diverged, parks it as a conflict when something did, and
//! retries with backoff when the remote could not answer.
//!
//! ## Design Principles
//!
//! - **No transport**: the remote is reached only through [`RemoteStateProvider`]
//! - **Explicit instance**: no globals; a [`SyncEngine`] owns its state and loop
//! - **Consistent reads**: stats are derived from the stores, never cached
//! - **Testable time**: every timestamp comes from an injected [`Clock`]
//!
//! ## Core Concepts
//!
//! ### Operations
//!
//! A [`SyncOperation`] is one create, update or delete of one entity. It moves
//! through `pending -> syncing -> completed | conflict | failed`, returning to
//! `pending` after a transient failure while attempts remain.
//!
//! ### Conflicts
//!
//! A [`SyncConflict`] is raised when the remote changed after the entity's
//! last sync point and the change disagrees with the local one. It holds its
//! operation in `conflict` status until [`SyncEngine::resolve`] settles it with
//! a [`ResolutionStrategy`]:
//! - [`ResolutionStrategy::LocalWins`] - keep the local value
//! - [`ResolutionStrategy::RemoteWins`] - take the remote value
//! - [`ResolutionStrategy::Merge`] - overlay local onto remote ([`MergePolicy`])
//! - [`ResolutionStrategy::Manual`] - use a caller-supplied value
//!
//! ### Retries
//!
//! Transient failures (provider errors and timeouts) count against the
//! operation's attempt budget. The [`RetryPolicy`] backs off exponentially
//! and moves the operation to `failed` once the budget is spent.
//!
//! ## Quick Start
//!
//! ```rust
//! use roster_sync_engine::{
//!     EngineConfig, EntityKey, ManualClock, MemoryRemote, NewOperation,
//!     ResolutionStrategy, SyncEngine, SyncStatus,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), roster_sync_engine::Error> {
//! let clock = Arc::new(ManualClock::new(10_000));
//! let remote = MemoryRemote::new_shared(clock.clone());
//! let engine = SyncEngine::with_clock(remote.clone(), EngineConfig::default(), clock)?;
//!
//! // The remote changed the record after we last synced it.
//! remote.put_at(EntityKey::new("employee", "e1"), json!({"name": "Janet"}), 5_000);
//!
//! let op = engine.enqueue(NewOperation::update("employee", "e1", json!({"name": "Jane"})));
//! let stats = engine.run_pass().await;
//! assert_eq!(stats.open_conflicts, 1);
//!
//! let conflict = engine.list_conflicts().remove(0);
//! let resolved = engine.resolve(&conflict.id, ResolutionStrategy::LocalWins, None)?;
//! assert_eq!(resolved.id, op.id);
//! assert_eq!(resolved.status, SyncStatus::Completed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! Use [`SyncEngine::export_snapshot`] and [`SyncEngine::import_snapshot`] with
//! [`EngineSnapshot`]. Snapshots serialize to JSON with deterministic ordering.

pub mod clock;
pub mod config;
pub mod conflict;
pub mod detector;
pub mod engine;
pub mod error;
pub mod operation;
pub mod remote;
pub mod resolution;
pub mod retry;
mod scheduler;
pub mod snapshot;
pub mod stats;
pub mod store;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigUpdate, EngineConfig};
pub use conflict::{ConflictKind, SyncConflict};
pub use detector::{Divergence, Verdict};
pub use engine::SyncEngine;
pub use error::Error;
pub use operation::{
    ChangeKind, EntityKey, NewOperation, OperationPatch, Priority, SyncOperation, SyncStatus,
};
pub use remote::{MemoryRemote, ProviderError, RemoteSnapshot, RemoteStateProvider};
pub use resolution::{MergePolicy, ResolutionStrategy};
pub use retry::{RetryDecision, RetryPolicy};
pub use snapshot::{EngineSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
pub use stats::SyncStats;
pub use store::{ConflictStore, OperationFilter, OperationStore, SyncPoints, SyncState};

/// Type aliases for clarity
pub type OperationId = String;
pub type ConflictId = String;
pub type EntityType = String;
pub type EntityId = String;
pub type Timestamp = u64;
