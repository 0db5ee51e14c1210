//! The remote of record.
//!
//! The engine never talks to a network itself. It asks a
//! [`RemoteStateProvider`] for the authoritative snapshot of an entity and
//! treats any error as a transient failure of that attempt.
//! [`MemoryRemote`] is the in-process provider used by the mock API server
//! and by tests.

use crate::{clock::Clock, EntityKey, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The authoritative state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    /// Current value; `None` is a tombstone left by a remote deletion
    pub data: Option<serde_json::Value>,
    /// When the remote last changed this entity
    pub last_modified: Timestamp,
}

impl RemoteSnapshot {
    pub fn present(data: serde_json::Value, last_modified: Timestamp) -> Self {
        Self {
            data: Some(data),
            last_modified,
        }
    }

    pub fn tombstone(last_modified: Timestamp) -> Self {
        Self {
            data: None,
            last_modified,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.data.is_none()
    }
}

/// Why the remote could not answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("remote lookup timed out after {0}ms")]
    Timeout(u64),
}

/// Source of authoritative remote state.
pub trait RemoteStateProvider: Send + Sync + 'static {
    /// Fetch the current snapshot for an entity.
    ///
    /// `Ok(None)` means the remote has never heard of the entity.
    fn fetch(
        &self,
        key: &EntityKey,
    ) -> impl Future<Output = Result<Option<RemoteSnapshot>, ProviderError>> + Send;
}

impl<P: RemoteStateProvider> RemoteStateProvider for Arc<P> {
    fn fetch(
        &self,
        key: &EntityKey,
    ) -> impl Future<Output = Result<Option<RemoteSnapshot>, ProviderError>> + Send {
        (**self).fetch(key)
    }
}

/// In-memory remote keyed by entity.
#[derive(Debug)]
pub struct MemoryRemote {
    records: DashMap<EntityKey, RemoteSnapshot>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
}

impl MemoryRemote {
    /// Create an empty remote stamping writes with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            offline: AtomicBool::new(false),
        }
    }

    /// Create an empty remote wrapped in Arc for sharing.
    pub fn new_shared(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::new(clock))
    }

    /// Write a value, stamped with the current time.
    pub fn put(&self, key: EntityKey, data: serde_json::Value) -> RemoteSnapshot {
        let now = self.clock.now();
        self.put_at(key, data, now)
    }

    /// Write a value with an explicit last-modified time.
    pub fn put_at(
        &self,
        key: EntityKey,
        data: serde_json::Value,
        last_modified: Timestamp,
    ) -> RemoteSnapshot {
        let snapshot = RemoteSnapshot::present(data, last_modified);
        tracing::debug!(entity = %key, last_modified, "Remote record written");
        self.records.insert(key, snapshot.clone());
        snapshot
    }

    /// Delete a record, leaving a tombstone.
    pub fn delete(&self, key: EntityKey) -> RemoteSnapshot {
        let snapshot = RemoteSnapshot::tombstone(self.clock.now());
        tracing::debug!(entity = %key, "Remote record tombstoned");
        self.records.insert(key, snapshot.clone());
        snapshot
    }

    /// Forget a record entirely, tombstone included.
    pub fn remove(&self, key: &EntityKey) -> Option<RemoteSnapshot> {
        self.records.remove(key).map(|(_, snapshot)| snapshot)
    }

    /// Read the current snapshot without going through the provider path.
    pub fn get(&self, key: &EntityKey) -> Option<RemoteSnapshot> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    /// Simulate an outage; every fetch fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RemoteStateProvider for MemoryRemote {
    async fn fetch(&self, key: &EntityKey) -> Result<Option<RemoteSnapshot>, ProviderError> {
        if self.is_offline() {
            return Err(ProviderError::Unavailable("remote is offline".to_string()));
        }
        Ok(self.get(key))
    }
}
