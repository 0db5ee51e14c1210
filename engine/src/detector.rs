//! Conflict detection.
//!
//! Decides, for one in-flight operation, whether the remote changed since
//! the last agreed sync point in a way that disagrees with the local change.
//!
//! # Rules
//!
//! A remote change only counts if its `last_modified` is strictly newer than
//! the entity's sync point and its content differs from `local_data`.
//!
//! | local  | remote missing | remote tombstone | remote present, newer & different |
//! |--------|----------------|------------------|-----------------------------------|
//! | create | clear          | clear            | data / schema                     |
//! | update | delete-vs-update | delete-vs-update if newer | data / schema          |
//! | delete | clear          | clear            | delete-vs-update                  |
//!
//! Anything else clears.

use crate::{
    remote::{ProviderError, RemoteSnapshot},
    ChangeKind, ConflictKind, SyncOperation, Timestamp,
};
use serde_json::Value;

/// A detected divergence, before it is given an id and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub kind: ConflictKind,
    /// Remote value; null when the remote deleted the record
    pub remote_data: Value,
    pub auto_resolvable: bool,
    /// Remote modification time seen at detection; `None` when nothing was there
    pub remote_modified: Option<Timestamp>,
}

/// Outcome of one detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No divergence; the local change is accepted as-is.
    Clear {
        /// Remote modification time, used to advance the sync point
        remote_modified: Option<Timestamp>,
    },
    /// The two sides diverged.
    Conflict(Divergence),
    /// No verdict could be reached this time.
    Transient(String),
}

impl Verdict {
    /// Turn a provider answer into a verdict.
    pub fn from_fetch(
        op: &SyncOperation,
        fetched: Result<Option<RemoteSnapshot>, ProviderError>,
        last_sync: Timestamp,
    ) -> Self {
        match fetched {
            Ok(remote) => detect(op, remote.as_ref(), last_sync),
            Err(e) => Verdict::Transient(e.to_string()),
        }
    }
}

/// Compare a local change against the remote snapshot.
pub fn detect(op: &SyncOperation, remote: Option<&RemoteSnapshot>, last_sync: Timestamp) -> Verdict {
    let remote_modified = remote.map(|r| r.last_modified);
    let clear = Verdict::Clear { remote_modified };

    match (op.change_kind, remote) {
        // Nothing to collide with.
        (ChangeKind::Create, None) | (ChangeKind::Delete, None) => clear,
        (ChangeKind::Create | ChangeKind::Delete, Some(r)) if r.is_deleted() => clear,

        // Updating something that is not there any more. A tombstone already
        // known at the sync point is not news.
        (ChangeKind::Update, None) => delete_vs_update(Value::Null, None),
        (ChangeKind::Update, Some(r)) if r.is_deleted() && r.last_modified > last_sync => {
            delete_vs_update(Value::Null, remote_modified)
        }

        (kind, Some(r)) => {
            let Some(remote_data) = r.data.as_ref() else {
                return clear;
            };
            if r.last_modified <= last_sync {
                return clear;
            }
            match kind {
                ChangeKind::Delete => delete_vs_update(remote_data.clone(), remote_modified),
                ChangeKind::Create | ChangeKind::Update if remote_data == &op.local_data => clear,
                ChangeKind::Create | ChangeKind::Update => Verdict::Conflict(Divergence {
                    remote_modified,
                    ..classify(&op.local_data, remote_data)
                }),
            }
        }
    }
}

fn delete_vs_update(remote_data: Value, remote_modified: Option<Timestamp>) -> Verdict {
    Verdict::Conflict(Divergence {
        kind: ConflictKind::DeleteVsUpdate,
        remote_data,
        auto_resolvable: false,
        remote_modified,
    })
}

/// Classify a divergence between two present values. The result carries no
/// remote modification time.
pub fn classify(local: &Value, remote: &Value) -> Divergence {
    if shapes_disagree(local, remote) {
        return Divergence {
            kind: ConflictKind::Schema,
            remote_data: remote.clone(),
            auto_resolvable: false,
            remote_modified: None,
        };
    }

    Divergence {
        kind: ConflictKind::Data,
        remote_data: remote.clone(),
        auto_resolvable: !values_collide(local, remote),
        remote_modified: None,
    }
}

/// Exactly one side is an object, or a shared key changed JSON type.
/// Null is compatible with every type.
fn shapes_disagree(local: &Value, remote: &Value) -> bool {
    match (local, remote) {
        (Value::Object(l), Value::Object(r)) => l.iter().any(|(key, lv)| {
            r.get(key)
                .is_some_and(|rv| !lv.is_null() && !rv.is_null() && type_of(lv) != type_of(rv))
        }),
        (Value::Object(_), _) | (_, Value::Object(_)) => true,
        _ => false,
    }
}

/// Some key is present on both sides with different values, so an overlay
/// merge would silently drop one of them. Non-objects always collide.
fn values_collide(local: &Value, remote: &Value) -> bool {
    match (local, remote) {
        (Value::Object(l), Value::Object(r)) => l
            .iter()
            .any(|(key, lv)| r.get(key).is_some_and(|rv| rv != lv)),
        _ => true,
    }
}

fn type_of(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
