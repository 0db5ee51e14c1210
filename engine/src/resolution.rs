//! Conflict resolution strategies.
//!
//! Strategies form a closed set. Adding one means extending
//! [`ResolutionStrategy`] and the single match in [`final_value`].

use crate::{error::Result, Error, SyncConflict};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// How to pick the final value for a conflicted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep what the local caller wrote
    LocalWins,
    /// Take what the remote holds
    RemoteWins,
    /// Overlay local onto remote per the configured [`MergePolicy`]
    Merge,
    /// Use a value supplied by the caller
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::LocalWins => "local_wins",
            ResolutionStrategy::RemoteWins => "remote_wins",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        }
    }

    /// Strategies that can run without caller input.
    pub fn is_deterministic(self) -> bool {
        !matches!(self, ResolutionStrategy::Manual)
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local_wins" => Ok(ResolutionStrategy::LocalWins),
            "remote_wins" => Ok(ResolutionStrategy::RemoteWins),
            "merge" => Ok(ResolutionStrategy::Merge),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(Error::InvalidStrategy(format!(
                "unrecognized strategy '{other}'"
            ))),
        }
    }
}

/// How the `merge` strategy combines the two sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Top-level key overlay: local value wins per key, nested objects are
    /// replaced wholesale.
    #[default]
    Shallow,
    /// Recursive overlay of nested objects, local wins at the leaves.
    Deep,
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "shallow" => Ok(MergePolicy::Shallow),
            "deep" => Ok(MergePolicy::Deep),
            other => Err(format!("unknown merge policy '{other}'")),
        }
    }
}

/// Compute the final value for a conflict.
///
/// `resolved_data` is required for [`ResolutionStrategy::Manual`] and
/// ignored otherwise.
pub fn final_value(
    conflict: &SyncConflict,
    strategy: ResolutionStrategy,
    resolved_data: Option<Value>,
    policy: MergePolicy,
) -> Result<Value> {
    match strategy {
        ResolutionStrategy::LocalWins => Ok(conflict.local_data.clone()),
        ResolutionStrategy::RemoteWins => Ok(conflict.remote_data.clone()),
        ResolutionStrategy::Merge => Ok(merge(&conflict.remote_data, &conflict.local_data, policy)),
        ResolutionStrategy::Manual => resolved_data.ok_or_else(|| {
            Error::InvalidStrategy("manual resolution requires resolvedData".to_string())
        }),
    }
}

/// Overlay `local` onto `remote`.
///
/// When either side is not an object there is nothing to overlay and the
/// local value is kept.
pub fn merge(remote: &Value, local: &Value, policy: MergePolicy) -> Value {
    match (remote, local) {
        (Value::Object(r), Value::Object(l)) => Value::Object(overlay(r, l, policy)),
        _ => local.clone(),
    }
}

fn overlay(remote: &Map<String, Value>, local: &Map<String, Value>, policy: MergePolicy) -> Map<String, Value> {
    let mut merged = remote.clone();
    for (key, local_value) in local {
        let value = match (policy, merged.get(key), local_value) {
            (MergePolicy::Deep, Some(Value::Object(r)), Value::Object(l)) => {
                Value::Object(overlay(r, l, policy))
            }
            _ => local_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}
