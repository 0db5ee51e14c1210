//! Engine configuration.

use crate::{
    error::Result, resolution::MergePolicy, retry::RetryPolicy, Error, ResolutionStrategy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration of a [`crate::SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Whether the scheduler loop runs passes on its own
    pub auto_sync_enabled: bool,
    /// Seconds between scheduled passes
    pub pass_interval_seconds: u64,
    /// Attempt budget given to newly enqueued operations
    pub max_attempts: u32,
    /// Strategy used for auto-resolution and when a caller names none
    pub default_conflict_strategy: ResolutionStrategy,
    /// Resolve auto-resolvable conflicts during the pass that finds them
    pub auto_resolve: bool,
    /// How `merge` combines nested objects
    pub merge_policy: MergePolicy,
    /// Entities processed in parallel during a pass
    pub max_concurrency: usize,
    /// Per-operation deadline for the remote lookup
    pub operation_timeout_ms: u64,
    /// Backoff after the first failed attempt
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling
    pub retry_max_delay_ms: u64,
    /// Window for the success rate; `None` counts every terminal operation
    pub stats_window_seconds: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_sync_enabled: true,
            pass_interval_seconds: 30,
            max_attempts: 3,
            default_conflict_strategy: ResolutionStrategy::RemoteWins,
            auto_resolve: false,
            merge_policy: MergePolicy::Shallow,
            max_concurrency: 4,
            operation_timeout_ms: 5_000,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
            stats_window_seconds: None,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("maxAttempts must be at least 1".into()));
        }
        if self.pass_interval_seconds == 0 {
            return Err(Error::InvalidConfig(
                "passIntervalSeconds must be at least 1".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "maxConcurrency must be at least 1".into(),
            ));
        }
        if self.operation_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "operationTimeoutMs must be at least 1".into(),
            ));
        }
        if !self.default_conflict_strategy.is_deterministic() {
            return Err(Error::InvalidConfig(
                "defaultConflictStrategy cannot be manual".into(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(Error::InvalidConfig(
                "retryBaseDelayMs must not exceed retryMaxDelayMs".into(),
            ));
        }
        Ok(())
    }

    /// Apply a partial update, validating the result.
    pub fn apply(&self, update: ConfigUpdate) -> Result<Self> {
        let mut next = self.clone();
        if let Some(v) = update.auto_sync_enabled {
            next.auto_sync_enabled = v;
        }
        if let Some(v) = update.pass_interval_seconds {
            next.pass_interval_seconds = v;
        }
        if let Some(v) = update.max_attempts {
            next.max_attempts = v;
        }
        if let Some(v) = update.default_conflict_strategy {
            next.default_conflict_strategy = v;
        }
        if let Some(v) = update.auto_resolve {
            next.auto_resolve = v;
        }
        if let Some(v) = update.merge_policy {
            next.merge_policy = v;
        }
        if let Some(v) = update.max_concurrency {
            next.max_concurrency = v;
        }
        if let Some(v) = update.operation_timeout_ms {
            next.operation_timeout_ms = v;
        }
        if let Some(v) = update.retry_base_delay_ms {
            next.retry_base_delay_ms = v;
        }
        if let Some(v) = update.retry_max_delay_ms {
            next.retry_max_delay_ms = v;
        }
        if let Some(v) = update.stats_window_seconds {
            next.stats_window_seconds = v;
        }
        next.validate()?;
        Ok(next)
    }

    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.pass_interval_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

/// A partial configuration change. Absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default)]
    pub auto_sync_enabled: Option<bool>,
    #[serde(default)]
    pub pass_interval_seconds: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub default_conflict_strategy: Option<ResolutionStrategy>,
    #[serde(default)]
    pub auto_resolve: Option<bool>,
    #[serde(default)]
    pub merge_policy: Option<MergePolicy>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_max_delay_ms: Option<u64>,
    /// `Some(None)` clears the window
    #[serde(default, with = "double_option")]
    pub stats_window_seconds: Option<Option<u64>>,
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<u64>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<u64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(Some)
    }
}
