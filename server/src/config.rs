//! Configuration management for the server.

use roster_sync_engine::EngineConfig;
use std::env;
use std::str::FromStr;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Initial configuration of the hosted engine
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            auto_sync_enabled: parse(&var, "SYNC_AUTO_ENABLED")?
                .unwrap_or(defaults.auto_sync_enabled),
            pass_interval_seconds: parse(&var, "SYNC_PASS_INTERVAL_SECS")?
                .unwrap_or(defaults.pass_interval_seconds),
            max_attempts: parse(&var, "SYNC_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            default_conflict_strategy: parse(&var, "SYNC_DEFAULT_STRATEGY")?
                .unwrap_or(defaults.default_conflict_strategy),
            auto_resolve: parse(&var, "SYNC_AUTO_RESOLVE")?.unwrap_or(defaults.auto_resolve),
            merge_policy: parse(&var, "SYNC_MERGE_POLICY")?.unwrap_or(defaults.merge_policy),
            max_concurrency: parse(&var, "SYNC_MAX_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
            operation_timeout_ms: parse(&var, "SYNC_OPERATION_TIMEOUT_MS")?
                .unwrap_or(defaults.operation_timeout_ms),
            ..defaults
        };
        engine.validate().map_err(ConfigError::Engine)?;

        Ok(Self { host, port, engine })
    }
}

fn parse<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    var(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value })
        })
        .transpose()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid engine configuration: {0}")]
    Engine(roster_sync_engine::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_sync_engine::{MergePolicy, ResolutionStrategy};
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn engine_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("SYNC_AUTO_ENABLED", "false"),
            ("SYNC_MAX_ATTEMPTS", "5"),
            ("SYNC_DEFAULT_STRATEGY", "merge"),
            ("SYNC_MERGE_POLICY", "deep"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert!(!config.engine.auto_sync_enabled);
        assert_eq!(config.engine.max_attempts, 5);
        assert_eq!(
            config.engine.default_conflict_strategy,
            ResolutionStrategy::Merge
        );
        assert_eq!(config.engine.merge_policy, MergePolicy::Deep);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(load(&[("PORT", "eighty")]), Err(ConfigError::InvalidPort)));
        assert!(matches!(
            load(&[("SYNC_MAX_ATTEMPTS", "many")]),
            Err(ConfigError::InvalidValue { name: "SYNC_MAX_ATTEMPTS", .. })
        ));
        assert!(matches!(
            load(&[("SYNC_DEFAULT_STRATEGY", "coin_flip")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            load(&[("SYNC_DEFAULT_STRATEGY", "manual")]),
            Err(ConfigError::Engine(_))
        ));
    }
}
