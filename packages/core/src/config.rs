//! Engine configuration
//!
//! `EngineConfig` carries everything the category engine needs at startup.
//! Values come from `Default`, optionally overridden by `QBANK_*` environment
//! variables through `from_env()`.

use crate::models::MAX_CATEGORY_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding `database_path`
pub const ENV_DATABASE_PATH: &str = "QBANK_DATABASE_PATH";
/// Environment variable overriding `max_depth`
pub const ENV_MAX_DEPTH: &str = "QBANK_MAX_DEPTH";
/// Environment variable overriding `busy_timeout_ms`
pub const ENV_BUSY_TIMEOUT_MS: &str = "QBANK_BUSY_TIMEOUT_MS";
/// Environment variable overriding `event_channel_capacity`
pub const ENV_EVENT_CAPACITY: &str = "QBANK_EVENT_CAPACITY";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Configuration for the category hierarchy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the libsql database file
    pub database_path: PathBuf,

    /// Deepest allowed level (1..=6). Lower values narrow the tree further.
    pub max_depth: i64,

    /// SQLite busy timeout applied to every connection
    pub busy_timeout_ms: u64,

    /// Buffer size of the category event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_depth: MAX_CATEGORY_DEPTH,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Config for a specific database file, other values defaulted
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Build config from defaults plus `QBANK_*` environment overrides
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            config.max_depth = raw
                .trim()
                .parse()
                .map_err(|e| format!("{} must be an integer: {}", ENV_MAX_DEPTH, e))?;
        }

        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = raw
                .trim()
                .parse()
                .map_err(|e| format!("{} must be an integer: {}", ENV_BUSY_TIMEOUT_MS, e))?;
        }

        if let Some(raw) = lookup(ENV_EVENT_CAPACITY) {
            config.event_channel_capacity = raw
                .trim()
                .parse()
                .map_err(|e| format!("{} must be an integer: {}", ENV_EVENT_CAPACITY, e))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path cannot be empty".to_string());
        }

        if self.max_depth < 1 || self.max_depth > MAX_CATEGORY_DEPTH {
            return Err(format!(
                "max_depth must be between 1 and {}, got {}",
                MAX_CATEGORY_DEPTH, self.max_depth
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Default database location: `~/.qbank/database/categories.db`
///
/// Falls back to a relative path when the home directory cannot be resolved.
fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".qbank").join("database"))
        .unwrap_or_else(|| PathBuf::from(".qbank"))
        .join("categories.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_depth, 6);
        assert!(config.database_path.ends_with("categories.db"));
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            (ENV_DATABASE_PATH, "/tmp/qbank/test.db"),
            (ENV_MAX_DEPTH, "4"),
            (ENV_BUSY_TIMEOUT_MS, " 250 "),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/qbank/test.db"));
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_env_rejects_depth_above_ceiling() {
        let err = EngineConfig::from_lookup(lookup_from(&[(ENV_MAX_DEPTH, "7")])).unwrap_err();
        assert!(err.contains("max_depth must be between 1 and 6"));
    }

    #[test]
    fn test_env_rejects_non_numeric() {
        let err =
            EngineConfig::from_lookup(lookup_from(&[(ENV_BUSY_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(err.contains(ENV_BUSY_TIMEOUT_MS));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"database_path": "db/cat.db", "max_depth": 3}"#).unwrap();
        assert_eq!(config.database_path, PathBuf::from("db/cat.db"));
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = EngineConfig {
            event_channel_capacity: 0,
            ..EngineConfig::with_database_path("x.db")
        };
        assert!(config.validate().is_err());
    }
}
