//! Environment configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::{StorageError, StorageResult};

/// Name of the data file created inside the configured directory.
pub const DATA_FILE_NAME: &str = "data.redb";

/// Default maximum number of namespaces per environment.
pub const DEFAULT_MAX_DB: u32 = 4096;

/// Default ceiling on the data file size, in bytes.
pub const DEFAULT_MAP_SIZE: u64 = 32_000_000_000;

/// Default number of writes after which an open batch is flushed.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

/// Default number of unsynced commits between durable checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 1000;

/// Configuration for a redb-backed environment.
///
/// Parsed once when the factory is constructed and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Directory holding the environment; created if absent.
    #[serde(rename = "dir")]
    pub path: PathBuf,

    /// Maximum number of namespaces the environment may hold.
    pub max_db: u32,

    /// Maximum size of the data file in bytes. Writes that would grow the
    /// file past it fail with a capacity error.
    pub map_size: u64,

    /// Force a sync on every commit. Off by default: commits may be lost on
    /// a crash, but not on a clean process exit.
    pub sync_on_commit: bool,

    /// Writes accumulated in an open batch before it is flushed.
    pub flush_threshold: usize,

    /// Unsynced commits after which one commit is made durable. Durable
    /// commits also release the pages freed by earlier unsynced ones.
    pub checkpoint_interval: u64,

    /// Keep the environment in memory. Nothing is written to `path`.
    pub in_memory: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            max_db: DEFAULT_MAX_DB,
            map_size: DEFAULT_MAP_SIZE,
            sync_on_commit: false,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            in_memory: false,
        }
    }
}

impl EnvConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for an in-memory environment.
    #[must_use]
    pub fn in_memory() -> Self {
        Self { in_memory: true, ..Self::default() }
    }

    /// Set the environment directory.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the maximum number of namespaces.
    #[must_use]
    pub const fn max_db(mut self, max_db: u32) -> Self {
        self.max_db = max_db;
        self
    }

    /// Set the data file size ceiling.
    #[must_use]
    pub const fn map_size(mut self, bytes: u64) -> Self {
        self.map_size = bytes;
        self
    }

    /// Enable or disable syncing on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Set the batch flush threshold.
    #[must_use]
    pub const fn flush_threshold(mut self, writes: usize) -> Self {
        self.flush_threshold = writes;
        self
    }

    /// Set the number of unsynced commits between durable checkpoints.
    #[must_use]
    pub const fn checkpoint_interval(mut self, commits: u64) -> Self {
        self.checkpoint_interval = commits;
        self
    }

    /// Parse a flat property map.
    ///
    /// Recognized keys are `dir`, `max_db`, `map_size`, `sync_on_commit`,
    /// `flush_threshold` and `checkpoint_interval`; anything else is ignored so the map can be shared
    /// with other components.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if a recognized value does not parse
    /// or the result fails [`validate`](Self::validate).
    pub fn from_properties(props: &HashMap<String, String>) -> StorageResult<Self> {
        let mut config = Self::default();
        if let Some(dir) = props.get("dir") {
            config.path = PathBuf::from(dir);
        }
        if let Some(value) = parse_property(props, "max_db")? {
            config.max_db = value;
        }
        if let Some(value) = parse_property(props, "map_size")? {
            config.map_size = value;
        }
        if let Some(value) = parse_property(props, "sync_on_commit")? {
            config.sync_on_commit = value;
        }
        if let Some(value) = parse_property(props, "flush_threshold")? {
            config.flush_threshold = value;
        }
        if let Some(value) = parse_property(props, "checkpoint_interval")? {
            config.checkpoint_interval = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] naming the first offending field.
    pub fn validate(&self) -> StorageResult<()> {
        if self.max_db == 0 {
            return Err(StorageError::config("max_db must be greater than zero"));
        }
        if self.map_size == 0 {
            return Err(StorageError::config("map_size must be greater than zero"));
        }
        if self.flush_threshold == 0 {
            return Err(StorageError::config("flush_threshold must be greater than zero"));
        }
        if self.checkpoint_interval == 0 {
            return Err(StorageError::config("checkpoint_interval must be greater than zero"));
        }
        Ok(())
    }

    /// Path of the data file inside the environment directory.
    #[must_use]
    pub fn data_file(&self) -> PathBuf {
        self.dir().join(DATA_FILE_NAME)
    }

    /// The environment directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.path
    }
}

fn parse_property<T>(props: &HashMap<String, String>, key: &str) -> StorageResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    props
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| StorageError::config(format!("invalid value for '{key}': {raw} ({e})")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = EnvConfig::default();
        assert_eq!(config.path, PathBuf::from("."));
        assert_eq!(config.max_db, DEFAULT_MAX_DB);
        assert_eq!(config.map_size, DEFAULT_MAP_SIZE);
        assert_eq!(config.flush_threshold, 50);
        assert_eq!(config.checkpoint_interval, DEFAULT_CHECKPOINT_INTERVAL);
        assert!(!config.sync_on_commit);
        assert!(!config.in_memory);
    }

    #[test]
    fn test_config_builder() {
        let config = EnvConfig::new().path("/tmp/kv").max_db(8).map_size(1 << 20).flush_threshold(10);

        assert_eq!(config.path, PathBuf::from("/tmp/kv"));
        assert_eq!(config.max_db, 8);
        assert_eq!(config.map_size, 1 << 20);
        assert_eq!(config.flush_threshold, 10);
        assert_eq!(config.data_file(), PathBuf::from("/tmp/kv").join(DATA_FILE_NAME));
    }

    #[test]
    fn test_from_properties() {
        let config = EnvConfig::from_properties(&props(&[
            ("dir", "/var/lib/kv"),
            ("max_db", "16"),
            ("sync_on_commit", "true"),
            ("checkpoint_interval", "25"),
            ("unrelated", "ignored"),
        ]))
        .expect("valid properties");

        assert_eq!(config.path, PathBuf::from("/var/lib/kv"));
        assert_eq!(config.max_db, 16);
        assert!(config.sync_on_commit);
        assert_eq!(config.checkpoint_interval, 25);
        assert_eq!(config.map_size, DEFAULT_MAP_SIZE);
    }

    #[test]
    fn test_from_properties_empty_uses_defaults() {
        let config = EnvConfig::from_properties(&HashMap::new()).expect("defaults are valid");
        assert_eq!(config, EnvConfig::default());
    }

    #[test]
    fn test_from_properties_rejects_garbage() {
        let err = EnvConfig::from_properties(&props(&[("max_db", "lots")])).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));

        let err = EnvConfig::from_properties(&props(&[("max_db", "0")])).unwrap_err();
        assert!(err.to_string().contains("max_db"));

        let err = EnvConfig::from_properties(&props(&[("checkpoint_interval", "0")])).unwrap_err();
        assert!(err.to_string().contains("checkpoint_interval"));
    }

    #[test]
    fn test_serde_roundtrip_uses_dir_key() {
        let json = serde_json::json!({ "dir": "/data", "max_db": 3 });
        let config: EnvConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(config.path, PathBuf::from("/data"));
        assert_eq!(config.max_db, 3);
        assert_eq!(config.flush_threshold, DEFAULT_FLUSH_THRESHOLD);

        let value = serde_json::to_value(&config).expect("serialize");
        assert_eq!(value["dir"], "/data");
    }
}
