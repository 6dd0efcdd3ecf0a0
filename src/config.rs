//! Store configuration, read from a JSON file.
//!
//! ```json
//! {
//!     "base_url": "https://example-db.test",
//!     "auth": "secret",
//!     "workers": 4,
//!     "request_timeout": "30s",
//!     "change_log_retention": "30days",
//!     "snapshot_dir": "/var/cache/fieldstore"
//! }
//! ```
//!
//! Only `base_url` is required. Durations use `humantime` syntax.

use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::SnapshotCache;
use crate::error::StoreError;
use crate::log::trace;

pub const DEFAULT_WORKERS: usize = 4;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_retention() -> Duration {
    DEFAULT_RETENTION
}

fn default_tracked_collections() -> Vec<String> {
    vec!["missions".to_string(), "tasks".to_string()]
}

fn humantime_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "humantime_duration"
    )]
    pub request_timeout: Duration,
    #[serde(default = "default_retention", deserialize_with = "humantime_duration")]
    pub change_log_retention: Duration,
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default = "default_tracked_collections")]
    pub tracked_collections: Vec<String>,
}

impl StoreConfig {
    /// A configuration with every optional field at its default.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            auth: None,
            workers: DEFAULT_WORKERS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            change_log_retention: DEFAULT_RETENTION,
            snapshot_dir: None,
            tracked_collections: default_tracked_collections(),
        }
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    /// Returns `StoreError` if the file cannot be read, is not valid JSON, or fails validation.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        trace!("loading store configuration from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Opens the snapshot directory, creating it if needed.
    ///
    /// # Errors
    /// `StoreError::StoreError` if no `snapshot_dir` is configured; I/O failures creating it.
    pub fn snapshots(&self) -> Result<SnapshotCache, StoreError> {
        match &self.snapshot_dir {
            Some(dir) => SnapshotCache::new(dir),
            None => Err("snapshot_dir is not configured".into()),
        }
    }

    /// # Errors
    /// Returns `StoreError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".into());
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!("base_url must be an http(s) URL, got {}", self.base_url).into());
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".into());
        }
        Ok(())
    }
}
