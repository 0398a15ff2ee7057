use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the put path detects that an incoming record duplicates a stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutPolicy {
    /// Scan every record sharing the key and compare values byte for byte.
    #[default]
    DedupByValue,
    /// Look the record up by `(key, value_hash)` through its index.
    UpsertByValueHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; `None` keeps the table in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub put_policy: PutPolicy,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
    #[serde(default = "default_max_value_size")]
    pub max_value_size: usize,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_scan_batch_size() -> usize {
    64
}

fn default_max_value_size() -> usize {
    64 * 1024
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            put_policy: PutPolicy::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            scan_batch_size: default_scan_batch_size(),
            max_value_size: default_max_value_size(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_put_policy(mut self, put_policy: PutPolicy) -> Self {
        self.put_policy = put_policy;
        self
    }

    pub fn with_scan_batch_size(mut self, scan_batch_size: usize) -> Self {
        self.scan_batch_size = scan_batch_size;
        self
    }
}
