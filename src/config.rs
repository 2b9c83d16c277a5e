//! Store and enumerator configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Event read cache size (number of records).
    pub record_cache_size: usize,

    /// Per-subscriber live buffer before the oldest notification is evicted.
    pub live_buffer_size: usize,

    /// Sync the log every N append batches.
    pub sync_interval: u64,

    /// Whether this node accepts reads that require a leader.
    pub is_leader: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store"),
            create_if_missing: true,
            record_cache_size: 4096,
            live_buffer_size: 1024,
            sync_interval: 100,
            is_leader: true,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Options shared by every enumerator built from one engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumeratorOptions {
    /// Page size of historical reads.
    pub read_batch_size: usize,

    /// Multiplier applied to the search window to get the checkpoint
    /// interval of filtered subscriptions, when the caller gives none.
    pub default_checkpoint_interval_multiplier: u32,
}

impl Default for EnumeratorOptions {
    fn default() -> Self {
        Self {
            read_batch_size: 32,
            default_checkpoint_interval_multiplier: 1,
        }
    }
}
