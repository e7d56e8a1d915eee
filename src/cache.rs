//! Single-slot cache for fetched list records.
//!
//! One JSON file per cache key in the data directory, stamped with the write
//! time. Entries are replaced wholesale, never merged, and the replacement is
//! a temp-file-then-rename so a concurrent reader sees either the old entry
//! or the new one in full.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::model::ReminderList;

/// Default maximum cache age before a refresh is scheduled (10 minutes).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// The single cache key used by the list pipeline.
pub const LISTS_KEY: &str = "reminders";

/// A cached snapshot of list records plus its write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix timestamp (seconds) of the write.
    pub written_at: i64,
    /// Records in the order the data source returned them.
    pub records: Vec<ReminderList>,
}

impl CacheEntry {
    /// Whether this entry is recent enough to serve without refreshing.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.is_fresh_at(now_unix(), max_age)
    }

    /// Pure freshness check against an explicit clock.
    pub fn is_fresh_at(&self, now: i64, max_age: Duration) -> bool {
        now.saturating_sub(self.written_at) < max_age.as_secs() as i64
    }
}

/// File-backed store mapping a cache key to its [`CacheEntry`].
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the entry for `key`.
    ///
    /// Absence is a normal state (first run, or cache cleared externally) and
    /// returns `None`; an unreadable or corrupt file is treated the same way
    /// after logging, since the refresh path will rewrite it.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path(key);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), "discarding corrupt cache entry: {e}");
                None
            }
        }
    }

    /// Atomically replace the entry for `key`, stamped with the current time.
    pub fn put(&self, key: &str, records: Vec<ReminderList>) -> Result<()> {
        let entry = CacheEntry {
            written_at: now_unix(),
            records,
        };
        let path = self.path(key);

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cache directory {}", self.dir.display()))?;

        let json = serde_json::to_string_pretty(&entry)?;

        // Write to a temp file in the same directory, then rename over the
        // target. Readers never observe a partial write.
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        std::fs::write(tmp.path(), json)
            .with_context(|| format!("writing temp cache file {}", tmp.path().display()))?;
        tmp.persist(&path)
            .with_context(|| format!("replacing cache file {}", path.display()))?;

        debug!(key, count = entry.records.len(), "cache entry written");
        Ok(())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

/// Current unix timestamp in seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
