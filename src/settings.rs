//! User settings, loaded once per invocation.
//!
//! Stored as `settings.json` in the data directory. A missing file yields the
//! defaults; the pipeline never writes settings back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::cache::DEFAULT_MAX_AGE;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Account allow-list. Empty means no filtering by account.
    pub accounts: Vec<String>,
    /// Cache max age in minutes before a background refresh is scheduled.
    pub cache_minutes: u64,
    /// Command producing tab-separated list records on stdout.
    pub fetch_command: String,
    /// Command opening a list; the list id is appended as the final argument.
    pub open_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            cache_minutes: DEFAULT_MAX_AGE.as_secs() / 60,
            fetch_command: String::new(),
            open_command: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from `settings.json` under `data_dir`, then apply env
    /// overrides. Absent or unreadable files fall back to defaults; a corrupt
    /// file is reported but does not abort the invocation.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("settings.json");
        let mut settings = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), "ignoring corrupt settings: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        if let Ok(val) = dotenvy::var("REMLIST_CACHE_MINUTES")
            .or_else(|_| dotenvy::var("CACHE_MINUTES"))
        {
            match val.parse::<u64>() {
                Ok(minutes) => settings.cache_minutes = minutes,
                Err(_) => warn!(value = %val, "ignoring non-numeric cache minutes override"),
            }
        }

        settings
    }

    /// Write settings to `settings.json` under `data_dir` (used by tests and
    /// first-run setup; the query path never calls this).
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating settings directory {}", data_dir.display()))?;
        let path = data_dir.join("settings.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Cache max age as a [`Duration`].
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_minutes * 60)
    }

    /// Whether a record from `account_name` passes the allow-list.
    pub fn account_allowed(&self, account_name: &str) -> bool {
        self.accounts.is_empty() || self.accounts.iter().any(|a| a == account_name)
    }
}
