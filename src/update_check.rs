//! Release-update checker.
//!
//! Looks up the latest GitHub release at most once a day and silently stays
//! quiet on any failure, so an offline machine never notices it exists. The
//! network call rides along with the background refresh job; the interactive
//! path only reads the persisted verdict, which keeps showing until the
//! running version catches up with the discovered release. The pipeline
//! surfaces it as a single notice row above the list results when the query
//! is empty.

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::now_unix;

/// How often to check for updates (daily).
const CHECK_INTERVAL_SECS: i64 = 24 * 3600;

/// Timeout for the release request; short so a slow network cannot hold up
/// an interactive invocation.
const HTTP_TIMEOUT_SECS: u64 = 5;

/// GitHub repo whose releases carry newer versions.
const GITHUB_REPO: &str = "remlist/remlist";

fn updates_disabled() -> bool {
    dotenvy::var("REMLIST_NO_UPDATE_CHECK").is_ok() || dotenvy::var("CI").is_ok()
}

/// Persistent update-checker state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateState {
    /// Unix timestamp of the last check, successful or not.
    pub last_check_ts: i64,
    /// Newest release found by the last successful check, if it was newer
    /// than the version running at the time.
    #[serde(default)]
    pub available: Option<AvailableRelease>,
}

/// A release recorded as newer than the running version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableRelease {
    pub latest_version: String,
    pub release_url: String,
}

impl UpdateState {
    pub fn load(data_dir: &Path) -> Self {
        match std::fs::read_to_string(Self::path(data_dir)) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        let path = Self::path(data_dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn should_check(&self) -> bool {
        now_unix() - self.last_check_ts >= CHECK_INTERVAL_SECS
    }

    pub fn mark_checked(&mut self) {
        self.last_check_ts = now_unix();
    }

    fn path(data_dir: &Path) -> std::path::PathBuf {
        data_dir.join("update_state.json")
    }
}

/// An available newer release.
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub latest_version: String,
    pub release_url: String,
}

/// GitHub release API response (minimal fields).
#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    html_url: String,
}

/// Read the verdict persisted by the last release check.
///
/// No network: this is the only update function the interactive path calls.
/// Returns `Some` while the recorded release is still newer than the running
/// version, so the notice survives across invocations and disappears on its
/// own once the user has updated.
pub fn available_update(data_dir: &Path, current_version: &str) -> Option<UpdateInfo> {
    let saved = UpdateState::load(data_dir).available?;
    let latest = Version::parse(&saved.latest_version).ok()?;
    let current = Version::parse(current_version).ok()?;
    (latest > current).then(|| UpdateInfo {
        latest_version: saved.latest_version,
        release_url: saved.release_url,
    })
}

/// Check for a newer release, respecting the daily cadence, and persist the
/// outcome for [`available_update`] to read.
///
/// Returns `None` when checks are disabled, checked recently, the network is
/// unreachable, the response does not parse, or we are already current.
pub fn check_for_updates(data_dir: &Path, current_version: &str) -> Option<UpdateInfo> {
    if updates_disabled() {
        return None;
    }

    let mut state = UpdateState::load(data_dir);
    if !state.should_check() {
        debug!("update check: skipping, checked recently");
        return None;
    }

    // Mark the attempt before fetching so a flaky network is not hammered.
    state.mark_checked();
    if let Err(e) = state.save(data_dir) {
        warn!("update check: failed to save state: {e}");
    }

    let release = match fetch_latest_release() {
        Ok(r) => r,
        Err(e) => {
            debug!("update check: fetch failed (offline?): {e}");
            return None;
        }
    };

    let latest_str = release.tag_name.trim_start_matches('v');
    let latest = match Version::parse(latest_str) {
        Ok(v) => v,
        Err(e) => {
            debug!("update check: invalid version '{}': {e}", release.tag_name);
            return None;
        }
    };
    let current = match Version::parse(current_version) {
        Ok(v) => v,
        Err(e) => {
            debug!("update check: invalid current version '{current_version}': {e}");
            return None;
        }
    };

    state.available = (latest > current).then(|| AvailableRelease {
        latest_version: latest_str.to_string(),
        release_url: release.html_url,
    });
    if let Err(e) = state.save(data_dir) {
        warn!("update check: failed to save state: {e}");
    }

    state.available.map(|a| UpdateInfo {
        latest_version: a.latest_version,
        release_url: a.release_url,
    })
}

fn fetch_latest_release() -> Result<GitHubRelease> {
    let url = format!("https://api.github.com/repos/{GITHUB_REPO}/releases/latest");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(concat!("remlist/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;

    let response = client
        .get(&url)
        .header("Accept", "application/vnd.github.v3+json")
        .send()
        .context("fetching release")?;

    if !response.status().is_success() {
        anyhow::bail!("GitHub API returned {}", response.status());
    }

    response.json::<GitHubRelease>().context("parsing release JSON")
}
