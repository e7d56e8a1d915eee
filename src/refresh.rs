//! Background refresh coordination.
//!
//! The interactive query path never talks to the data source directly; it
//! schedules a refresh job that runs detached from the invoking process and
//! communicates back exclusively through the cache store. A per-key lock file
//! enforces at most one live job per key, and it holds across separate
//! process invocations, not just within one process. Acquisition uses
//! exclusive create, so two concurrent schedulers cannot both win.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::source::DataSource;

/// A lock older than this belongs to a crashed job and is reclaimed. Chosen
/// well above the several-second ceiling of a slow fetch.
pub const STALE_LOCK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("a refresh job is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Starts the detached worker for a scheduled refresh.
///
/// Behind a trait so the pipeline can be exercised without spawning
/// processes.
pub trait JobLauncher {
    fn launch(&self, key: &str) -> Result<()>;
}

/// Production launcher: re-invokes the current executable as
/// `update --job`, fully detached (null stdio, never waited on), so the job
/// outlives the interactive invocation that scheduled it.
pub struct DetachedProcessLauncher {
    data_dir: PathBuf,
}

impl DetachedProcessLauncher {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl JobLauncher for DetachedProcessLauncher {
    fn launch(&self, key: &str) -> Result<()> {
        let exe = std::env::current_exe().context("locating current executable")?;
        let child = Command::new(exe)
            .args(["update", "--job"])
            .arg("--data-dir")
            .arg(&self.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawning refresh job")?;
        debug!(key, pid = child.id(), "refresh job spawned");
        Ok(())
    }
}

/// Clears the lock file when dropped unless handed over to the job.
struct RefreshGuard {
    path: Option<PathBuf>,
}

impl RefreshGuard {
    /// Leave the lock in place for the launched job to clear.
    fn hand_over(mut self) {
        self.path = None;
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), "failed to clear refresh lock: {e}");
            }
        }
    }
}

/// Ensures at most one refresh job per key and launches jobs out-of-band.
pub struct RefreshCoordinator {
    dir: PathBuf,
    stale_after: Duration,
    launcher: Box<dyn JobLauncher>,
}

impl RefreshCoordinator {
    pub fn new(data_dir: impl Into<PathBuf>, launcher: Box<dyn JobLauncher>) -> Self {
        Self {
            dir: data_dir.into(),
            stale_after: STALE_LOCK_TIMEOUT,
            launcher,
        }
    }

    /// Coordinator with the production detached-process launcher.
    pub fn detached(data_dir: impl Into<PathBuf>) -> Self {
        let dir: PathBuf = data_dir.into();
        let launcher = DetachedProcessLauncher::new(dir.clone());
        Self::new(dir, Box::new(launcher))
    }

    /// Override the stale-lock timeout (tests).
    pub fn with_stale_timeout(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Whether a refresh job is currently live for `key`.
    pub fn is_refreshing(&self, key: &str) -> bool {
        match std::fs::metadata(self.lock_path(key)) {
            Ok(meta) => !self.is_stale(&meta),
            Err(_) => false,
        }
    }

    /// Schedule a background refresh for `key`.
    ///
    /// Returns `Ok(true)` when a job was launched, `Ok(false)` when one is
    /// already live (idempotent no-op). The lock is created here, before the
    /// launch, and cleared by the job when it finishes; a failed launch
    /// clears it immediately.
    pub fn schedule(&self, key: &str) -> Result<bool> {
        let guard = match self.try_acquire(key) {
            Ok(guard) => guard,
            Err(LockError::AlreadyRunning) => {
                debug!(key, "refresh already in flight, not scheduling");
                return Ok(false);
            }
            Err(LockError::Io(e)) => {
                return Err(e).context("acquiring refresh lock");
            }
        };

        self.launcher.launch(key)?;
        guard.hand_over();
        Ok(true)
    }

    /// Run the refresh job body: fetch, write the cache, clear the lock.
    ///
    /// `owns_lock` marks a job spawned by [`schedule`](Self::schedule), whose
    /// lock already exists and is owned by this process. A directly invoked
    /// job acquires the lock itself and quietly yields if another job is
    /// live. The lock is cleared on success and failure alike; a failed
    /// fetch leaves the cache untouched and is retried by whichever later
    /// invocation next finds the cache stale.
    pub fn run_job(
        &self,
        key: &str,
        source: &dyn DataSource,
        store: &CacheStore,
        owns_lock: bool,
    ) -> Result<()> {
        let _guard = if owns_lock {
            RefreshGuard {
                path: Some(self.lock_path(key)),
            }
        } else {
            match self.try_acquire(key) {
                Ok(guard) => guard,
                Err(LockError::AlreadyRunning) => {
                    info!(key, "refresh already running, nothing to do");
                    return Ok(());
                }
                Err(LockError::Io(e)) => return Err(e).context("acquiring refresh lock"),
            }
        };

        info!(key, "fetching lists from data source");
        let records = source
            .fetch_lists()
            .with_context(|| format!("refreshing cache entry {key:?}"))?;
        info!(key, count = records.len(), "caching fetched lists");
        store.put(key, records)?;
        Ok(())
    }

    fn try_acquire(&self, key: &str) -> Result<RefreshGuard, LockError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(key);

        for _ in 0..2 {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => {
                    return Ok(RefreshGuard {
                        path: Some(path),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let stale = std::fs::metadata(&path)
                        .map(|meta| self.is_stale(&meta))
                        .unwrap_or(true);
                    if !stale {
                        return Err(LockError::AlreadyRunning);
                    }
                    warn!(path = %path.display(), "reclaiming stale refresh lock");
                    match std::fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Lost the reclaim race to another scheduler.
        Err(LockError::AlreadyRunning)
    }

    fn is_stale(&self, meta: &std::fs::Metadata) -> bool {
        meta.modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .is_none_or(|age| age >= self.stale_after)
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.refresh.lock"))
    }
}

/// Lock path helper for external inspection (tests).
pub fn lock_path(data_dir: &Path, key: &str) -> PathBuf {
    data_dir.join(format!("{key}.refresh.lock"))
}
