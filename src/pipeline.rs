//! End-to-end query pipeline.
//!
//! Composes the cache store, freshness policy, refresh coordinator, account
//! allow-list, and fuzzy filter into the two operations the launcher invokes:
//! `list` and `open`. The list path answers from whatever is cached right
//! now, schedules background refreshes when data is stale or absent, and asks
//! the launcher to poll again while a refresh is in flight. It never blocks
//! on the data source.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheStore, LISTS_KEY};
use crate::filter::{self, DEFAULT_MIN_SCORE};
use crate::refresh::RefreshCoordinator;
use crate::settings::Settings;
use crate::source::DataSource;
use crate::update_check::UpdateInfo;

/// Poll-again delay suggested to the launcher while a refresh is in flight.
pub const RERUN_INTERVAL: f64 = 0.5;

const ICON_INFO: &str =
    "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/ToolbarInfo.icns";
const ICON_SYNC: &str = "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/Sync.icns";
const ICON_WARNING: &str =
    "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/AlertCautionIcon.icns";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Icon {
    pub path: String,
}

/// One row of launcher feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub title: String,
    pub subtitle: String,
    /// Action payload: the opaque list id, passed back to `open` verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    /// Stable identity for the launcher's ordering. Omitted when the update
    /// notice is shown so the emitted order is preserved as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
}

impl Item {
    fn placeholder(title: &str, subtitle: &str, icon: &str) -> Self {
        Self {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            arg: None,
            uid: None,
            valid: false,
            icon: Some(Icon {
                path: icon.to_string(),
            }),
        }
    }
}

/// The ordered result document for one `list` invocation.
#[derive(Debug, Serialize)]
pub struct Feedback {
    pub items: Vec<Item>,
    /// Seconds after which the launcher should re-invoke `list`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerun: Option<f64>,
}

/// Query pipeline over injected collaborators.
pub struct Pipeline<'a> {
    store: &'a CacheStore,
    coordinator: &'a RefreshCoordinator,
    settings: &'a Settings,
    source: &'a dyn DataSource,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a CacheStore,
        coordinator: &'a RefreshCoordinator,
        settings: &'a Settings,
        source: &'a dyn DataSource,
    ) -> Self {
        Self {
            store,
            coordinator,
            settings,
            source,
        }
    }

    /// Produce the ranked feedback for `query`.
    ///
    /// The returned item sequence is never empty: an absent cache yields a
    /// "loading" placeholder, an empty filter result yields a "no matches"
    /// placeholder. An empty item set would be indistinguishable from a
    /// pipeline failure to the surrounding launcher.
    pub fn list(&self, query: &str, update: Option<&UpdateInfo>) -> Feedback {
        let mut items = Vec::new();
        let mut rerun = None;

        // Update notice goes on top, only when the user is not mid-query.
        // While it is shown, uids are withheld so the launcher cannot
        // reorder it below remembered results.
        let mut send_uids = true;
        if query.is_empty() {
            if let Some(info) = update {
                send_uids = false;
                items.push(Item::placeholder(
                    &format!("Version {} of remlist is available", info.latest_version),
                    &info.release_url,
                    ICON_INFO,
                ));
            }
        }

        let Some(entry) = self.store.get(LISTS_KEY) else {
            // First run: nothing cached yet. Kick off a refresh and tell the
            // launcher to come back for the real results.
            self.schedule_refresh();
            items.push(Item::placeholder(
                "Loading lists…",
                "Results will refresh momentarily",
                ICON_SYNC,
            ));
            return Feedback {
                items,
                rerun: Some(RERUN_INTERVAL),
            };
        };

        if !entry.is_fresh(self.settings.cache_max_age()) {
            debug!("cache entry stale, scheduling refresh");
            self.schedule_refresh();
        }
        if self.coordinator.is_refreshing(LISTS_KEY) {
            rerun = Some(RERUN_INTERVAL);
        }

        let mut lists = entry.records;
        lists.retain(|l| self.settings.account_allowed(&l.account_name));
        let lists = filter::filter(query, lists, |l| l.list_name.as_str(), DEFAULT_MIN_SCORE);

        if lists.is_empty() {
            items.push(Item::placeholder(
                "No matching lists",
                "Try a different query.",
                ICON_WARNING,
            ));
        } else {
            for l in lists {
                items.push(Item {
                    title: l.list_name.clone(),
                    subtitle: format!("{} > {}", l.account_name, l.list_name),
                    arg: Some(l.list_id.clone()),
                    uid: send_uids.then(|| l.list_id.clone()),
                    valid: true,
                    icon: None,
                });
            }
        }

        Feedback { items, rerun }
    }

    /// Open the list with the given id: a direct, single-shot pass-through.
    /// Unlike the list path there is no cache to fall back on, so failure is
    /// surfaced to the caller with the data source's own message.
    pub fn open(&self, list_id: &str) -> Result<()> {
        debug!(list_id, "opening list");
        self.source.open_list(list_id)
    }

    fn schedule_refresh(&self) {
        // Failures here are contained: the user still gets whatever is
        // cached, and a later invocation retries.
        if let Err(e) = self.coordinator.schedule(LISTS_KEY) {
            warn!("failed to schedule refresh: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::model::ReminderList;
    use crate::refresh::JobLauncher;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    struct CountingLauncher {
        launches: Arc<AtomicUsize>,
    }

    impl JobLauncher for CountingLauncher {
        fn launch(&self, _key: &str) -> Result<()> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeSource {
        opened: Mutex<Vec<String>>,
        open_error: Option<String>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                opened: Mutex::new(Vec::new()),
                open_error: None,
            }
        }
    }

    impl DataSource for FakeSource {
        fn fetch_lists(&self) -> Result<Vec<ReminderList>> {
            Ok(vec![])
        }

        fn open_list(&self, list_id: &str) -> Result<()> {
            if let Some(msg) = &self.open_error {
                anyhow::bail!("{msg}");
            }
            self.opened.lock().push(list_id.to_string());
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: CacheStore,
        coordinator: RefreshCoordinator,
        settings: Settings,
        source: FakeSource,
        launches: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let launches = Arc::new(AtomicUsize::new(0));
            let coordinator = RefreshCoordinator::new(
                dir.path(),
                Box::new(CountingLauncher {
                    launches: Arc::clone(&launches),
                }),
            );
            Self {
                store: CacheStore::new(dir.path()),
                coordinator,
                settings: Settings::default(),
                source: FakeSource::new(),
                launches,
                _dir: dir,
            }
        }

        fn pipeline(&self) -> Pipeline<'_> {
            Pipeline::new(&self.store, &self.coordinator, &self.settings, &self.source)
        }

        fn cache(&self, records: Vec<ReminderList>) {
            self.store.put(LISTS_KEY, records).unwrap();
        }

        /// Rewrite the cache entry with an ancient timestamp.
        fn make_cache_stale(&self) {
            let entry = self.store.get(LISTS_KEY).unwrap();
            let stale = CacheEntry {
                written_at: 0,
                records: entry.records,
            };
            let path = self._dir.path().join(format!("{LISTS_KEY}.json"));
            std::fs::write(path, serde_json::to_string(&stale).unwrap()).unwrap();
        }
    }

    fn sample_records() -> Vec<ReminderList> {
        vec![
            ReminderList::new("iCloud", "Groceries", "id-1"),
            ReminderList::new("iCloud", "Work", "id-2"),
            ReminderList::new("On My Mac", "Home", "id-3"),
        ]
    }

    #[test]
    fn test_absent_cache_emits_loading_and_schedules_once() {
        let fx = Fixture::new();
        let feedback = fx.pipeline().list("", None);

        assert_eq!(feedback.items.len(), 1);
        let item = &feedback.items[0];
        assert!(item.title.starts_with("Loading"));
        assert!(!item.valid);
        assert_eq!(feedback.rerun, Some(RERUN_INTERVAL));
        assert_eq!(fx.launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeated_list_while_loading_schedules_only_once() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline();

        // Keystroke-style re-invocation while the first refresh is out.
        pipeline.list("", None);
        pipeline.list("g", None);
        pipeline.list("gr", None);
        assert_eq!(fx.launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fresh_cache_serves_without_scheduling() {
        let fx = Fixture::new();
        fx.cache(sample_records());

        let feedback = fx.pipeline().list("", None);

        assert_eq!(feedback.items.len(), 3);
        assert_eq!(feedback.rerun, None);
        assert_eq!(fx.launches.load(Ordering::SeqCst), 0);

        let first = &feedback.items[0];
        assert_eq!(first.title, "Groceries");
        assert_eq!(first.subtitle, "iCloud > Groceries");
        assert_eq!(first.arg.as_deref(), Some("id-1"));
        assert_eq!(first.uid.as_deref(), Some("id-1"));
        assert!(first.valid);
    }

    #[test]
    fn test_stale_cache_schedules_and_still_answers() {
        let fx = Fixture::new();
        fx.cache(sample_records());
        fx.make_cache_stale();

        let feedback = fx.pipeline().list("", None);

        // Stale data is served immediately; the refresh runs out-of-band,
        // and the launcher is told to poll again.
        assert_eq!(feedback.items.len(), 3);
        assert!(feedback.items.iter().all(|i| i.valid));
        assert_eq!(feedback.rerun, Some(RERUN_INTERVAL));
        assert_eq!(fx.launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_query_is_idempotent() {
        let fx = Fixture::new();
        fx.cache(sample_records());
        let pipeline = fx.pipeline();

        let a = pipeline.list("", None);
        let b = pipeline.list("", None);
        assert_eq!(a.items, b.items);
    }

    #[test]
    fn test_query_filters_to_matching_list() {
        let fx = Fixture::new();
        fx.cache(vec![
            ReminderList::new("A", "Groceries", "id1"),
            ReminderList::new("A", "Work", "id2"),
        ]);

        let feedback = fx.pipeline().list("gro", None);
        let titles: Vec<&str> = feedback.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["Groceries"]);
    }

    #[test]
    fn test_account_allow_list_applies_for_any_query() {
        let mut fx = Fixture::new();
        fx.settings.accounts = vec!["iCloud".into()];
        fx.cache(sample_records());
        let pipeline = fx.pipeline();

        for query in ["", "o", "home"] {
            let feedback = pipeline.list(query, None);
            assert!(
                feedback
                    .items
                    .iter()
                    .filter(|i| i.valid)
                    .all(|i| i.subtitle.starts_with("iCloud")),
                "query {query:?} leaked a filtered account"
            );
        }
    }

    #[test]
    fn test_no_matches_placeholder_instead_of_empty() {
        let fx = Fixture::new();
        fx.cache(sample_records());

        let feedback = fx.pipeline().list("zzzzzz", None);

        assert_eq!(feedback.items.len(), 1);
        assert_eq!(feedback.items[0].title, "No matching lists");
        assert!(!feedback.items[0].valid);
    }

    #[test]
    fn test_duplicate_names_stay_distinct_by_id() {
        let fx = Fixture::new();
        fx.cache(vec![
            ReminderList::new("iCloud", "Tasks", "id-a"),
            ReminderList::new("On My Mac", "Tasks", "id-b"),
        ]);

        let feedback = fx.pipeline().list("tasks", None);

        assert_eq!(feedback.items.len(), 2);
        let args: Vec<&str> = feedback
            .items
            .iter()
            .map(|i| i.arg.as_deref().unwrap())
            .collect();
        assert_eq!(args, ["id-a", "id-b"]);
    }

    #[test]
    fn test_update_notice_pins_on_top_and_drops_uids() {
        let fx = Fixture::new();
        fx.cache(sample_records());
        let info = UpdateInfo {
            latest_version: "9.9.9".into(),
            release_url: "https://example.com/release".into(),
        };

        let feedback = fx.pipeline().list("", Some(&info));

        assert!(feedback.items[0].title.contains("9.9.9"));
        assert!(!feedback.items[0].valid);
        assert!(feedback.items.iter().all(|i| i.uid.is_none()));

        // Mid-query, the notice is suppressed and uids come back.
        let feedback = fx.pipeline().list("gro", Some(&info));
        assert_eq!(feedback.items[0].title, "Groceries");
        assert!(feedback.items[0].uid.is_some());
    }

    #[test]
    fn test_list_never_returns_zero_items() {
        let fx = Fixture::new();
        for query in ["", "gro", "no-such-list-name"] {
            assert!(!fx.pipeline().list(query, None).items.is_empty());
        }
        fx.cache(vec![]);
        for query in ["", "anything"] {
            assert!(!fx.pipeline().list(query, None).items.is_empty());
        }
    }

    #[test]
    fn test_open_delegates_to_source() {
        let fx = Fixture::new();
        fx.pipeline().open("id-42").unwrap();
        assert_eq!(*fx.source.opened.lock(), vec!["id-42".to_string()]);
    }

    #[test]
    fn test_open_failure_surfaces_exact_message() {
        let mut fx = Fixture::new();
        fx.source.open_error = Some("Failed to open list bad-id".into());

        let err = fx.pipeline().open("bad-id").unwrap_err();
        assert_eq!(err.to_string(), "Failed to open list bad-id");
    }

    #[test]
    fn test_feedback_serialization_shape() {
        let fx = Fixture::new();
        fx.cache(vec![ReminderList::new("iCloud", "Groceries", "id-1")]);

        let feedback = fx.pipeline().list("", None);
        let json = serde_json::to_value(&feedback).unwrap();

        assert_eq!(json["items"][0]["title"], "Groceries");
        assert_eq!(json["items"][0]["arg"], "id-1");
        assert_eq!(json["items"][0]["valid"], true);
        // No refresh in flight: rerun is omitted entirely.
        assert!(json.get("rerun").is_none());
    }
}
