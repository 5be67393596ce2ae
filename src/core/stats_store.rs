use super::app_log::AppLog;
use super::clock::{Clock, SystemClock};
use super::game_records::aggregate_game_records;
use super::persistence::{JsonFileStore, PersistenceGateway};
use crate::models::{NavSession, StatisticsAggregate, StatsConfig, StatsSettings};
use anyhow::Result;
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const LOG_SCOPE: &str = "stats/store";
const DEFAULT_RECORD_NAME: &str = "statistics";

struct State {
    stats: StatisticsAggregate,
    nav: NavSession,
}

/// Owned handle to the usage statistics of one process run.
///
/// Loads the persisted record on open and counts the launch. Every update is a no-op while
/// collection is disabled. Share it as `Arc<StatsStore>` between the navigation hooks, the
/// switcher hooks and the upload task.
pub struct StatsStore {
    state: RwLock<State>,
    record_name: String,
    settings: Arc<dyn StatsSettings>,
    persistence: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    log: Arc<AppLog>,
    aggregation: Mutex<()>,
    saving_suspended: AtomicBool,
    pub(crate) upload_in_progress: AtomicBool,
}

pub struct StatsStoreBuilder {
    record_name: String,
    settings: Arc<dyn StatsSettings>,
    persistence: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    log: Arc<AppLog>,
}

impl StatsStoreBuilder {
    pub fn record_name(mut self, name: impl Into<String>) -> Self {
        self.record_name = name.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn log(mut self, log: Arc<AppLog>) -> Self {
        self.log = log;
        self
    }

    pub fn open(self) -> StatsStore {
        let now = self.clock.now();
        let (mut stats, writable) = match self.persistence.load(&self.record_name) {
            Ok(Some(record)) => match serde_json::from_value::<StatisticsAggregate>(record) {
                Ok(stats) => (stats, true),
                Err(e) => (StatisticsAggregate::new(now), self.set_aside(&e.to_string())),
            },
            Ok(None) => (StatisticsAggregate::new(now), true),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                (StatisticsAggregate::new(now), self.set_aside(&e.to_string()))
            }
            Err(e) => {
                self.log.error(
                    LOG_SCOPE,
                    "load_failed",
                    Some(json!({ "record": self.record_name, "error": e.to_string(), "saving": false })),
                );
                (StatisticsAggregate::new(now), false)
            }
        };
        stats.normalize();
        stats.record_launch();

        let store = StatsStore {
            state: RwLock::new(State {
                stats,
                nav: NavSession::new(now),
            }),
            record_name: self.record_name,
            settings: self.settings,
            persistence: self.persistence,
            clock: self.clock,
            log: self.log,
            aggregation: Mutex::new(()),
            saving_suspended: AtomicBool::new(!writable),
            upload_in_progress: AtomicBool::new(false),
        };

        {
            let state = store.state.read();
            store.persist(&state.stats);
        }
        store
    }

    // A record that cannot be parsed is kept under another name. If that fails too, saving
    // stays off for this run so the record is never replaced.
    fn set_aside(&self, error: &str) -> bool {
        match self.persistence.quarantine(&self.record_name) {
            Ok(()) => {
                self.log.warn(
                    LOG_SCOPE,
                    "load_invalid",
                    Some(json!({ "record": self.record_name, "error": error })),
                );
                true
            }
            Err(e) => {
                self.log.error(
                    LOG_SCOPE,
                    "quarantine_failed",
                    Some(json!({ "record": self.record_name, "error": error, "quarantine_error": e.to_string() })),
                );
                false
            }
        }
    }
}

impl StatsStore {
    pub fn builder(settings: Arc<dyn StatsSettings>, persistence: Arc<dyn PersistenceGateway>) -> StatsStoreBuilder {
        StatsStoreBuilder {
            record_name: DEFAULT_RECORD_NAME.to_string(),
            settings,
            persistence,
            clock: Arc::new(SystemClock),
            log: Arc::new(AppLog::tracing_only()),
        }
    }

    /// JSON file persistence under `config.data_dir`, diagnostic log under `config.log_dir`.
    pub fn open_with_config(config: &StatsConfig, settings: Arc<dyn StatsSettings>) -> Self {
        let log = match &config.log_dir {
            Some(dir) => AppLog::new(dir),
            None => AppLog::tracing_only(),
        };
        Self::builder(settings, Arc::new(JsonFileStore::new(&config.data_dir)))
            .record_name(config.record_name.clone())
            .log(Arc::new(log))
            .open()
    }

    pub(crate) fn settings(&self) -> &dyn StatsSettings {
        self.settings.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn log(&self) -> &AppLog {
        &self.log
    }

    fn collecting(&self) -> bool {
        self.settings.collect_stats()
    }

    // Called with the state lock held so saved snapshots are never written out of order.
    fn persist(&self, stats: &StatisticsAggregate) -> bool {
        if !self.saving_enabled() {
            return false;
        }
        match self.save(stats) {
            Ok(()) => true,
            Err(e) => {
                self.log.error(
                    LOG_SCOPE,
                    "save_failed",
                    Some(json!({ "record": self.record_name, "error": e.to_string() })),
                );
                false
            }
        }
    }

    fn save(&self, stats: &StatisticsAggregate) -> io::Result<()> {
        if self.saving_suspended.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "saving suspended: the stored record could not be read",
            ));
        }
        let record = serde_json::to_value(stats).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.persistence.save(&self.record_name, &record)
    }

    /// False when the stored record could not be read on open; nothing is saved then.
    pub fn saving_enabled(&self) -> bool {
        !self.saving_suspended.load(Ordering::Acquire)
    }

    /// Credits the time spent on the previous page and counts a visit to `page`.
    pub fn record_navigation(&self, page: &str) -> bool {
        if !self.collecting() {
            return false;
        }

        let now = self.clock.now();
        let mut state = self.state.write();
        let State { stats, nav } = &mut *state;
        stats.record_navigation(nav, page, now);
        self.persist(stats);
        true
    }

    pub fn set_account_count(&self, platform: &str, count: u64) -> bool {
        if !self.collecting() {
            return false;
        }

        let mut state = self.state.write();
        if state.stats.set_account_count(platform, count) {
            self.persist(&state.stats);
        }
        true
    }

    /// Only the first switch or launch of a calendar day on a platform is saved right away;
    /// later ones ride along with the next save or the final flush.
    pub fn increment_switches(&self, platform: &str) -> bool {
        if !self.collecting() {
            return false;
        }

        let now = self.clock.now();
        let mut state = self.state.write();
        if state.stats.increment_switches(platform, now) {
            self.persist(&state.stats);
        }
        true
    }

    pub fn increment_game_launches(&self, platform: &str) -> bool {
        if !self.collecting() {
            return false;
        }

        let now = self.clock.now();
        let mut state = self.state.write();
        if state.stats.increment_game_launches(platform, now) {
            self.persist(&state.stats);
        }
        true
    }

    /// `shortcuts` maps a slot index to a shortcut label; negative slots are on the hotbar.
    pub fn set_game_shortcut_count(&self, platform: &str, shortcuts: &BTreeMap<i32, String>) -> bool {
        if !self.collecting() {
            return false;
        }

        let mut state = self.state.write();
        if state.stats.set_game_shortcut_count(platform, shortcuts) {
            self.persist(&state.stats);
        }
        true
    }

    pub fn record_crash(&self) -> bool {
        if !self.collecting() {
            return false;
        }

        let mut state = self.state.write();
        state.stats.record_crash();
        self.persist(&state.stats);
        true
    }

    /// Crash counting from inside a panic hook. The panicking thread may already hold the
    /// state lock, so the count is dropped rather than waited for.
    pub(crate) fn record_panic(&self, message: &str) {
        self.log.error("panic", message, None);
        if !self.collecting() {
            return;
        }
        let Some(mut state) = self.state.try_write() else {
            return;
        };
        state.stats.record_crash();
        self.persist(&state.stats);
    }

    /// Forgets everything, including the anonymous id, and saves the empty record.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.stats = StatisticsAggregate::new(now);
        state.nav = NavSession::new(now);
        self.persist(&state.stats);
        self.log.info(LOG_SCOPE, "reset", None);
    }

    /// Recomputes the per-game summaries from `cache_dir`. On failure the previous
    /// summaries are kept.
    pub fn refresh_game_stats(&self, cache_dir: &Path) -> Result<()> {
        let _pass = self.aggregation.lock();
        let games = aggregate_game_records(cache_dir, &self.log)?;
        self.state.write().stats.set_game_stats(games);
        Ok(())
    }

    pub(crate) fn record_upload(&self, date: NaiveDate) {
        let mut state = self.state.write();
        state.stats.mark_uploaded(date);
        self.persist(&state.stats);
    }

    pub fn uploaded_on(&self, date: NaiveDate) -> bool {
        self.state.read().stats.uploaded_on(date)
    }

    pub fn snapshot(&self) -> StatisticsAggregate {
        let mut stats = self.state.read().stats.clone();
        stats.refresh_most_used_platform();
        stats
    }

    pub fn uuid(&self) -> Uuid {
        self.state.read().stats.uuid
    }

    /// Saves the current state. Call on every shutdown path, or hold a [`FlushGuard`].
    pub fn flush(&self) -> io::Result<()> {
        let state = self.state.read();
        self.save(&state.stats)
    }

    pub fn flush_guard(self: &Arc<Self>) -> FlushGuard {
        FlushGuard {
            store: Arc::clone(self),
        }
    }
}

/// Flushes the store when dropped, so every exit path of the owning scope saves.
pub struct FlushGuard {
    store: Arc<StatsStore>,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if let Err(e) = self.store.flush() {
            self.store.log.error(
                LOG_SCOPE,
                "flush_failed",
                Some(json!({ "record": self.store.record_name, "error": e.to_string() })),
            );
        }
    }
}
