//! Anonymous usage statistics for the account switcher.
//!
//! [`StatsStore`] owns the counters for one process run: page visits, per-platform
//! switcher activity and the per-game summaries built from the stats cache. It persists
//! through a [`PersistenceGateway`] and is uploaded at most once per calendar day by
//! [`upload_stats`], normally from [`spawn_upload_task`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use usage_stats::{spawn_upload_task, HttpUploader, Settings, StatsConfig, StatsStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = StatsConfig::for_data_dir("/var/lib/switcher");
//! let store = Arc::new(StatsStore::open_with_config(&config, Arc::new(Settings::new())));
//! let _flush = store.flush_guard();
//! usage_stats::install_panic_hook(store.clone());
//!
//! store.record_navigation("Steam");
//! store.increment_switches("Steam");
//!
//! spawn_upload_task(store.clone(), HttpUploader::from_config(&config)?, config.clone());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod models;

pub use crate::core::{
    install_panic_hook, spawn_upload_task, upload_stats, AppLog, Clock, FlushGuard, HttpUploader, InMemoryStore, JsonFileStore,
    ManualClock, PersistenceGateway, StatsStore, SystemClock, UploadGateway, UploadOutcome, UploadStatus,
};
pub use models::{BasicGameStat, PageStat, Settings, StatisticsAggregate, StatsConfig, StatsSettings, SwitcherStat};
