use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Read side of the user's privacy toggles.
pub trait StatsSettings: Send + Sync {
    /// Gates every counter update.
    fn collect_stats(&self) -> bool;
    /// Additionally gates uploads.
    fn share_anonymous_stats(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub collect_stats: bool,
    pub share_anonymous_stats: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collect_stats: true,
            share_anonymous_stats: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsSettings for Settings {
    fn collect_stats(&self) -> bool {
        self.collect_stats
    }

    fn share_anonymous_stats(&self) -> bool {
        self.share_anonymous_stats
    }
}

impl StatsSettings for RwLock<Settings> {
    fn collect_stats(&self) -> bool {
        self.read().collect_stats
    }

    fn share_anonymous_stats(&self) -> bool {
        self.read().share_anonymous_stats
    }
}

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/stats";

/// Where the statistics live and where they are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub data_dir: PathBuf,
    pub record_name: String,
    pub cache_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub endpoint: String,
    pub upload_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            record_name: "statistics".to_string(),
            cache_dir: PathBuf::from("StatsCache"),
            temp_dir: std::env::temp_dir(),
            log_dir: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            upload_delay_secs: 20,
            request_timeout_secs: 10,
        }
    }
}

impl StatsConfig {
    /// Lays out every location under one application data directory.
    pub fn for_data_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            cache_dir: dir.join("StatsCache"),
            log_dir: Some(dir.join("logs")),
            data_dir: dir,
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn upload_delay(&self) -> Duration {
        Duration::from_secs(self.upload_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn upload_record_path(&self) -> PathBuf {
        self.temp_dir.join(format!("{}_upload.json", self.record_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = StatsConfig::from_json(r#"{ "record_name": "stats", "upload_delay_secs": 5 }"#)
            .expect("config");
        assert_eq!(config.record_name, "stats");
        assert_eq!(config.upload_delay(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.upload_record_path().ends_with("stats_upload.json"));
    }

    #[test]
    fn settings_lock_reflects_live_toggles() {
        let settings = RwLock::new(Settings::new());
        assert!(settings.collect_stats());
        settings.write().share_anonymous_stats = false;
        assert!(!StatsSettings::share_anonymous_stats(&settings));
    }
}
