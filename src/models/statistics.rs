use super::game_stats::BasicGameStat;
use super::usage::{PageStat, SwitcherStat};
use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sysinfo::System;
use uuid::Uuid;

static OS_DESCRIPTION: Lazy<String> = Lazy::new(|| {
    System::long_os_version()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("{} {}", std::env::consts::OS, std::env::consts::ARCH))
});

/// Operating system description, resolved once per process.
pub fn os_description() -> &'static str {
    OS_DESCRIPTION.as_str()
}

/// Everything that is persisted locally and sent with an upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatisticsAggregate {
    pub uuid: Uuid,
    pub launch_count: u64,
    pub crash_count: u64,
    pub first_launch: DateTime<Local>,
    pub most_used_platform: String,
    pub operating_system: String,
    pub last_upload: Option<NaiveDate>,
    pub page_stats: BTreeMap<String, PageStat>,
    pub switcher_stats: BTreeMap<String, SwitcherStat>,
    pub all_game_stats: BTreeMap<String, BasicGameStat>,
}

impl Default for StatisticsAggregate {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

/// Session-local navigation cursor. Never serialized.
#[derive(Debug, Clone)]
pub struct NavSession {
    /// Empty until the first navigation of this process.
    pub last_active_page: String,
    pub last_active_page_time: DateTime<Local>,
}

impl NavSession {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            last_active_page: String::new(),
            last_active_page_time: now,
        }
    }
}

impl StatisticsAggregate {
    /// A fresh identity with zeroed counters.
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            launch_count: 0,
            crash_count: 0,
            first_launch: now,
            most_used_platform: String::new(),
            operating_system: os_description().to_string(),
            last_upload: None,
            page_stats: BTreeMap::new(),
            switcher_stats: BTreeMap::new(),
            all_game_stats: BTreeMap::new(),
        }
    }

    /// Fills fields an older or partial record left empty.
    pub fn normalize(&mut self) {
        if self.operating_system.trim().is_empty() {
            self.operating_system = os_description().to_string();
        }
        self.refresh_most_used_platform();
    }

    pub fn record_launch(&mut self) {
        self.launch_count = self.launch_count.saturating_add(1);
    }

    pub fn record_crash(&mut self) {
        self.crash_count = self.crash_count.saturating_add(1);
    }

    /// Credits the time since the previous navigation to the previous page and counts a
    /// visit for `new_page`. The first call of a session only counts the visit.
    pub fn record_navigation(&mut self, nav: &mut NavSession, new_page: &str, now: DateTime<Local>) {
        if nav.last_active_page.is_empty() {
            nav.last_active_page = new_page.to_string();
            nav.last_active_page_time = now;
        } else {
            let elapsed = now
                .signed_duration_since(nav.last_active_page_time)
                .num_seconds()
                .max(0) as u64;
            self.page_stats
                .entry(std::mem::take(&mut nav.last_active_page))
                .or_default()
                .add_time(elapsed);
            nav.last_active_page = new_page.to_string();
            nav.last_active_page_time = now;
        }

        self.page_stats
            .entry(new_page.to_string())
            .or_default()
            .add_visit();
    }

    fn switcher_mut(&mut self, platform: &str) -> &mut SwitcherStat {
        self.switcher_stats.entry(platform.to_string()).or_default()
    }

    /// Returns whether the stored count changed.
    pub fn set_account_count(&mut self, platform: &str, count: u64) -> bool {
        let stat = self.switcher_mut(platform);
        if stat.accounts == count {
            return false;
        }
        stat.accounts = count;
        true
    }

    /// Returns whether this was the platform's first activity of the day.
    pub fn increment_switches(&mut self, platform: &str, now: DateTime<Local>) -> bool {
        let new_day = self.switcher_mut(platform).add_switch(now);
        self.refresh_most_used_platform();
        new_day
    }

    /// Returns whether this was the platform's first activity of the day.
    pub fn increment_game_launches(&mut self, platform: &str, now: DateTime<Local>) -> bool {
        self.switcher_mut(platform).add_game_launch(now)
    }

    pub fn set_game_shortcut_count(&mut self, platform: &str, shortcuts: &BTreeMap<i32, String>) -> bool {
        self.switcher_mut(platform).set_shortcuts(shortcuts)
    }

    pub fn set_game_stats(&mut self, stats: BTreeMap<String, BasicGameStat>) {
        self.all_game_stats = stats;
    }

    /// Platform with the most switches; the alphabetically first one wins ties.
    pub fn derive_most_used_platform(&self) -> String {
        let mut best: Option<(&str, u64)> = None;
        for (name, stat) in &self.switcher_stats {
            if stat.switches == 0 {
                continue;
            }
            match best {
                Some((_, switches)) if switches >= stat.switches => {}
                _ => best = Some((name.as_str(), stat.switches)),
            }
        }
        best.map(|(name, _)| name.to_string()).unwrap_or_default()
    }

    pub fn refresh_most_used_platform(&mut self) {
        self.most_used_platform = self.derive_most_used_platform();
    }

    pub fn uploaded_on(&self, date: NaiveDate) -> bool {
        self.last_upload == Some(date)
    }

    pub fn mark_uploaded(&mut self, date: NaiveDate) {
        self.last_upload = Some(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn first_navigation_counts_visit_without_time() {
        let start = at(2024, 5, 1, 10, 0, 0);
        let mut stats = StatisticsAggregate::new(start);
        let mut nav = NavSession::new(start);

        stats.record_navigation(&mut nav, "Steam", start);

        assert_eq!(stats.page_stats["Steam"], PageStat { total_time: 0, visits: 1 });
        assert_eq!(nav.last_active_page, "Steam");
    }

    #[test]
    fn elapsed_time_goes_to_previous_page_truncated() {
        let start = at(2024, 5, 1, 10, 0, 0);
        let mut stats = StatisticsAggregate::new(start);
        let mut nav = NavSession::new(start);

        stats.record_navigation(&mut nav, "A", start);
        stats.record_navigation(&mut nav, "B", start + Duration::milliseconds(12_900));
        stats.record_navigation(&mut nav, "B", start + Duration::milliseconds(15_000));

        assert_eq!(stats.page_stats["A"], PageStat { total_time: 12, visits: 1 });
        // 2.1s on B, then a second visit to B.
        assert_eq!(stats.page_stats["B"], PageStat { total_time: 2, visits: 2 });
    }

    #[test]
    fn zero_elapsed_adds_nothing() {
        let start = at(2024, 5, 1, 10, 0, 0);
        let mut stats = StatisticsAggregate::new(start);
        let mut nav = NavSession::new(start);

        stats.record_navigation(&mut nav, "A", start);
        stats.record_navigation(&mut nav, "B", start);

        assert_eq!(stats.page_stats["A"].total_time, 0);
    }

    #[test]
    fn clock_moving_backwards_clamps_to_zero() {
        let start = at(2024, 5, 1, 10, 0, 0);
        let mut stats = StatisticsAggregate::new(start);
        let mut nav = NavSession::new(start);

        stats.record_navigation(&mut nav, "A", start);
        stats.record_navigation(&mut nav, "B", start - Duration::minutes(30));
        stats.record_navigation(&mut nav, "C", start - Duration::minutes(29));

        assert_eq!(stats.page_stats["A"].total_time, 0);
        assert_eq!(stats.page_stats["B"].total_time, 60);
    }

    #[test]
    fn visits_sum_matches_navigation_calls() {
        let start = at(2024, 5, 1, 10, 0, 0);
        let mut stats = StatisticsAggregate::new(start);
        let mut nav = NavSession::new(start);

        let pages = ["A", "B", "A", "A", "C", "B", "D"];
        for (i, page) in pages.iter().enumerate() {
            stats.record_navigation(&mut nav, page, start + Duration::seconds(i as i64 * 7));
        }

        let visits: u64 = stats.page_stats.values().map(|p| p.visits).sum();
        assert_eq!(visits, pages.len() as u64);
    }

    #[test]
    fn most_used_platform_prefers_switches_then_name() {
        let now = at(2024, 5, 1, 10, 0, 0);
        let mut stats = StatisticsAggregate::new(now);
        assert_eq!(stats.derive_most_used_platform(), "");

        stats.increment_game_launches("Epic", now);
        assert_eq!(stats.derive_most_used_platform(), "");

        stats.increment_switches("Steam", now);
        stats.increment_switches("Discord", now);
        assert_eq!(stats.most_used_platform, "Discord");

        stats.increment_switches("Steam", now);
        assert_eq!(stats.most_used_platform, "Steam");
    }

    #[test]
    fn missing_fields_default_and_unknown_fields_are_ignored() {
        let json = r#"{
            "launch_count": 4,
            "page_stats": { "Steam": { "visits": 2 } },
            "switcher_stats": { "Steam": { "switches": 3, "last_active": null } },
            "legacy_field": true
        }"#;

        let mut stats: StatisticsAggregate = serde_json::from_str(json).expect("deserialize");
        stats.normalize();

        assert_eq!(stats.launch_count, 4);
        assert_eq!(stats.crash_count, 0);
        assert_eq!(stats.last_upload, None);
        assert_eq!(stats.page_stats["Steam"], PageStat { total_time: 0, visits: 2 });
        assert_eq!(stats.switcher_stats["Steam"].switches, 3);
        assert_eq!(stats.most_used_platform, "Steam");
        assert!(!stats.operating_system.is_empty());
        assert!(stats.all_game_stats.is_empty());
    }

    #[test]
    fn serialized_form_uses_stable_field_names() {
        let now = at(2024, 5, 1, 10, 0, 0);
        let mut stats = StatisticsAggregate::new(now);
        stats.mark_uploaded(now.date_naive());

        let value = serde_json::to_value(&stats).expect("serialize");
        for key in [
            "uuid",
            "launch_count",
            "crash_count",
            "first_launch",
            "most_used_platform",
            "operating_system",
            "last_upload",
            "page_stats",
            "switcher_stats",
            "all_game_stats",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["last_upload"], "2024-05-01");
        assert!(value.get("last_active_page").is_none());
    }
}
