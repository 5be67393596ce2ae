use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::date_key::is_same_day;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PageStat {
    /// Whole seconds spent on the page.
    pub total_time: u64,
    pub visits: u64,
}

impl PageStat {
    pub fn add_time(&mut self, secs: u64) {
        self.total_time = self.total_time.saturating_add(secs);
    }

    pub fn add_visit(&mut self) {
        self.visits = self.visits.saturating_add(1);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SwitcherStat {
    pub accounts: u64,
    pub switches: u64,
    pub games_launched: u64,
    pub unique_days: u64,
    /// `None` until the platform sees its first switch or launch.
    pub last_active: Option<DateTime<Local>>,
    pub game_shortcuts: u64,
    pub game_shortcuts_hotbar: u64,
}

impl SwitcherStat {
    pub fn add_switch(&mut self, now: DateTime<Local>) -> bool {
        self.switches = self.switches.saturating_add(1);
        self.mark_active(now)
    }

    pub fn add_game_launch(&mut self, now: DateTime<Local>) -> bool {
        self.games_launched = self.games_launched.saturating_add(1);
        self.mark_active(now)
    }

    /// Counts `now` as an active day unless the platform was already active on the same
    /// calendar date. Returns whether a new day was recorded.
    pub fn mark_active(&mut self, now: DateTime<Local>) -> bool {
        if let Some(last) = self.last_active {
            if is_same_day(&last, &now) {
                return false;
            }
        }

        self.unique_days = self.unique_days.saturating_add(1);
        self.last_active = Some(now);
        true
    }

    /// Negative slots are hotbar placements.
    pub fn set_shortcuts(&mut self, shortcuts: &BTreeMap<i32, String>) -> bool {
        let total = shortcuts.len() as u64;
        let hotbar = shortcuts.keys().filter(|slot| **slot < 0).count() as u64;
        if self.game_shortcuts == total && self.game_shortcuts_hotbar == hotbar {
            return false;
        }

        self.game_shortcuts = total;
        self.game_shortcuts_hotbar = hotbar;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn first_activity_counts_as_a_day() {
        let mut stat = SwitcherStat::default();
        assert!(stat.add_switch(at(2024, 3, 1, 9)));
        assert_eq!(stat.switches, 1);
        assert_eq!(stat.unique_days, 1);
        assert_eq!(stat.last_active, Some(at(2024, 3, 1, 9)));
    }

    #[test]
    fn same_day_activity_does_not_advance_days() {
        let mut stat = SwitcherStat::default();
        stat.add_switch(at(2024, 3, 1, 9));
        assert!(!stat.add_game_launch(at(2024, 3, 1, 22)));
        assert_eq!(stat.games_launched, 1);
        assert_eq!(stat.unique_days, 1);
        assert_eq!(stat.last_active, Some(at(2024, 3, 1, 9)));
    }

    #[test]
    fn earlier_date_after_clock_change_still_counts_once() {
        let mut stat = SwitcherStat::default();
        stat.add_switch(at(2024, 3, 2, 9));
        assert!(stat.add_switch(at(2024, 3, 1, 9)));
        assert!(!stat.add_switch(at(2024, 3, 1, 10)));
        assert_eq!(stat.unique_days, 2);
    }

    #[test]
    fn shortcut_counts_split_hotbar_slots() {
        let mut stat = SwitcherStat::default();
        let shortcuts: BTreeMap<i32, String> = [(-1, "a"), (-2, "b"), (3, "c")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        assert!(stat.set_shortcuts(&shortcuts));
        assert_eq!(stat.game_shortcuts, 3);
        assert_eq!(stat.game_shortcuts_hotbar, 2);
        assert!(!stat.set_shortcuts(&shortcuts));
    }
}
