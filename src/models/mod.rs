pub mod game_stats;
pub mod settings;
pub mod statistics;
pub mod usage;

pub use game_stats::BasicGameStat;
pub use settings::{Settings, StatsConfig, StatsSettings};
pub use statistics::{NavSession, StatisticsAggregate};
pub use usage::{PageStat, SwitcherStat};
