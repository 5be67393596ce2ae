use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Per-game summary of a cache file: how many accounts it lists and how often each
/// hidden metric shows up across them.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BasicGameStat {
    pub num_accounts: u64,
    pub hidden_metrics: HashMap<String, u64>,
}

impl BasicGameStat {
    pub fn from_accounts(accounts: &BTreeMap<String, Vec<String>>) -> Self {
        let mut hidden_metrics: HashMap<String, u64> = HashMap::new();
        for metrics in accounts.values() {
            for metric in metrics {
                hidden_metrics
                    .entry(metric.clone())
                    .and_modify(|v| *v = v.saturating_add(1))
                    .or_insert(1);
            }
        }

        Self {
            num_accounts: accounts.len() as u64,
            hidden_metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_metrics_within_one_account_count_twice() {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            "x".to_string(),
            vec!["m1".to_string(), "m1".to_string()],
        );
        accounts.insert("y".to_string(), Vec::new());

        let stat = BasicGameStat::from_accounts(&accounts);
        assert_eq!(stat.num_accounts, 2);
        assert_eq!(stat.hidden_metrics.get("m1").copied(), Some(2));
        assert_eq!(stat.hidden_metrics.len(), 1);
    }
}
