use super::app_log::AppLog;
use crate::models::BasicGameStat;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_SCOPE: &str = "stats/game_records";
const RECORD_EXTENSION: &str = "json";

/// Account id -> hidden metric names, as written by the per-game caches.
pub type GameRecord = BTreeMap<String, Vec<String>>;

fn game_name(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case(RECORD_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.trim();
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_string())
}

fn record_files(cache_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(cache_dir)
        .with_context(|| format!("Failed to list game cache {}", cache_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list game cache {}", cache_dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = game_name(&path) {
            files.push((name, path));
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_game_record(path: &Path) -> Result<GameRecord> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Malformed game record {}", path.display()))
}

/// Summarizes every `<game>.json` in `cache_dir`.
///
/// A missing directory is an empty result. The first unreadable or malformed file fails
/// the whole pass; nothing is returned for the files that did parse.
pub fn aggregate_game_records(cache_dir: &Path, log: &AppLog) -> Result<BTreeMap<String, BasicGameStat>> {
    let mut all = BTreeMap::new();
    if !cache_dir.exists() {
        return Ok(all);
    }
    if !cache_dir.is_dir() {
        return Err(anyhow!("Game cache {} is not a directory", cache_dir.display()));
    }

    for (game, path) in record_files(cache_dir)? {
        let record = match read_game_record(&path) {
            Ok(record) => record,
            Err(e) => {
                log.error(
                    LOG_SCOPE,
                    "parse_failed",
                    Some(json!({ "game": game, "path": path.display().to_string(), "error": format!("{:#}", e) })),
                );
                return Err(e);
            }
        };
        all.insert(game, BasicGameStat::from_accounts(&record));
    }

    Ok(all)
}
