use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

const LOG_FILE_NAME: &str = "usage_stats.log.jsonl";
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const MAX_ROTATIONS: usize = 3;
const DEFAULT_TAIL_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppLogRecord {
    pub ts_ms: i64,
    pub level: String,
    pub scope: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl AppLogRecord {
    pub fn new(level: &str, scope: &str, message: &str, data: Option<Value>) -> Self {
        Self {
            ts_ms: Utc::now().timestamp_millis(),
            level: level.to_string(),
            scope: scope.to_string(),
            message: message.to_string(),
            data,
        }
    }
}

/// JSON-lines diagnostic log. Every record is also emitted through `tracing`; without a
/// directory the `tracing` side is all that happens.
#[derive(Debug, Default)]
pub struct AppLog {
    dir: Option<PathBuf>,
    lock: Mutex<()>,
}

fn log_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE_NAME)
}

fn rotated_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("usage_stats.log.{}.jsonl", index))
}

/// Generations from oldest to newest, the live file last.
fn generations(dir: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    (1..=MAX_ROTATIONS)
        .rev()
        .map(move |i| rotated_path(dir, i))
        .chain(std::iter::once(log_path(dir)))
}

// Shifts `.N` to `.N+1` from the oldest down; whatever lands past the last generation is
// deleted.
fn rotate_if_needed(dir: &Path) -> Result<(), String> {
    let live = log_path(dir);
    match fs::metadata(&live) {
        Ok(meta) if meta.len() >= MAX_LOG_BYTES => {}
        _ => return Ok(()),
    }

    let paths: Vec<PathBuf> = generations(dir).collect();
    let (oldest, rest) = paths.split_first().ok_or_else(|| "no log generations".to_string())?;
    if oldest.exists() {
        fs::remove_file(oldest).map_err(|e| format!("Failed to drop {}: {}", oldest.display(), e))?;
    }
    for (dst, src) in paths.iter().zip(rest) {
        if src.exists() {
            fs::rename(src, dst).map_err(|e| format!("Failed to shift {}: {}", src.display(), e))?;
        }
    }
    Ok(())
}

/// The last `max_bytes` of `path`, starting at a line boundary. Invalid UTF-8 is replaced,
/// since the cut can land inside a multi-byte character.
fn read_tail(path: &Path, max_bytes: u64) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    let size = file.metadata().map_err(|e| format!("Failed to stat {}: {}", path.display(), e))?.len();

    let start = size.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start))
        .map_err(|e| format!("Failed to seek {}: {}", path.display(), e))?;
    let mut bytes = Vec::with_capacity((size - start) as usize);
    file.read_to_end(&mut bytes)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let body = if start == 0 {
        &bytes[..]
    } else {
        match bytes.iter().position(|&b| b == b'\n') {
            Some(idx) => &bytes[idx + 1..],
            None => &[],
        }
    };
    Ok(String::from_utf8_lossy(body).into_owned())
}

fn matches_query(rec: &AppLogRecord, query: Option<&str>) -> bool {
    let Some(q) = query else {
        return true;
    };
    [&rec.level, &rec.scope, &rec.message]
        .iter()
        .any(|field| field.to_lowercase().contains(q))
}

fn mirror_to_tracing(record: &AppLogRecord) {
    let data = record.data.as_ref().map(|v| v.to_string()).unwrap_or_default();
    match record.level.as_str() {
        "error" => tracing::error!(scope = %record.scope, data = %data, "{}", record.message),
        "warn" => tracing::warn!(scope = %record.scope, data = %data, "{}", record.message),
        "debug" => tracing::debug!(scope = %record.scope, data = %data, "{}", record.message),
        _ => tracing::info!(scope = %record.scope, data = %data, "{}", record.message),
    }
}

impl AppLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            lock: Mutex::new(()),
        }
    }

    /// Only mirrors to `tracing`.
    pub fn tracing_only() -> Self {
        Self::default()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn append(&self, record: AppLogRecord) -> Result<(), String> {
        mirror_to_tracing(&record);

        let Some(dir) = self.dir.as_deref() else {
            return Ok(());
        };

        let _guard = self.lock.lock();
        fs::create_dir_all(dir).map_err(|e| format!("Failed to create log dir: {}", e))?;
        rotate_if_needed(dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path(dir))
            .map_err(|e| format!("Failed to open log file: {}", e))?;

        let line = serde_json::to_string(&record).map_err(|e| format!("Failed to serialize log record: {}", e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| format!("Failed to write log record: {}", e))?;
        Ok(())
    }

    // Logging never fails the caller; a broken log file only loses the file copy.
    fn log(&self, level: &str, scope: &str, message: &str, data: Option<Value>) {
        let _ = self.append(AppLogRecord::new(level, scope, message, data));
    }

    pub fn info(&self, scope: &str, message: &str, data: Option<Value>) {
        self.log("info", scope, message, data);
    }

    pub fn warn(&self, scope: &str, message: &str, data: Option<Value>) {
        self.log("warn", scope, message, data);
    }

    pub fn error(&self, scope: &str, message: &str, data: Option<Value>) {
        self.log("error", scope, message, data);
    }

    /// Most recent records, oldest first, optionally filtered by a case-insensitive query
    /// on level, scope and message.
    pub fn read(&self, limit: usize, query: Option<&str>) -> Result<Vec<AppLogRecord>, String> {
        let Some(dir) = self.dir.as_deref() else {
            return Ok(Vec::new());
        };
        let query = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());

        let _guard = self.lock.lock();
        let mut records = Vec::new();
        for path in generations(dir).filter(|p| p.exists()) {
            let content = read_tail(&path, DEFAULT_TAIL_BYTES)?;
            records.extend(
                content
                    .lines()
                    .filter_map(|line| serde_json::from_str::<AppLogRecord>(line).ok())
                    .filter(|rec| matches_query(rec, query.as_deref())),
            );
        }

        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn records_are_appended_and_filtered() {
        let dir = TempDir::new().expect("temp dir");
        let log = AppLog::new(dir.path().join("logs"));

        log.info("stats/upload", "skipped", None);
        log.error("stats/game_records", "parse_failed", Some(json!({ "file": "Foo.json" })));

        let all = log.read(10, None).expect("read");
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].level, "error");
        assert_eq!(all[1].data.as_ref().and_then(|d| d["file"].as_str()), Some("Foo.json"));

        let only_upload = log.read(10, Some("UPLOAD")).expect("read");
        assert_eq!(only_upload.len(), 1);
        assert_eq!(only_upload[0].message, "skipped");

        let last = log.read(1, None).expect("read");
        assert_eq!(last[0].message, "parse_failed");
    }

    #[test]
    fn tracing_only_log_keeps_nothing_on_disk() {
        let log = AppLog::tracing_only();
        log.warn("stats/store", "save_failed", None);
        assert!(log.dir().is_none());
        assert!(log.read(10, None).expect("read").is_empty());
    }

    #[test]
    fn tail_cut_inside_a_multibyte_character_still_reads() {
        let dir = TempDir::new().expect("temp dir");
        let log = AppLog::new(dir.path());
        log.error("stats/game_records", "parse_failed", Some(json!({ "game": "Pokémon" })));
        log.error("stats/game_records", "parse_failed", Some(json!({ "game": "Café" })));

        let path = log_path(dir.path());
        let bytes = fs::read(&path).expect("read");
        let first_e = bytes.iter().position(|&b| b == 0xC3).expect("multi-byte char");
        let max = bytes.len() as u64 - (first_e as u64 + 1);

        let tail = read_tail(&path, max).expect("tail");
        let records: Vec<AppLogRecord> = tail
            .lines()
            .map(|line| serde_json::from_str(line).expect("record"))
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data.as_ref().and_then(|d| d["game"].as_str()), Some("Café"));
    }

    #[test]
    fn large_log_is_rotated_and_still_readable() {
        let dir = TempDir::new().expect("temp dir");
        let log = AppLog::new(dir.path());
        fs::write(log_path(dir.path()), vec![b'x'; MAX_LOG_BYTES as usize]).expect("write");
        fs::write(rotated_path(dir.path(), MAX_ROTATIONS), b"oldest").expect("write");

        log.warn("stats/upload", "upload_failed", Some(json!({ "game": "Ōkami" })));

        assert_eq!(
            fs::metadata(rotated_path(dir.path(), 1)).expect("rotated").len(),
            MAX_LOG_BYTES
        );
        assert!(!rotated_path(dir.path(), 2).exists());
        assert!(!rotated_path(dir.path(), MAX_ROTATIONS).exists());

        let records = log.read(10, None).expect("read");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "upload_failed");
    }
}
