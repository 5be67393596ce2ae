use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Durable storage for named structured records.
pub trait PersistenceGateway: Send + Sync {
    /// `Ok(None)` when nothing was stored under `name` yet.
    fn load(&self, name: &str) -> io::Result<Option<Value>>;
    fn save(&self, name: &str, record: &Value) -> io::Result<()>;

    /// Moves an unreadable record out of the way so a later `save` cannot replace it.
    fn quarantine(&self, name: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot set aside record {}", name),
        ))
    }
}

/// One pretty-printed `<name>.json` per record inside `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn quarantine_path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json.bad", name))
    }
}

impl PersistenceGateway for JsonFileStore {
    fn load(&self, name: &str) -> io::Result<Option<Value>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(value))
    }

    fn save(&self, name: &str, record: &Value) -> io::Result<()> {
        write_json_atomically(&self.path_for(name), record)
    }

    fn quarantine(&self, name: &str) -> io::Result<()> {
        let bad = self.quarantine_path_for(name);
        let _ = fs::remove_file(&bad);
        fs::rename(self.path_for(name), bad)
    }
}

pub fn write_json_atomically(path: &Path, value: &Value) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp)?;
    serde_json::to_writer_pretty(&mut file, value).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    file.write_all(b"\n")?;
    file.sync_all()?;

    let _ = fs::remove_file(path);
    fs::rename(tmp, path)?;
    Ok(())
}

/// Keeps records in memory only; useful when the host has no writable data directory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, Value>>,
    saves: Mutex<u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(name: &str, record: Value) -> Self {
        let store = Self::default();
        store.records.lock().insert(name.to_string(), record);
        store
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.records.lock().get(name).cloned()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> u64 {
        *self.saves.lock()
    }
}

impl PersistenceGateway for InMemoryStore {
    fn load(&self, name: &str) -> io::Result<Option<Value>> {
        Ok(self.get(name))
    }

    fn save(&self, name: &str, record: &Value) -> io::Result<()> {
        self.records.lock().insert(name.to_string(), record.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn quarantine(&self, name: &str) -> io::Result<()> {
        let mut records = self.records.lock();
        let record = records
            .remove(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no record {}", name)))?;
        records.insert(format!("{}.bad", name), record);
        Ok(())
    }
}
