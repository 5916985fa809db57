//! Append-only line-delimited JSON overflow log, bounded by byte budget,
//! with atomic rename-based handoff on recovery.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::event::Event;

/// Interval between periodic disk-recovery probes.
pub const DISK_RECOVERY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

pub struct DiskStore {
    path: PathBuf,
    max_storage_bytes: u64,
}

impl DiskStore {
    pub fn new(path: PathBuf, max_storage_bytes: u64) -> DiskStore {
        DiskStore { path, max_storage_bytes }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn recovering_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".recovering");
        PathBuf::from(p)
    }

    /// Appends one line: the JSON array serialization of `batch`. Drops
    /// the write (returning `Err(StorageFull)`) if the file is already at
    /// or over `max_storage_bytes`.
    pub fn append_batch(&self, batch: &[Event]) -> Result<(), DiskError> {
        if let Ok(metadata) = fs::metadata(&self.path) {
            if metadata.len() >= self.max_storage_bytes {
                return Err(DiskError::StorageFull);
            }
        }

        let mut line = serde_json::to_vec(batch).map_err(|e| DiskError::Io(e.to_string()))?;
        line.push(b'\n');

        let mut file = open_append(&self.path).map_err(|e| DiskError::Io(e.to_string()))?;
        file.write_all(&line).map_err(|e| DiskError::Io(e.to_string()))?;
        Ok(())
    }

    /// Reads events to recover on startup or periodic recovery.
    ///
    /// Probes `<path>.recovering` then `<path>`, in that order. The first
    /// one that exists is read line by line: each line is JSON-parsed;
    /// arrays are spread into individual events, bare mappings are
    /// appended as-is, and malformed lines are skipped. Stops loading once
    /// `max_buffer_size` events have been collected.
    ///
    /// If the data came from the live path, it is atomically renamed to
    /// `.recovering` afterward so a crash between rename and the next
    /// successful flush re-loads the same events (at-least-once).
    pub fn recover(&self, max_buffer_size: usize) -> Vec<Event> {
        let recovering = self.recovering_path();

        if recovering.exists() {
            return read_jsonl(&recovering, max_buffer_size);
        }

        if !self.path.exists() {
            return Vec::new();
        }

        let events = read_jsonl(&self.path, max_buffer_size);

        match fs::rename(&self.path, &recovering) {
            Ok(()) => {}
            Err(_) => {
                let _ = fs::remove_file(&self.path);
            }
        }

        events
    }

    /// The path a caller should remember as "the recovery file in flight"
    /// after a successful `recover()` call from the live path.
    pub fn recovering_path_if_present(&self) -> Option<PathBuf> {
        let recovering = self.recovering_path();
        if recovering.exists() {
            Some(recovering)
        } else {
            None
        }
    }

    /// Unlinks the `.recovering` file after a flush that included its
    /// events has succeeded.
    pub fn clear_recovering(&self, recovering_path: &Path) {
        let _ = fs::remove_file(recovering_path);
    }
}

#[cfg(unix)]
fn open_append(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new().create(true).append(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn read_jsonl(path: &Path, max_buffer_size: usize) -> Vec<Event> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };

    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(serde_json::Value::Array(items)) => {
                for item in items {
                    if let serde_json::Value::Object(map) = item {
                        events.push(map);
                        if events.len() >= max_buffer_size {
                            return events;
                        }
                    }
                }
            }
            Ok(serde_json::Value::Object(map)) => {
                events.push(map);
                if events.len() >= max_buffer_size {
                    return events;
                }
            }
            _ => continue,
        }
    }
    events
}

/// Default overflow path: `<tmpdir>/peekapi-events-<12 hex chars of SHA-256(endpoint)>.jsonl`.
pub fn default_storage_path(endpoint: &str) -> PathBuf {
    let digest = Sha256::digest(endpoint.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    let mut path = std::env::temp_dir();
    path.push(format!("peekapi-events-{}.jsonl", &hex[..12]));
    path
}

#[derive(Debug)]
pub enum DiskError {
    StorageFull,
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn event(n: u32) -> Event {
        match json!({"n": n}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn append_and_recover_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let store = DiskStore::new(path.clone(), 5 * 1024 * 1024);

        store.append_batch(&[event(1), event(2)]).unwrap();
        store.append_batch(&[event(3)]).unwrap();

        let recovered = store.recover(100);
        assert_eq!(recovered.len(), 3);
        assert_eq!(recovered[0]["n"], 1);
        assert_eq!(recovered[2]["n"], 3);

        // Live file was renamed away.
        assert!(!path.exists());
        assert!(store.recovering_path_if_present().is_some());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        fs::write(&path, "not json\n[{\"n\":1}]\n").unwrap();

        let store = DiskStore::new(path, 5 * 1024 * 1024);
        let recovered = store.recover(100);
        assert_eq!(recovered.len(), 1);
    }

    #[test]
    fn storage_full_drops_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let store = DiskStore::new(path.clone(), 4);
        fs::write(&path, "1234").unwrap();

        let result = store.append_batch(&[event(1)]);
        assert!(matches!(result, Err(DiskError::StorageFull)));
    }

    #[test]
    fn default_storage_path_is_deterministic() {
        let a = default_storage_path("https://example.com/ingest");
        let b = default_storage_path("https://example.com/ingest");
        assert_eq!(a, b);
    }
}
