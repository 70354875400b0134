// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed storage: one JSON key/value map with atomic writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::storage::{Storage, StorageError};

/// JSON-file key/value store.
///
/// The whole map is cached in memory and rewritten on every mutation.
/// An optional byte quota bounds the serialized size, modeling the
/// browser storage limit the web client runs against.
pub struct FileStore {
    path: PathBuf,
    quota: Option<usize>,
    map: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl Into<PathBuf>, quota: Option<usize>) -> anyhow::Result<Self> {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, quota, map: Mutex::new(map) })
    }

    fn flush(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string(map).map_err(|e| StorageError::Io(e.to_string()))?;
        if let Some(quota) = self.quota {
            if json.len() > quota {
                return Err(StorageError::QuotaExceeded { needed: json.len(), quota });
            }
        }
        write_atomic(&self.path, &json).map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl Storage for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        let prev = map.insert(key.to_owned(), value.to_owned());
        if let Err(e) = self.flush(&map) {
            // Keep memory and disk consistent: roll the entry back.
            match prev {
                Some(p) => map.insert(key.to_owned(), p),
                None => map.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut map = self.map.lock();
        if map.remove(key).is_some() {
            if let Err(e) = self.flush(&map) {
                tracing::warn!(key, err = %e, "failed to persist key removal");
            }
        }
    }
}

/// Write a file atomically (unique temp name + rename).
///
/// The temp name includes PID and a counter so concurrent writers cannot
/// corrupt each other's half-written files.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
