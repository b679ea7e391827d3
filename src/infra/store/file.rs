//! File-backed circuit store using JSON lines.
//!
//! Breaker records are small and change rarely, so every mutation rewrites
//! the whole file. Records are loaded once on construction; open circuits and
//! their reset deadlines survive a restart.

use std::collections::BTreeMap;
use std::fs::{create_dir_all, rename, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::circuit_breaker::CircuitRecord;
use crate::core::error::StoreError;
use crate::core::store::CircuitStore;

#[derive(Serialize, Deserialize)]
struct StoredCircuit {
    platform: String,
    record: CircuitRecord,
}

/// Durable [`CircuitStore`] persisting one JSON line per platform.
pub struct FileCircuitStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, CircuitRecord>>,
}

impl FileCircuitStore {
    /// Open (or create) `<dir>/<stream>.jsonl` and load its records.
    pub fn open(dir: impl AsRef<Path>, stream: &str) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        create_dir_all(dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let path = dir.join(format!("{stream}.jsonl"));
        let records = load_from_disk(&path)?;
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every record to a sibling temp file, then rename it over the
    /// backing file. A failed write leaves the previous file intact.
    fn rewrite_disk(&self, records: &BTreeMap<String, CircuitRecord>) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("jsonl.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        for (platform, record) in records {
            let line = serde_json::to_string(&StoredCircuit {
                platform: platform.clone(),
                record: record.clone(),
            })
            .map_err(|e| StoreError::Codec(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| StoreError::Io(e.to_string()))?;
        }
        file.sync_all().map_err(|e| StoreError::Io(e.to_string()))?;
        rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))
    }
}

fn load_from_disk(path: &Path) -> Result<BTreeMap<String, CircuitRecord>, StoreError> {
    let mut records = BTreeMap::new();
    if !path.exists() {
        return Ok(records);
    }
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| StoreError::Io(e.to_string()))?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| StoreError::Io(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredCircuit =
            serde_json::from_str(&line).map_err(|e| StoreError::Codec(e.to_string()))?;
        records.insert(stored.platform, stored.record);
    }
    Ok(records)
}

impl CircuitStore for FileCircuitStore {
    fn load(&self, platform: &str) -> Result<Option<CircuitRecord>, StoreError> {
        Ok(self.records.lock().get(platform).cloned())
    }

    fn modify(
        &self,
        platform: &str,
        init: CircuitRecord,
        update: &mut dyn FnMut(&mut CircuitRecord),
    ) -> Result<CircuitRecord, StoreError> {
        let mut records = self.records.lock();
        let current = records.get(platform).cloned();
        let mut candidate = current.clone().unwrap_or(init);
        update(&mut candidate);
        if current.as_ref() == Some(&candidate) {
            return Ok(candidate);
        }

        let mut next = records.clone();
        next.insert(platform.to_string(), candidate.clone());
        self.rewrite_disk(&next)?;
        *records = next;
        Ok(candidate)
    }

    fn platforms(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}
