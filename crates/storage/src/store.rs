// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The embedded log-structured store.
//!
//! One append-only JSON-lines file holds every write; an in-memory map
//! plus materialized index views serve reads. Replay on open tolerates a
//! truncated final line (a crash mid-append) but nothing else.

use crate::error::StorageError;
use crate::event_log::EventLog;
use crate::record::{storage_key, IndexEntry, Record};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const LOG_FILE: &str = "store.log";

/// Rewrite the log once this many entries are dead (overwritten/deleted).
const COMPACT_DEAD_THRESHOLD: usize = 10_000;

/// One line of the store log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Put {
        key: String,
        doc: serde_json::Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        idx: Vec<IndexEntry>,
    },
    Del { key: String },
}

/// One primary key inside an index view, with its sort metadata.
#[derive(Debug, Clone)]
struct ViewEntry {
    /// Ordering key (deadline, version). Insertion-ordered views use 0.
    order: u64,
    /// Monotonic write sequence; ties within `order` keep insertion order.
    seq: u64,
    primary: String,
}

#[derive(Default)]
struct ViewMap {
    /// composite key → sorted entries
    buckets: IndexMap<String, Vec<ViewEntry>>,
}

impl ViewMap {
    fn insert(&mut self, composite: &str, entry: ViewEntry) {
        let bucket = self.buckets.entry(composite.to_string()).or_default();
        let pos = bucket
            .binary_search_by_key(&(entry.order, entry.seq), |e| (e.order, e.seq))
            .unwrap_or_else(|p| p);
        bucket.insert(pos, entry);
    }

    fn remove(&mut self, composite: &str, primary: &str) {
        if let Some(bucket) = self.buckets.get_mut(composite) {
            bucket.retain(|e| e.primary != primary);
            if bucket.is_empty() {
                self.buckets.shift_remove(composite);
            }
        }
    }

    fn keys(&self, composite: &str) -> Vec<String> {
        self.buckets
            .get(composite)
            .map(|bucket| bucket.iter().map(|e| e.primary.clone()).collect())
            .unwrap_or_default()
    }
}

struct Inner {
    log: File,
    live: HashMap<String, serde_json::Value>,
    views: HashMap<String, ViewMap>,
    /// full key → index entries currently materialized for it
    key_entries: HashMap<String, Vec<IndexEntry>>,
    seq: u64,
    dead: usize,
}

impl Inner {
    fn apply_put(&mut self, key: &str, doc: serde_json::Value, idx: Vec<IndexEntry>) {
        self.seq += 1;
        if self.live.contains_key(key) {
            self.dead += 1;
            self.unindex(key);
        }
        for entry in &idx {
            self.views.entry(entry.view.clone()).or_default().insert(
                &entry.composite,
                ViewEntry {
                    order: entry.order.unwrap_or(0),
                    seq: self.seq,
                    primary: key.to_string(),
                },
            );
        }
        self.key_entries.insert(key.to_string(), idx);
        self.live.insert(key.to_string(), doc);
    }

    fn apply_del(&mut self, key: &str) -> bool {
        self.seq += 1;
        self.unindex(key);
        self.key_entries.remove(key);
        let existed = self.live.remove(key).is_some();
        if existed {
            self.dead += 1;
        }
        existed
    }

    fn unindex(&mut self, key: &str) {
        if let Some(entries) = self.key_entries.get(key) {
            for entry in entries.clone() {
                if let Some(view) = self.views.get_mut(&entry.view) {
                    view.remove(&entry.composite, key);
                }
            }
        }
    }

    fn write_line(&mut self, entry: &LogEntry) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.log.write_all(&line)?;
        // fsync-acknowledged: the caller never observes an unsynced write.
        self.log.sync_data()?;
        Ok(())
    }
}

/// Typed key/value store with materialized secondary indexes.
pub struct Store {
    inner: Mutex<Inner>,
    events: EventLog,
    dir: PathBuf,
}

impl Store {
    /// Open (or create) a store in the given directory, replaying the log.
    pub fn open(dir: &Path) -> Result<Store, StorageError> {
        std::fs::create_dir_all(dir)?;
        let log_path = dir.join(LOG_FILE);

        let mut inner = Inner {
            log: OpenOptions::new().create(true).append(true).open(&log_path)?,
            live: HashMap::new(),
            views: HashMap::new(),
            key_entries: HashMap::new(),
            seq: 0,
            dead: 0,
        };

        let reader = BufReader::new(File::open(&log_path)?);
        let mut line_no = 0usize;
        for line in reader.lines() {
            line_no += 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(LogEntry::Put { key, doc, idx }) => inner.apply_put(&key, doc, idx),
                Ok(LogEntry::Del { key }) => {
                    inner.apply_del(&key);
                }
                Err(e) => {
                    // A torn final line means a crash mid-append; everything
                    // before it was fsynced and stands.
                    tracing::warn!(line = line_no, error = %e, "dropping torn store log tail");
                    break;
                }
            }
        }
        // Replay counts overwrites as dead entries; keep that tally so a
        // heavily-churned log compacts soon after reopen.

        let events = EventLog::open(dir)?;
        Ok(Store { inner: Mutex::new(inner), events, dir: dir.to_path_buf() })
    }

    /// Persist a record, replacing any previous version under its key.
    pub fn put<T: Record>(&self, value: &T) -> Result<(), StorageError> {
        let key = storage_key(T::KIND, &value.key());
        let doc = serde_json::to_value(value)?;
        let idx = value.index_entries();

        let mut inner = self.inner.lock();
        inner.write_line(&LogEntry::Put {
            key: key.clone(),
            doc: doc.clone(),
            idx: idx.clone(),
        })?;
        inner.apply_put(&key, doc, idx);

        if inner.dead >= COMPACT_DEAD_THRESHOLD {
            self.compact_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Load a record by primary key.
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StorageError> {
        let key = storage_key(T::KIND, id);
        let inner = self.inner.lock();
        match inner.live.get(&key) {
            Some(doc) => Ok(Some(serde_json::from_value(doc.clone())?)),
            None => Ok(None),
        }
    }

    /// Delete a record by primary key. Returns whether it existed.
    pub fn delete<T: Record>(&self, id: &str) -> Result<bool, StorageError> {
        let key = storage_key(T::KIND, id);
        let mut inner = self.inner.lock();
        inner.write_line(&LogEntry::Del { key: key.clone() })?;
        Ok(inner.apply_del(&key))
    }

    /// Load all records in a view bucket, in view order.
    pub fn load_by_index<T: Record>(
        &self,
        view: &str,
        composite: &str,
    ) -> Result<Vec<T>, StorageError> {
        let inner = self.inner.lock();
        let keys = match inner.views.get(view) {
            Some(v) => v.keys(composite),
            None => Vec::new(),
        };
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(doc) = inner.live.get(&key) {
                out.push(serde_json::from_value(doc.clone())?);
            }
        }
        Ok(out)
    }

    /// Primary keys in a view bucket, in view order.
    pub fn keys_by_index(&self, view: &str, composite: &str) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .views
            .get(view)
            .map(|v| v.keys(composite))
            .unwrap_or_default()
    }

    /// Number of live records of a kind. O(keyspace); for stats only.
    pub fn count_kind(&self, kind: &str) -> usize {
        let prefix = format!("{kind}:");
        let inner = self.inner.lock();
        inner.live.keys().filter(|k| k.starts_with(&prefix)).count()
    }

    /// Append a lifecycle event; returns its sequence number.
    pub fn append_event(
        &self,
        event: &weir_core::LifecycleEvent,
    ) -> Result<u64, StorageError> {
        self.events.append(event)
    }

    /// Lifecycle events with sequence numbers greater than `after_seq`.
    pub fn events_since(
        &self,
        after_seq: u64,
    ) -> Vec<(u64, weir_core::LifecycleEvent)> {
        self.events.since(after_seq)
    }

    /// Rewrite the log to contain only the live set.
    pub fn compact(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        self.compact_locked(&mut inner)
    }

    fn compact_locked(&self, inner: &mut Inner) -> Result<(), StorageError> {
        let log_path = self.dir.join(LOG_FILE);
        let tmp_path = self.dir.join(format!("{LOG_FILE}.tmp"));

        {
            let mut tmp = File::create(&tmp_path)?;
            for (key, doc) in &inner.live {
                let idx = inner.key_entries.get(key).cloned().unwrap_or_default();
                let entry = LogEntry::Put { key: key.clone(), doc: doc.clone(), idx };
                let mut line = serde_json::to_vec(&entry)?;
                line.push(b'\n');
                tmp.write_all(&line)?;
            }
            tmp.sync_data()?;
        }
        std::fs::rename(&tmp_path, &log_path)?;

        inner.log = OpenOptions::new().append(true).open(&log_path)?;
        let reclaimed = inner.dead;
        inner.dead = 0;
        tracing::info!(reclaimed, live = inner.live.len(), "compacted store log");
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
