// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only lifecycle event log.
//!
//! Sequence numbers are monotonically increasing and assigned at append
//! time. The log is held in memory for `since` queries and persisted as
//! JSON lines under `events:` framing.

use crate::error::StorageError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use weir_core::LifecycleEvent;

const EVENTS_FILE: &str = "events.log";

#[derive(Debug, Serialize, Deserialize)]
struct EventLine {
    seq: u64,
    event: LifecycleEvent,
}

struct Inner {
    file: File,
    entries: Vec<(u64, LifecycleEvent)>,
    next_seq: u64,
}

/// Durable, append-only history of lifecycle transitions.
pub struct EventLog {
    inner: Mutex<Inner>,
}

impl EventLog {
    pub fn open(dir: &Path) -> Result<EventLog, StorageError> {
        let path = dir.join(EVENTS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut entries = Vec::new();
        let mut next_seq = 1u64;
        let reader = BufReader::new(File::open(&path)?);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventLine>(&line) {
                Ok(entry) => {
                    next_seq = entry.seq + 1;
                    entries.push((entry.seq, entry.event));
                }
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "dropping torn event log tail");
                    break;
                }
            }
        }

        Ok(EventLog { inner: Mutex::new(Inner { file, entries, next_seq }) })
    }

    /// Append an event; returns its assigned sequence number.
    pub fn append(&self, event: &LifecycleEvent) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        let mut line = serde_json::to_vec(&EventLine { seq, event: event.clone() })?;
        line.push(b'\n');
        inner.file.write_all(&line)?;
        inner.file.sync_data()?;
        inner.next_seq += 1;
        inner.entries.push((seq, event.clone()));
        tracing::debug!(seq, event = %event.log_summary(), "event appended");
        Ok(seq)
    }

    /// Events with sequence numbers strictly greater than `after_seq`.
    pub fn since(&self, after_seq: u64) -> Vec<(u64, LifecycleEvent)> {
        let inner = self.inner.lock();
        let start = inner.entries.partition_point(|(seq, _)| *seq <= after_seq);
        inner.entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
