// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed record contract.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// One secondary-index entry a record materializes on write.
///
/// Entries without an `order` key keep insertion order within their view;
/// ordered views (timers by deadline) sort by `order`, then insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub view: String,
    pub composite: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,
}

impl IndexEntry {
    pub fn new(view: &str, composite: impl Into<String>) -> Self {
        Self { view: view.to_string(), composite: composite.into(), order: None }
    }

    pub fn ordered(view: &str, composite: impl Into<String>, order: u64) -> Self {
        Self { view: view.to_string(), composite: composite.into(), order: Some(order) }
    }
}

/// A persistable record with a kind, a primary key, and index entries.
pub trait Record: Serialize + DeserializeOwned {
    /// Storage kind; full keys are `<KIND>:<key>`.
    const KIND: &'static str;

    /// Primary key within the kind.
    fn key(&self) -> String;

    /// Secondary-index entries, recomputed on every write.
    fn index_entries(&self) -> Vec<IndexEntry> {
        Vec::new()
    }
}

/// Full storage key for a record kind and id.
pub fn storage_key(kind: &str, id: &str) -> String {
    format!("{kind}:{id}")
}
