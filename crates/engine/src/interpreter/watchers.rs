// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interpreter bookkeeping records.
//!
//! Watcher sets tie boundary events and event-gateway branches to the
//! token that armed them; fork counts carry the dynamic expected count of
//! inclusive joins; the compensation log remembers completed activities
//! with compensation handlers.

use serde::{Deserialize, Serialize};
use weir_core::{ElementId, InstanceId, SubscriptionId, TimerId, TokenId, VarMap};
use weir_storage::{IndexEntry, Record};

/// One armed watcher: a timer or a subscription, and the event element it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watcher {
    pub element: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_id: Option<TimerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    /// Whether firing cancels the host (boundary `cancelActivity`).
    #[serde(default)]
    pub interrupting: bool,
}

/// All watchers a token currently has armed (boundary events of its
/// running activity, or the branches of an event-based gateway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherSet {
    pub token_id: TokenId,
    /// The activity or event gateway the watchers guard.
    pub host_element: ElementId,
    pub watchers: Vec<Watcher>,
}

impl WatcherSet {
    pub fn by_timer(&self, timer_id: &TimerId) -> Option<&Watcher> {
        self.watchers.iter().find(|w| w.timer_id.as_ref() == Some(timer_id))
    }

    pub fn by_subscription(&self, id: &SubscriptionId) -> Option<&Watcher> {
        self.watchers.iter().find(|w| w.subscription_id.as_ref() == Some(id))
    }
}

impl Record for WatcherSet {
    const KIND: &'static str = "watchers";

    fn key(&self) -> String {
        self.token_id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        Vec::new()
    }
}

/// Expected arrival count for an inclusive join, written by the fork.
/// Keyed by `(instance, token family)`: one fork in flight per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkCount {
    pub process_instance_id: InstanceId,
    pub family: TokenId,
    pub expected: usize,
}

impl ForkCount {
    pub fn storage_id(instance: &InstanceId, family: &TokenId) -> String {
        format!("{instance}:{family}")
    }
}

impl Record for ForkCount {
    const KIND: &'static str = "fork_count";

    fn key(&self) -> String {
        Self::storage_id(&self.process_instance_id, &self.family)
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        Vec::new()
    }
}

/// A completed activity whose compensation handler may still run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationEntry {
    pub activity: ElementId,
    /// The handler element a compensation throw starts a token on.
    pub handler: ElementId,
    /// Token variables captured at completion time.
    pub variables: VarMap,
}

/// Per-instance log of compensable completions, run in reverse order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationLog {
    pub process_instance_id: InstanceId,
    pub entries: Vec<CompensationEntry>,
}

impl Record for CompensationLog {
    const KIND: &'static str = "compensation";

    fn key(&self) -> String {
        self.process_instance_id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        Vec::new()
    }
}
