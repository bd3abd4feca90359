// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable timer records for the timing wheel.

use crate::id::{TimerId, TokenId};
use crate::process::ElementId;
use crate::value::VarMap;
use serde::{Deserialize, Serialize};

/// What kind of schedule the timer follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerKind {
    /// Fire once after a relative delay (`PT5S`).
    Duration,
    /// Fire once at an absolute instant (RFC-3339).
    Date,
    /// Fire repeatedly (`R3/PT1S`); `repetitions = None` means forever.
    Cycle,
}

crate::simple_display! {
    TimerKind {
        Duration => "duration",
        Date => "date",
        Cycle => "cycle",
    }
}

/// What the timer is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerBinding {
    /// A token parked on an intermediate timer catch event.
    ProcessWait,
    /// A boundary event watching a running activity.
    Boundary,
    /// Not tied to a token (job retry backoff, API-created timers).
    Standalone,
}

crate::simple_display! {
    TimerBinding {
        ProcessWait => "process_wait",
        Boundary => "boundary",
        Standalone => "standalone",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStatus {
    Scheduled,
    Fired,
    Cancelled,
}

crate::simple_display! {
    TimerStatus {
        Scheduled => "scheduled",
        Fired => "fired",
        Cancelled => "cancelled",
    }
}

/// Durable state of one scheduled timer.
///
/// `wheel_level`/`slot_position` record the current bucket so restart
/// recovery can verify re-bucketing; they are advisory for reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub timer_id: TimerId,
    #[serde(default)]
    pub tenant_id: String,
    pub kind: TimerKind,
    /// The ISO-8601 text the timer was created from.
    pub original_spec: String,
    /// Absolute deadline in epoch milliseconds.
    pub fires_at_ms: u64,
    /// Remaining repetitions for cycles. `None` = infinite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<u32>,
    /// Cycle interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    pub binding: TimerBinding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "VarMap::is_empty")]
    pub metadata: VarMap,
    /// Component mailbox that receives the fire notification.
    pub callback_target: String,
    pub status: TimerStatus,
    #[serde(default)]
    pub wheel_level: u8,
    #[serde(default)]
    pub slot_position: u16,
}

impl TimerRecord {
    pub fn is_cycle(&self) -> bool {
        self.kind == TimerKind::Cycle
    }

    /// Advance a cycle timer past one firing: bump the deadline and burn a
    /// repetition. Returns false when the cycle is exhausted.
    pub fn advance_cycle(&mut self, now_ms: u64) -> bool {
        let Some(interval) = self.interval_ms else {
            return false;
        };
        match &mut self.repetitions {
            Some(0) => return false,
            Some(n) => {
                *n -= 1;
                if *n == 0 {
                    return false;
                }
            }
            None => {}
        }
        self.fires_at_ms = now_ms + interval;
        true
    }
}

crate::builder! {
    pub struct TimerRecordBuilder => TimerRecord {
        into {
            tenant_id: String = "",
            original_spec: String = "PT10S",
            callback_target: String = "interpreter",
        }
        set {
            timer_id: TimerId = TimerId::new("test-tmr1"),
            kind: TimerKind = TimerKind::Duration,
            fires_at_ms: u64 = 1_010_000,
            binding: TimerBinding = TimerBinding::ProcessWait,
            metadata: VarMap = VarMap::new(),
            status: TimerStatus = TimerStatus::Scheduled,
            wheel_level: u8 = 0,
            slot_position: u16 = 0,
        }
        option {
            repetitions: u32 = None,
            interval_ms: u64 = None,
            token_id: TokenId = None,
            element_id: ElementId = None,
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
