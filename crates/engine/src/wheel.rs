// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchical timing wheel.
//!
//! Four levels of sixty slots each (by default); the bottom level ticks
//! once per second and each level above ticks once per full revolution of
//! the level below. A timer lives in exactly one slot of one level: the
//! lowest level whose coverage reaches its deadline. When a level wraps,
//! the next slot of the level above is pulled down and its timers are
//! re-bucketed by their absolute deadlines.
//!
//! Every schedule, cancel, and fire persists the timer record through the
//! storage facade before it is acknowledged; on restart `recover` reloads
//! all SCHEDULED timers, firing overdue ones in deadline order.

use crate::config::WheelConfig;
use crate::error::EngineError;
use std::collections::HashMap;
use std::sync::Arc;
use weir_core::{LifecycleEvent, TimerId, TimerRecord, TimerStatus};
use weir_storage::{views, Store};

/// Observability snapshot for one scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerInfo {
    pub level: u8,
    pub remaining_seconds: u64,
}

pub struct TimingWheel {
    config: WheelConfig,
    store: Arc<Store>,
    /// `slots[level][slot]` → timer ids in insertion order.
    slots: Vec<Vec<Vec<TimerId>>>,
    positions: HashMap<TimerId, (usize, usize)>,
    cursors: Vec<usize>,
    /// Epoch ms of the last processed bottom-level tick.
    last_tick_ms: u64,
}

impl TimingWheel {
    pub fn new(config: WheelConfig, store: Arc<Store>, now_ms: u64) -> Self {
        let slots = (0..config.levels)
            .map(|_| vec![Vec::new(); config.slots_per_level])
            .collect();
        let cursors = vec![0; config.levels];
        Self { config, store, slots, positions: HashMap::new(), cursors, last_tick_ms: now_ms }
    }

    /// Number of timers currently held in slots.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Persist and bucket a timer. The record must carry `fires_at_ms`.
    pub fn schedule(&mut self, mut record: TimerRecord) -> Result<(), EngineError> {
        let (level, slot) = self.placement(record.fires_at_ms);
        record.status = TimerStatus::Scheduled;
        record.wheel_level = level as u8;
        record.slot_position = slot as u16;

        // Durable before acknowledged.
        self.store.put(&record)?;
        self.store.append_event(&LifecycleEvent::TimerScheduled {
            timer_id: record.timer_id,
        })?;

        self.insert_at(record.timer_id, level, slot);
        tracing::debug!(
            timer = %record.timer_id,
            level,
            slot,
            fires_at = record.fires_at_ms,
            "timer scheduled"
        );
        Ok(())
    }

    /// Remove a timer from its slot and mark it cancelled.
    /// Unknown or already-fired timers return false.
    pub fn cancel(&mut self, timer_id: &TimerId) -> Result<bool, EngineError> {
        let Some((level, slot)) = self.positions.remove(timer_id) else {
            return Ok(false);
        };
        self.slots[level][slot].retain(|id| id != timer_id);

        if let Some(mut record) = self.store.get::<TimerRecord>(timer_id.as_str())? {
            record.status = TimerStatus::Cancelled;
            self.store.put(&record)?;
            self.store
                .append_event(&LifecycleEvent::TimerCancelled { timer_id: *timer_id })?;
        }
        Ok(true)
    }

    /// Advance the bottom wheel to `now_ms`, returning every firing in
    /// slot order. Cycle timers are rescheduled; the returned records are
    /// the state at fire time.
    pub fn fire(&mut self, now_ms: u64) -> Result<Vec<TimerRecord>, EngineError> {
        let tick = self.config.tick_ms(0);
        let mut fired = Vec::new();

        while self.last_tick_ms + tick <= now_ms {
            self.last_tick_ms += tick;
            self.advance_cursor(0)?;

            let cursor = self.cursors[0];
            let due: Vec<TimerId> = std::mem::take(&mut self.slots[0][cursor]);
            for timer_id in due {
                self.positions.remove(&timer_id);
                let Some(record) = self.store.get::<TimerRecord>(timer_id.as_str())? else {
                    continue;
                };
                if record.status != TimerStatus::Scheduled {
                    continue;
                }
                if record.fires_at_ms > self.last_tick_ms + tick {
                    // Pulled down early by a promotion; not due yet.
                    let (level, slot) = self.placement(record.fires_at_ms);
                    self.insert_at(timer_id, level, slot);
                    continue;
                }
                self.fire_one(record, &mut fired)?;
            }
        }
        Ok(fired)
    }

    /// Reload SCHEDULED timers after a restart. Overdue timers fire
    /// immediately (the view is deadline-ordered); future timers re-bucket.
    pub fn recover(&mut self, now_ms: u64) -> Result<Vec<TimerRecord>, EngineError> {
        let scheduled: Vec<TimerRecord> =
            self.store.load_by_index(views::TIMERS_BY_STATUS, "scheduled")?;
        let mut fired = Vec::new();
        for record in scheduled {
            if record.fires_at_ms <= now_ms {
                self.fire_one(record, &mut fired)?;
            } else {
                let (level, slot) = self.placement(record.fires_at_ms);
                self.insert_at(record.timer_id, level, slot);
            }
        }
        if !fired.is_empty() {
            tracing::info!(count = fired.len(), "fired overdue timers during recovery");
        }
        Ok(fired)
    }

    /// Observability: where a timer sits and how long until it fires.
    pub fn timer_info(&self, timer_id: &TimerId, now_ms: u64) -> Option<TimerInfo> {
        let (level, _) = self.positions.get(timer_id)?;
        let record = self.store.get::<TimerRecord>(timer_id.as_str()).ok()??;
        Some(TimerInfo {
            level: *level as u8,
            remaining_seconds: record.fires_at_ms.saturating_sub(now_ms) / 1_000,
        })
    }

    fn fire_one(
        &mut self,
        mut record: TimerRecord,
        fired: &mut Vec<TimerRecord>,
    ) -> Result<(), EngineError> {
        let snapshot = record.clone();
        let now = self.last_tick_ms;

        if record.is_cycle() && record.advance_cycle(now) {
            // Cycle continues: keep SCHEDULED at the new deadline.
            let (level, slot) = self.placement(record.fires_at_ms);
            record.wheel_level = level as u8;
            record.slot_position = slot as u16;
            self.store.put(&record)?;
            self.insert_at(record.timer_id, level, slot);
        } else {
            record.status = TimerStatus::Fired;
            self.store.put(&record)?;
        }
        self.store
            .append_event(&LifecycleEvent::TimerFired { timer_id: record.timer_id })?;
        tracing::debug!(timer = %record.timer_id, "timer fired");
        fired.push(snapshot);
        Ok(())
    }

    /// Advance a level's cursor; a wrap pulls the next slot of the level
    /// above down into the wheel.
    fn advance_cursor(&mut self, level: usize) -> Result<(), EngineError> {
        self.cursors[level] = (self.cursors[level] + 1) % self.config.slots_per_level;
        if self.cursors[level] == 0 && level + 1 < self.config.levels {
            self.advance_cursor(level + 1)?;
            let upper = level + 1;
            let upper_cursor = self.cursors[upper];
            let due: Vec<TimerId> = std::mem::take(&mut self.slots[upper][upper_cursor]);
            for timer_id in due {
                self.positions.remove(&timer_id);
                if let Some(record) = self.store.get::<TimerRecord>(timer_id.as_str())? {
                    if record.fires_at_ms <= self.last_tick_ms {
                        // Due in the tick being processed: land in the slot
                        // the fire loop is about to drain.
                        self.insert_at(timer_id, 0, self.cursors[0]);
                    } else {
                        let (new_level, new_slot) = self.placement(record.fires_at_ms);
                        self.insert_at(timer_id, new_level, new_slot);
                    }
                }
            }
        }
        Ok(())
    }

    /// Lowest level whose coverage reaches the deadline, and the slot
    /// within it. Deadlines beyond the horizon clamp into the top level.
    fn placement(&self, fires_at_ms: u64) -> (usize, usize) {
        let delay = fires_at_ms.saturating_sub(self.last_tick_ms);
        let slots = self.config.slots_per_level;

        for level in 0..self.config.levels {
            if delay < self.config.coverage_ms(level) || level == self.config.levels - 1 {
                let ticks = (delay / self.config.tick_ms(level)).max(1) as usize;
                let ticks = ticks.min(slots - 1).max(1);
                let slot = (self.cursors[level] + ticks) % slots;
                return (level, slot);
            }
        }
        unreachable!("placement always returns within the level loop");
    }

    fn insert_at(&mut self, timer_id: TimerId, level: usize, slot: usize) {
        self.slots[level][slot].push(timer_id);
        self.positions.insert(timer_id, (level, slot));
    }
}

#[cfg(test)]
#[path = "wheel_tests.rs"]
mod tests;
