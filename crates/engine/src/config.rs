// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Everything is explicit construction-time state; there are no globals.
//! Tests swap individual values (usually the node prefix and intervals).

use std::time::Duration;

/// Timing wheel geometry.
#[derive(Debug, Clone)]
pub struct WheelConfig {
    /// Number of hierarchical levels.
    pub levels: usize,
    /// Slots per level.
    pub slots_per_level: usize,
    /// Tick of the bottom level.
    pub tick: Duration,
}

impl Default for WheelConfig {
    fn default() -> Self {
        // 4 levels × 60 slots at 1 s covers ~150 days.
        Self { levels: 4, slots_per_level: 60, tick: Duration::from_secs(1) }
    }
}

impl WheelConfig {
    /// Tick duration of the given level in milliseconds.
    pub fn tick_ms(&self, level: usize) -> u64 {
        let base = self.tick.as_millis() as u64;
        base * (self.slots_per_level as u64).pow(level as u32)
    }

    /// Time span one full revolution of the given level covers.
    pub fn coverage_ms(&self, level: usize) -> u64 {
        self.tick_ms(level) * self.slots_per_level as u64
    }

    /// The furthest deadline the wheel can hold.
    pub fn horizon_ms(&self) -> u64 {
        self.coverage_ms(self.levels - 1)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 4-character node prefix stamped into every generated identifier.
    pub node_prefix: String,
    /// Default tenant when a caller passes none.
    pub default_tenant: String,
    pub wheel: WheelConfig,
    /// Bounded mailbox depth per component.
    pub mailbox_capacity: usize,
    /// How often the broker returns expired activations to PENDING.
    pub activation_sweep_interval: Duration,
    /// How often expired buffered messages are removed.
    pub buffer_cleanup_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_prefix: "wk01".to_string(),
            default_tenant: String::new(),
            wheel: WheelConfig::default(),
            mailbox_capacity: 128,
            activation_sweep_interval: Duration::from_secs(5),
            buffer_cleanup_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
