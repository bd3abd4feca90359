// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle timers: `R3/PT1S` fires exactly three times.

use crate::prelude::*;
use std::time::Duration;
use weir_core::VarMap;

#[test]
fn r3_cycle_fires_three_times_then_stops() {
    let h = harness();
    let timer_id = h
        .engine
        .create_timer("R3/PT1S", None, VarMap::new())
        .expect("create");

    for i in 1..=3 {
        h.clock.advance(Duration::from_secs(1));
        let fired = h.engine.fire_timers().expect("fire");
        assert_eq!(fired, 1, "firing {i}");
    }

    // Exhausted: no further firings, ever.
    h.clock.advance(Duration::from_secs(30));
    assert_eq!(h.engine.fire_timers().expect("fire"), 0);
    assert!(h.engine.get_timer_info(&timer_id).is_none());
}

#[test]
fn infinite_cycle_keeps_rescheduling() {
    let h = harness();
    h.engine
        .create_timer("R/PT1S", None, VarMap::new())
        .expect("create");

    for _ in 0..10 {
        h.clock.advance(Duration::from_secs(1));
        assert_eq!(h.engine.fire_timers().expect("fire"), 1);
    }
}

#[test]
fn duration_timer_fires_once() {
    let h = harness();
    let timer_id = h
        .engine
        .create_timer("PT2S", None, VarMap::new())
        .expect("create");
    let info = h.engine.get_timer_info(&timer_id).expect("info");
    assert_eq!(info.remaining_seconds, 2);

    h.clock.advance(Duration::from_secs(2));
    assert_eq!(h.engine.fire_timers().expect("fire"), 1);
    h.clock.advance(Duration::from_secs(60));
    assert_eq!(h.engine.fire_timers().expect("fire"), 0);
}

#[test]
fn cancelled_timer_never_fires() {
    let h = harness();
    let timer_id = h
        .engine
        .create_timer("PT5S", None, VarMap::new())
        .expect("create");
    assert!(h.engine.cancel_timer(&timer_id).expect("cancel"));

    h.clock.advance(Duration::from_secs(10));
    assert_eq!(h.engine.fire_timers().expect("fire"), 0);
}
