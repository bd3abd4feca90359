// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;
use weir_core::{TimerKind, TimerRecord};

const T0: u64 = 1_000_000;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<Store>,
    wheel: TimingWheel,
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).unwrap());
    let wheel = TimingWheel::new(WheelConfig::default(), Arc::clone(&store), T0);
    Fixture { _dir: dir, store, wheel }
}

fn timer(id: &str, fires_at_ms: u64) -> TimerRecord {
    let mut t = TimerRecord::builder().build();
    t.timer_id = TimerId::new(id);
    t.fires_at_ms = fires_at_ms;
    t
}

fn cycle_timer(id: &str, fires_at_ms: u64, reps: Option<u32>, interval_ms: u64) -> TimerRecord {
    let mut t = timer(id, fires_at_ms);
    t.kind = TimerKind::Cycle;
    t.repetitions = reps;
    t.interval_ms = Some(interval_ms);
    t
}

#[test]
fn timer_fires_at_exact_slot_boundary() {
    let mut f = fixture();
    f.wheel.schedule(timer("wk01-t1", T0 + 2_000)).unwrap();

    assert!(f.wheel.fire(T0 + 1_000).unwrap().is_empty());
    let fired = f.wheel.fire(T0 + 2_000).unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].timer_id, "wk01-t1");

    let stored: TimerRecord = f.store.get("wk01-t1").unwrap().unwrap();
    assert_eq!(stored.status, TimerStatus::Fired);
}

#[test]
fn sub_tick_delay_fires_on_next_tick() {
    let mut f = fixture();
    f.wheel.schedule(timer("wk01-t1", T0 + 300)).unwrap();
    let fired = f.wheel.fire(T0 + 1_000).unwrap();
    assert_eq!(fired.len(), 1);
}

#[test]
fn cancel_prevents_firing() {
    let mut f = fixture();
    f.wheel.schedule(timer("wk01-t1", T0 + 5_000)).unwrap();
    assert!(f.wheel.cancel(&TimerId::new("wk01-t1")).unwrap());

    assert!(f.wheel.fire(T0 + 10_000).unwrap().is_empty());
    let stored: TimerRecord = f.store.get("wk01-t1").unwrap().unwrap();
    assert_eq!(stored.status, TimerStatus::Cancelled);
    // Cancelling again reports not-found.
    assert!(!f.wheel.cancel(&TimerId::new("wk01-t1")).unwrap());
}

#[test]
fn slot_order_is_insertion_order() {
    let mut f = fixture();
    f.wheel.schedule(timer("wk01-t1", T0 + 3_000)).unwrap();
    f.wheel.schedule(timer("wk01-t2", T0 + 3_000)).unwrap();
    f.wheel.schedule(timer("wk01-t3", T0 + 3_000)).unwrap();

    let fired = f.wheel.fire(T0 + 3_000).unwrap();
    let ids: Vec<&str> = fired.iter().map(|t| t.timer_id.as_str()).collect();
    assert_eq!(ids, vec!["wk01-t1", "wk01-t2", "wk01-t3"]);
}

#[test]
fn long_delay_lands_in_upper_level_and_still_fires() {
    let mut f = fixture();
    // 5 minutes is beyond level 0 coverage (60 s): level 1.
    f.wheel.schedule(timer("wk01-t1", T0 + 300_000)).unwrap();
    let info = f.wheel.timer_info(&TimerId::new("wk01-t1"), T0).unwrap();
    assert_eq!(info.level, 1);
    assert_eq!(info.remaining_seconds, 300);

    // Nothing before the deadline.
    assert!(f.wheel.fire(T0 + 299_000).unwrap().is_empty());
    let fired = f.wheel.fire(T0 + 300_000).unwrap();
    assert_eq!(fired.len(), 1);
}

#[test]
fn promotion_rebuckets_into_lower_level() {
    let mut f = fixture();
    // 90 s: level 1 initially, promoted into level 0 after the first wrap.
    f.wheel.schedule(timer("wk01-t1", T0 + 90_000)).unwrap();
    assert_eq!(
        f.wheel.timer_info(&TimerId::new("wk01-t1"), T0).unwrap().level,
        1
    );

    assert!(f.wheel.fire(T0 + 60_000).unwrap().is_empty());
    // After the wrap the timer sits in level 0.
    assert_eq!(
        f.wheel.timer_info(&TimerId::new("wk01-t1"), T0 + 60_000).unwrap().level,
        0
    );
    let fired = f.wheel.fire(T0 + 90_000).unwrap();
    assert_eq!(fired.len(), 1);
}

#[test]
fn cycle_fires_n_times_then_stops() {
    let mut f = fixture();
    // R3/PT1S starting at T0.
    f.wheel
        .schedule(cycle_timer("wk01-c1", T0 + 1_000, Some(3), 1_000))
        .unwrap();

    assert_eq!(f.wheel.fire(T0 + 1_000).unwrap().len(), 1);
    assert_eq!(f.wheel.fire(T0 + 2_000).unwrap().len(), 1);
    assert_eq!(f.wheel.fire(T0 + 3_000).unwrap().len(), 1);
    // Exhausted: no further firings.
    assert!(f.wheel.fire(T0 + 10_000).unwrap().is_empty());

    let stored: TimerRecord = f.store.get("wk01-c1").unwrap().unwrap();
    assert_eq!(stored.status, TimerStatus::Fired);
}

#[test]
fn infinite_cycle_keeps_firing() {
    let mut f = fixture();
    f.wheel
        .schedule(cycle_timer("wk01-c1", T0 + 1_000, None, 1_000))
        .unwrap();

    for i in 1..=5u64 {
        let fired = f.wheel.fire(T0 + i * 1_000).unwrap();
        assert_eq!(fired.len(), 1, "tick {i}");
    }
    let stored: TimerRecord = f.store.get("wk01-c1").unwrap().unwrap();
    assert_eq!(stored.status, TimerStatus::Scheduled);
}

#[test]
fn one_fire_call_crossing_many_slots_catches_up() {
    let mut f = fixture();
    f.wheel.schedule(timer("wk01-t1", T0 + 2_000)).unwrap();
    f.wheel.schedule(timer("wk01-t2", T0 + 7_000)).unwrap();

    let fired = f.wheel.fire(T0 + 10_000).unwrap();
    let ids: Vec<&str> = fired.iter().map(|t| t.timer_id.as_str()).collect();
    assert_eq!(ids, vec!["wk01-t1", "wk01-t2"]);
}

#[test]
fn recovery_fires_overdue_in_deadline_order() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path()).unwrap());
    {
        let mut wheel = TimingWheel::new(WheelConfig::default(), Arc::clone(&store), T0);
        wheel.schedule(timer("wk01-late", T0 + 5_000)).unwrap();
        wheel.schedule(timer("wk01-early", T0 + 1_000)).unwrap();
        wheel.schedule(timer("wk01-future", T0 + 600_000)).unwrap();
    }

    // Restart well past two deadlines.
    let mut wheel = TimingWheel::new(WheelConfig::default(), Arc::clone(&store), T0 + 10_000);
    let fired = wheel.recover(T0 + 10_000).unwrap();
    let ids: Vec<&str> = fired.iter().map(|t| t.timer_id.as_str()).collect();
    assert_eq!(ids, vec!["wk01-early", "wk01-late"]);

    // The future timer is re-bucketed, not fired.
    assert_eq!(wheel.len(), 1);
    let fired = wheel.fire(T0 + 600_000).unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].timer_id, "wk01-future");
}

#[test]
fn timer_info_reports_absence() {
    let f = fixture();
    assert!(f.wheel.timer_info(&TimerId::new("wk01-x"), T0).is_none());
}
