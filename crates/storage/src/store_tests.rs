// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::views;
use tempfile::tempdir;
use weir_core::{
    InstanceId, Job, JobState, TimerRecord, TimerStatus, Token, TokenId, TokenState,
};

fn token(id: &str, instance: &str, state: TokenState) -> Token {
    Token::builder()
        .token_id(TokenId::new(id))
        .process_instance_id(InstanceId::new(instance))
        .state(state)
        .build()
}

#[test]
fn put_get_roundtrip() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let t = token("wk01-t1", "wk01-i1", TokenState::Active);
    store.put(&t).unwrap();

    let loaded: Token = store.get("wk01-t1").unwrap().unwrap();
    assert_eq!(loaded, t);
}

#[test]
fn get_missing_is_none() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    assert!(store.get::<Token>("nope").unwrap().is_none());
}

#[test]
fn delete_removes_record_and_indexes() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let t = token("wk01-t1", "wk01-i1", TokenState::Active);
    store.put(&t).unwrap();
    assert!(store.delete::<Token>("wk01-t1").unwrap());

    assert!(store.get::<Token>("wk01-t1").unwrap().is_none());
    let by_instance: Vec<Token> =
        store.load_by_index(views::TOKENS_BY_INSTANCE, "wk01-i1").unwrap();
    assert!(by_instance.is_empty());
    // Double delete reports absence.
    assert!(!store.delete::<Token>("wk01-t1").unwrap());
}

#[test]
fn index_views_track_state_changes() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut t = token("wk01-t1", "wk01-i1", TokenState::Active);
    store.put(&t).unwrap();

    let active: Vec<Token> = store.load_by_index(views::TOKENS_BY_STATE, "active").unwrap();
    assert_eq!(active.len(), 1);

    t.complete(2_000_000);
    store.put(&t).unwrap();

    let active: Vec<Token> = store.load_by_index(views::TOKENS_BY_STATE, "active").unwrap();
    assert!(active.is_empty());
    let completed: Vec<Token> =
        store.load_by_index(views::TOKENS_BY_STATE, "completed").unwrap();
    assert_eq!(completed.len(), 1);
}

#[test]
fn insertion_order_within_view() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    for i in 1..=3 {
        store.put(&token(&format!("wk01-t{i}"), "wk01-i1", TokenState::Active)).unwrap();
    }

    let keys = store.keys_by_index(views::TOKENS_BY_INSTANCE, "wk01-i1");
    assert_eq!(keys, vec!["token:wk01-t1", "token:wk01-t2", "token:wk01-t3"]);
}

#[test]
fn timers_order_by_deadline_not_insertion() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut late = TimerRecord::builder().build();
    late.timer_id = weir_core::TimerId::new("wk01-late");
    late.fires_at_ms = 9_000_000;
    let mut early = TimerRecord::builder().build();
    early.timer_id = weir_core::TimerId::new("wk01-early");
    early.fires_at_ms = 1_000_000;

    store.put(&late).unwrap();
    store.put(&early).unwrap();

    let scheduled: Vec<TimerRecord> =
        store.load_by_index(views::TIMERS_BY_STATUS, "scheduled").unwrap();
    let ids: Vec<&str> = scheduled.iter().map(|t| t.timer_id.as_str()).collect();
    assert_eq!(ids, vec!["wk01-early", "wk01-late"]);
    assert_eq!(scheduled[0].status, TimerStatus::Scheduled);
}

#[test]
fn waiting_tokens_are_queryable_by_wait_source() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut t = token("wk01-t1", "wk01-i1", TokenState::Active);
    t.state = TokenState::Waiting;
    t.waiting_for = Some("job:wk01-j7".to_string());
    store.put(&t).unwrap();

    let waiting: Vec<Token> =
        store.load_by_index(views::TOKENS_BY_WAITING, "job:wk01-j7").unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].token_id, "wk01-t1");
}

#[test]
fn jobs_by_type_and_state() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut job = Job::builder().job_type("email").build();
    store.put(&job).unwrap();

    let pending: Vec<Job> =
        store.load_by_index(views::JOBS_BY_TYPE_STATE, "email:pending").unwrap();
    assert_eq!(pending.len(), 1);

    job.state = JobState::Activated;
    store.put(&job).unwrap();
    let pending: Vec<Job> =
        store.load_by_index(views::JOBS_BY_TYPE_STATE, "email:pending").unwrap();
    assert!(pending.is_empty());
}

#[test]
fn replay_restores_records_and_views() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        store.put(&token("wk01-t1", "wk01-i1", TokenState::Active)).unwrap();
        store.put(&token("wk01-t2", "wk01-i1", TokenState::Completed)).unwrap();
        store.delete::<Token>("wk01-t2").unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    assert!(store.get::<Token>("wk01-t1").unwrap().is_some());
    assert!(store.get::<Token>("wk01-t2").unwrap().is_none());
    let by_instance: Vec<Token> =
        store.load_by_index(views::TOKENS_BY_INSTANCE, "wk01-i1").unwrap();
    assert_eq!(by_instance.len(), 1);
}

#[test]
fn replay_tolerates_torn_tail() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        store.put(&token("wk01-t1", "wk01-i1", TokenState::Active)).unwrap();
    }
    // Simulate a crash mid-append.
    let log_path = dir.path().join("store.log");
    let mut file = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
    use std::io::Write;
    file.write_all(b"{\"op\":\"put\",\"key\":\"tok").unwrap();

    let store = Store::open(dir.path()).unwrap();
    assert!(store.get::<Token>("wk01-t1").unwrap().is_some());
}

#[test]
fn compaction_preserves_live_set() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut t = token("wk01-t1", "wk01-i1", TokenState::Active);
    for i in 0..50 {
        t.updated_at_ms = 1_000_000 + i;
        store.put(&t).unwrap();
    }
    store.compact().unwrap();

    let loaded: Token = store.get("wk01-t1").unwrap().unwrap();
    assert_eq!(loaded.updated_at_ms, 1_000_049);

    // Store still works after compaction, and survives reopen.
    store.put(&token("wk01-t2", "wk01-i1", TokenState::Active)).unwrap();
    drop(store);
    let store = Store::open(dir.path()).unwrap();
    assert!(store.get::<Token>("wk01-t1").unwrap().is_some());
    assert!(store.get::<Token>("wk01-t2").unwrap().is_some());
}

#[test]
fn count_kind_counts_live_records() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store.put(&token("wk01-t1", "wk01-i1", TokenState::Active)).unwrap();
    store.put(&token("wk01-t2", "wk01-i2", TokenState::Active)).unwrap();
    store.put(&Job::builder().build()).unwrap();

    assert_eq!(store.count_kind("token"), 2);
    assert_eq!(store.count_kind("job"), 1);
    assert_eq!(store.count_kind("incident"), 0);
}
