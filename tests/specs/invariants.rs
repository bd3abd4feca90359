// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quantified invariants over completed runs.

use crate::prelude::*;
use crate::vars;
use std::time::Duration;
use weir_core::test_support::{parallel_fork_join_process, service_task_process};
use weir_core::{Element, ElementType, InstanceState, ProcessDefinition};
use weir_core::test_support::connect;

#[test]
fn completed_instances_have_only_terminal_tokens_and_ordered_stamps() {
    let h = harness();
    h.engine
        .deploy(service_task_process("orders", "charge"), false)
        .expect("deploy");
    let instance = h.engine.start_instance("orders", vars! {}, None).expect("start");

    h.clock.advance(Duration::from_secs(1));
    let jobs = h
        .engine
        .activate_jobs("charge", "w", 1, Duration::from_secs(30))
        .expect("activate");
    h.engine.complete_job(&jobs[0].job_key, vars! {}).expect("complete");

    let done = h.engine.get_instance(&instance.instance_id).expect("get");
    assert_eq!(done.state, InstanceState::Completed);
    let completed_at = done.completed_at_ms.expect("completed stamp");

    let tokens = h.engine.list_tokens(&instance.instance_id).expect("tokens");
    assert!(!tokens.is_empty());
    for token in &tokens {
        assert!(token.is_terminal(), "token {} not terminal", token.token_id);
        assert!(
            completed_at >= token.completed_at_ms.expect("token stamp"),
            "instance completed before its tokens"
        );
    }
}

#[test]
fn fork_join_round_trip_preserves_token_accounting() {
    let h = harness();
    h.engine
        .deploy(parallel_fork_join_process("par", "work"), false)
        .expect("deploy");
    let instance = h.engine.start_instance("par", vars! {}, None).expect("start");

    let jobs = h
        .engine
        .activate_jobs("work", "w", 8, Duration::from_secs(30))
        .expect("activate");
    assert_eq!(jobs.len(), 2, "fork produced one job per branch");
    for job in &jobs {
        h.engine.complete_job(&job.job_key, vars! {}).expect("complete");
    }

    let tokens = h.engine.list_tokens(&instance.instance_id).expect("tokens");
    // One survivor exits the join per fork round.
    assert_eq!(
        tokens.iter().filter(|t| t.current_element_id == "end").count(),
        1
    );
    assert_eq!(
        h.engine.get_instance(&instance.instance_id).expect("get").state,
        InstanceState::Completed
    );
}

#[test]
fn pass_through_gateway_never_waits() {
    // A parallel gateway with a single incoming flow is a pass-through;
    // it must not park the token.
    let h = harness();
    let mut start = Element::new("start", ElementType::StartEvent);
    let mut gw = Element::new("gw", ElementType::ParallelGateway);
    let mut end = Element::new("end", ElementType::EndEvent);
    let f1 = connect(&mut start, "f1", &mut gw);
    let f2 = connect(&mut gw, "f2", &mut end);
    let process = ProcessDefinition::new("pass", 1, "", vec![start, gw, end, f1, f2]);
    h.engine.deploy(process, false).expect("deploy");

    let instance = h.engine.start_instance("pass", vars! {}, None).expect("start");
    assert_eq!(instance.state, InstanceState::Completed);
}

#[test]
fn event_log_records_the_lifecycle_in_order() {
    let h = harness();
    h.engine
        .deploy(service_task_process("orders", "charge"), false)
        .expect("deploy");
    let instance = h.engine.start_instance("orders", vars! {}, None).expect("start");
    let jobs = h
        .engine
        .activate_jobs("charge", "w", 1, Duration::from_secs(30))
        .expect("activate");
    h.engine.complete_job(&jobs[0].job_key, vars! {}).expect("complete");

    let events: Vec<String> = h
        .engine
        .events_since(0)
        .into_iter()
        .map(|(_, e)| e.log_summary())
        .collect();

    let position = |needle: &str| {
        events
            .iter()
            .position(|e| e.contains(needle))
            .unwrap_or_else(|| panic!("missing {needle:?} in {events:?}"))
    };
    let deploy = position("process:deployed");
    let started = position(&format!("instance:started {}", instance.instance_id));
    let job_created = position("job:created");
    let job_completed = position("job:completed");
    let completed = position(&format!("instance:completed {}", instance.instance_id));

    assert!(deploy < started);
    assert!(started < job_created);
    assert!(job_created < job_completed);
    assert!(job_completed < completed);
}
