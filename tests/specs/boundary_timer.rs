// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interrupting boundary timer: the user task is abandoned after PT2S.

use crate::prelude::*;
use crate::vars;
use std::time::Duration;
use weir_core::test_support::boundary_timer_process;
use weir_core::{InstanceState, TokenState};

#[test]
fn boundary_timer_interrupts_user_task() {
    let h = harness();
    h.engine
        .deploy(boundary_timer_process("review", "PT2S"), false)
        .expect("deploy");

    let instance = h
        .engine
        .start_instance("review", vars! {}, None)
        .expect("start");
    assert_eq!(instance.state, InstanceState::Active);

    // Nobody completes the user task; three seconds pass.
    h.clock.advance(Duration::from_secs(3));
    h.engine.fire_timers().expect("fire");

    let done = h.engine.get_instance(&instance.instance_id).expect("get");
    assert_eq!(done.state, InstanceState::Completed);

    let tokens = h.engine.list_tokens(&instance.instance_id).expect("tokens");
    // The user-task token was cancelled by the interrupt…
    assert!(tokens
        .iter()
        .any(|t| t.current_element_id == "task" && t.state == TokenState::Cancelled));
    // …and the boundary path ran to endB.
    assert!(tokens
        .iter()
        .any(|t| t.current_element_id == "endB" && t.state == TokenState::Completed));

    // No job remains claimable.
    let jobs = h
        .engine
        .activate_jobs("user", "w", 8, Duration::from_secs(30))
        .expect("activate");
    assert!(jobs.is_empty());
}

#[test]
fn completing_the_task_first_disarms_the_boundary_timer() {
    let h = harness();
    h.engine
        .deploy(boundary_timer_process("review", "PT2S"), false)
        .expect("deploy");
    let instance = h.engine.start_instance("review", vars! {}, None).expect("start");

    let jobs = h
        .engine
        .activate_jobs("user", "w", 1, Duration::from_secs(30))
        .expect("activate");
    h.engine.complete_job(&jobs[0].job_key, vars! {}).expect("complete");

    // The timer deadline passes after completion: nothing happens.
    h.clock.advance(Duration::from_secs(5));
    h.engine.fire_timers().expect("fire");

    let tokens = h.engine.list_tokens(&instance.instance_id).expect("tokens");
    assert!(tokens
        .iter()
        .any(|t| t.current_element_id == "endA" && t.state == TokenState::Completed));
    assert!(!tokens.iter().any(|t| t.current_element_id == "endB"));
}
