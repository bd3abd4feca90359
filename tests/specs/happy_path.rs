// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path service task: deploy → start → activate → complete.

use crate::prelude::*;
use crate::vars;
use std::time::Duration;
use weir_core::test_support::service_task_process;
use weir_core::{InstanceState, Value};

#[test]
fn service_task_completes_instance_with_merged_variables() {
    let h = harness();
    h.engine
        .deploy(service_task_process("mailer", "email"), false)
        .expect("deploy");

    let instance = h
        .engine
        .start_instance("mailer", vars! { "to" => "x@y" }, None)
        .expect("start");
    assert_eq!(instance.state, InstanceState::Active);

    // The worker sees exactly one job carrying the input variables.
    let jobs = h
        .engine
        .activate_jobs("email", "worker-1", 8, Duration::from_secs(30))
        .expect("activate");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].variables.get("to"), Some(&Value::Str("x@y".into())));

    h.engine
        .complete_job(&jobs[0].job_key, vars! { "sent" => true })
        .expect("complete");

    let done = h.engine.get_instance(&instance.instance_id).expect("get");
    assert_eq!(done.state, InstanceState::Completed);
    assert_eq!(done.variables.get("to"), Some(&Value::Str("x@y".into())));
    assert_eq!(done.variables.get("sent"), Some(&Value::Bool(true)));

    // Nothing is left for workers.
    let leftover = h
        .engine
        .activate_jobs("email", "worker-1", 8, Duration::from_secs(30))
        .expect("activate again");
    assert!(leftover.is_empty());
}

#[test]
fn second_instance_is_independent() {
    let h = harness();
    h.engine
        .deploy(service_task_process("mailer", "email"), false)
        .expect("deploy");

    let a = h.engine.start_instance("mailer", vars! { "n" => 1i64 }, None).expect("a");
    let b = h.engine.start_instance("mailer", vars! { "n" => 2i64 }, None).expect("b");

    let jobs = h
        .engine
        .activate_jobs("email", "w", 8, Duration::from_secs(30))
        .expect("activate");
    assert_eq!(jobs.len(), 2);

    // Complete only the first; the second instance stays active.
    let job_a = jobs
        .iter()
        .find(|j| j.process_instance_id == a.instance_id)
        .expect("job for a");
    h.engine.complete_job(&job_a.job_key, vars! {}).expect("complete");

    assert_eq!(
        h.engine.get_instance(&a.instance_id).expect("a").state,
        InstanceState::Completed
    );
    assert_eq!(
        h.engine.get_instance(&b.instance_id).expect("b").state,
        InstanceState::Active
    );
}
