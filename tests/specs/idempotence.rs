// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotence guarantees: repeated publishes and completions apply once.

use crate::prelude::*;
use crate::vars;
use std::time::Duration;
use weir_core::test_support::{message_catch_process, service_task_process};
use weir_core::{InstanceState, Value};
use weir_engine::PublishDisposition;

#[test]
fn duplicate_publish_by_request_id_delivers_once() {
    let h = harness();
    h.engine
        .deploy(message_catch_process("orders", "M", "=orderId"), false)
        .expect("deploy");
    let instance = h
        .engine
        .start_instance("orders", vars! { "orderId" => "O1" }, None)
        .expect("start");

    let first = h
        .engine
        .publish_message("M", "O1", vars! {}, None, None, Some("req-42"))
        .expect("publish");
    let second = h
        .engine
        .publish_message("M", "O1", vars! {}, None, None, Some("req-42"))
        .expect("republish");

    assert_eq!(first.disposition, PublishDisposition::Correlated);
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.message_id, second.message_id);

    // One delivery, one completed instance, nothing buffered.
    assert_eq!(
        h.engine.get_instance(&instance.instance_id).expect("get").state,
        InstanceState::Completed
    );
    assert_eq!(h.engine.stats().expect("stats").buffered_messages, 0);
}

#[test]
fn duplicate_buffered_publish_buffers_at_most_once() {
    let h = harness();
    h.engine
        .publish_message("M", "K", vars! {}, None, None, Some("req-7"))
        .expect("publish");
    h.engine
        .publish_message("M", "K", vars! {}, None, None, Some("req-7"))
        .expect("republish");

    assert_eq!(h.engine.stats().expect("stats").buffered_messages, 1);
}

#[test]
fn complete_job_twice_succeeds_twice_applies_once() {
    let h = harness();
    h.engine
        .deploy(service_task_process("orders", "charge"), false)
        .expect("deploy");
    let instance = h.engine.start_instance("orders", vars! {}, None).expect("start");

    let jobs = h
        .engine
        .activate_jobs("charge", "w", 1, Duration::from_secs(30))
        .expect("activate");

    h.engine
        .complete_job(&jobs[0].job_key, vars! { "n" => 1i64 })
        .expect("first");
    // Second call succeeds but must not re-apply variables or re-advance.
    h.engine
        .complete_job(&jobs[0].job_key, vars! { "n" => 99i64 })
        .expect("second");

    let done = h.engine.get_instance(&instance.instance_id).expect("get");
    assert_eq!(done.state, InstanceState::Completed);
    assert_eq!(done.variables.get("n"), Some(&Value::Int(1)));
}
