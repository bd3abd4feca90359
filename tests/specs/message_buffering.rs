// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message correlation with buffering: publish before the catch is
//! reached, replay exactly once on subscription.

use crate::prelude::*;
use crate::vars;
use weir_core::test_support::message_catch_process;
use weir_core::{InstanceState, Value};
use weir_engine::PublishDisposition;

#[test]
fn early_publish_buffers_then_replays_exactly_once() {
    let h = harness();
    h.engine
        .deploy(message_catch_process("orders", "M", "=orderId"), false)
        .expect("deploy");

    // Published before any instance exists: buffered.
    let receipt = h
        .engine
        .publish_message("M", "O1", vars! { "paid" => true }, None, None, None)
        .expect("publish");
    assert_eq!(receipt.disposition, PublishDisposition::Buffered);
    assert_eq!(h.engine.stats().expect("stats").buffered_messages, 1);

    // The instance reaches the catch, subscribes, and the buffered
    // message is replayed: the token continues to the end.
    let instance = h
        .engine
        .start_instance("orders", vars! { "orderId" => "O1" }, None)
        .expect("start");

    let done = h.engine.get_instance(&instance.instance_id).expect("get");
    assert_eq!(done.state, InstanceState::Completed);
    assert_eq!(done.variables.get("paid"), Some(&Value::Bool(true)));

    // Delivered exactly once: the buffer is empty.
    assert_eq!(h.engine.stats().expect("stats").buffered_messages, 0);
}

#[test]
fn live_subscription_correlates_immediately() {
    let h = harness();
    h.engine
        .deploy(message_catch_process("orders", "M", "=orderId"), false)
        .expect("deploy");

    let instance = h
        .engine
        .start_instance("orders", vars! { "orderId" => "O2" }, None)
        .expect("start");
    assert_eq!(instance.state, InstanceState::Active);

    let receipt = h
        .engine
        .publish_message("M", "O2", vars! {}, None, None, None)
        .expect("publish");
    assert_eq!(receipt.disposition, PublishDisposition::Correlated);

    let done = h.engine.get_instance(&instance.instance_id).expect("get");
    assert_eq!(done.state, InstanceState::Completed);
}

#[test]
fn wrong_correlation_key_stays_buffered() {
    let h = harness();
    h.engine
        .deploy(message_catch_process("orders", "M", "=orderId"), false)
        .expect("deploy");

    let instance = h
        .engine
        .start_instance("orders", vars! { "orderId" => "O3" }, None)
        .expect("start");

    let receipt = h
        .engine
        .publish_message("M", "OTHER", vars! {}, None, None, None)
        .expect("publish");
    assert_eq!(receipt.disposition, PublishDisposition::Buffered);
    assert_eq!(
        h.engine.get_instance(&instance.instance_id).expect("get").state,
        InstanceState::Active
    );
}

#[test]
fn zero_ttl_message_expires_on_next_cleanup() {
    let h = harness();
    let receipt = h
        .engine
        .publish_message("M", "K", vars! {}, Some(0), None, None)
        .expect("publish");
    assert_eq!(receipt.disposition, PublishDisposition::Buffered);

    h.clock.advance(std::time::Duration::from_millis(1));
    assert_eq!(h.engine.cleanup_buffers().expect("cleanup"), 1);
    assert_eq!(h.engine.stats().expect("stats").buffered_messages, 0);
}
