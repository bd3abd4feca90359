// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn req(t: &str) -> RequestEnvelope {
    RequestEnvelope::new(t, serde_json::json!({}))
}

#[test]
fn mailbox_is_fifo() {
    let mailbox = Mailbox::new("broker", 10);
    mailbox.try_push(req("a")).unwrap();
    mailbox.try_push(req("b")).unwrap();

    assert_eq!(mailbox.pop().unwrap().request_type, "a");
    assert_eq!(mailbox.pop().unwrap().request_type, "b");
    assert!(mailbox.pop().is_none());
}

#[test]
fn mailbox_rejects_when_full() {
    let mailbox = Mailbox::new("broker", 2);
    mailbox.try_push(req("a")).unwrap();
    mailbox.try_push(req("b")).unwrap();

    let err = mailbox.try_push(req("c")).unwrap_err();
    assert!(matches!(err, EngineError::Busy(ref name) if name == "broker"));
    // Draining frees capacity again.
    mailbox.pop();
    mailbox.try_push(req("c")).unwrap();
}

#[test]
fn dispatcher_routes_to_target_mailbox() {
    let dispatcher = Dispatcher::new(16);
    dispatcher.route("api", "interpreter", req("execute_token")).unwrap();

    let mailbox = dispatcher.mailbox("interpreter");
    assert_eq!(mailbox.len(), 1);
    assert_eq!(mailbox.pop().unwrap().request_type, "execute_token");
}

#[test]
fn response_pairs_back_to_requester() {
    let dispatcher = Dispatcher::new(16);
    let request = req("fire_timer");
    let request_id = request.request_id.clone();
    dispatcher.route("wheel", "interpreter", request.clone()).unwrap();

    dispatcher.complete(ResponseEnvelope::ok(&request, serde_json::json!({"n": 1})));

    let response = dispatcher.wait_for_response("wheel", Duration::from_millis(100)).unwrap();
    assert_eq!(response.request_id, request_id);
    assert!(response.success);
}

#[test]
fn wait_times_out_without_response() {
    let dispatcher = Dispatcher::new(16);
    dispatcher.route("api", "broker", req("activate_jobs")).unwrap();

    let err = dispatcher
        .wait_for_response("api", Duration::from_millis(20))
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded(_)));
}

#[test]
fn uncorrelated_responses_are_discarded() {
    let dispatcher = Dispatcher::new(16);
    let request = req("publish_message");
    // Never routed: no reply_to entry exists.
    dispatcher.complete(ResponseEnvelope::ok(&request, serde_json::json!({})));

    let err = dispatcher
        .wait_for_response("api", Duration::from_millis(20))
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded(_)));
}

#[test]
fn abandoned_request_response_is_dropped() {
    let dispatcher = Dispatcher::new(16);
    let request = req("complete_job");
    dispatcher.route("api", "broker", request.clone()).unwrap();
    dispatcher.abandon(&request.request_id);

    dispatcher.complete(ResponseEnvelope::ok(&request, serde_json::json!({})));
    let err = dispatcher
        .wait_for_response("api", Duration::from_millis(20))
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded(_)));
}

#[test]
fn responses_arriving_from_another_thread_unblock_the_waiter() {
    let dispatcher = Arc::new(Dispatcher::new(16));
    let request = req("slow_op");
    dispatcher.route("api", "worker", request.clone()).unwrap();

    let bg = Arc::clone(&dispatcher);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        bg.complete(ResponseEnvelope::ok(&request, serde_json::json!({"done": true})));
    });

    let response = dispatcher
        .wait_for_response("api", Duration::from_secs(1))
        .unwrap();
    assert!(response.success);
    handle.join().unwrap();
}
