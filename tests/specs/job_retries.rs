// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job failure paths: backoff retries and the incident lifecycle.

use crate::prelude::*;
use crate::vars;
use std::time::Duration;
use weir_core::test_support::service_task_process;
use weir_core::{
    IncidentStatus, IncidentType, InstanceState, ResolveAction, TokenState, WaitReason,
};

#[test]
fn exhausted_retries_open_an_incident_and_resolution_requeues() {
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
        .fail_job(&jobs[0].job_key, 0, "bad", None)
        .expect("fail");

    // An incident is open, carrying the job's original retry budget.
    let incidents = h
        .engine
        .list_incidents(Some(IncidentStatus::Open), Some(&instance.instance_id))
        .expect("incidents");
    assert_eq!(incidents.len(), 1);
    let incident = &incidents[0];
    assert_eq!(incident.incident_type, IncidentType::JobFailure);
    assert_eq!(incident.original_retries, 3);
    assert_eq!(incident.job_key, Some(jobs[0].job_key));

    // The token is parked on the incident.
    let tokens = h.engine.list_tokens(&instance.instance_id).expect("tokens");
    let parked = tokens.iter().find(|t| t.state == TokenState::Waiting).expect("waiting token");
    assert!(matches!(parked.wait_reason(), Some(WaitReason::Incident(_))));

    // Nothing is claimable while parked.
    assert!(h
        .engine
        .activate_jobs("charge", "w", 8, Duration::from_secs(30))
        .expect("activate")
        .is_empty());

    // RETRY with two fresh attempts: the job returns to the queue.
    h.engine
        .resolve_incident(&incident.id, ResolveAction::Retry, Some(2), Some("ops"))
        .expect("resolve");
    let jobs = h
        .engine
        .activate_jobs("charge", "w", 1, Duration::from_secs(30))
        .expect("activate after resolve");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].retries_remaining, 2);

    h.engine.complete_job(&jobs[0].job_key, vars! {}).expect("complete");
    assert_eq!(
        h.engine.get_instance(&instance.instance_id).expect("get").state,
        InstanceState::Completed
    );
}

#[test]
fn failure_with_retries_left_requeues_after_backoff() {
    let h = harness();
    h.engine
        .deploy(service_task_process("orders", "charge"), false)
        .expect("deploy");
    h.engine.start_instance("orders", vars! {}, None).expect("start");

    let jobs = h
        .engine
        .activate_jobs("charge", "w", 1, Duration::from_secs(30))
        .expect("activate");
    h.engine
        .fail_job(&jobs[0].job_key, 2, "flaky", Some(Duration::from_secs(5)))
        .expect("fail");

    // Not claimable during the backoff window.
    assert!(h
        .engine
        .activate_jobs("charge", "w", 8, Duration::from_secs(30))
        .expect("activate")
        .is_empty());

    // The backoff timer fires and flips the job back to PENDING.
    h.clock.advance(Duration::from_secs(6));
    h.engine.fire_timers().expect("fire");

    let again = h
        .engine
        .activate_jobs("charge", "w", 1, Duration::from_secs(30))
        .expect("activate after backoff");
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].retries_remaining, 2);
}

#[test]
fn dismissing_an_incident_cancels_the_token() {
    let h = harness();
    h.engine
        .deploy(service_task_process("orders", "charge"), false)
        .expect("deploy");
    let instance = h.engine.start_instance("orders", vars! {}, None).expect("start");

    let jobs = h
        .engine
        .activate_jobs("charge", "w", 1, Duration::from_secs(30))
        .expect("activate");
    h.engine.fail_job(&jobs[0].job_key, 0, "bad", None).expect("fail");

    let incident = h
        .engine
        .list_incidents(Some(IncidentStatus::Open), None)
        .expect("incidents")
        .remove(0);
    h.engine
        .resolve_incident(&incident.id, ResolveAction::Dismiss, None, None)
        .expect("dismiss");

    // The parked token is gone and the instance has wound down.
    let tokens = h.engine.list_tokens(&instance.instance_id).expect("tokens");
    assert!(tokens.iter().all(|t| t.is_terminal()));
    let done = h.engine.get_instance(&instance.instance_id).expect("get");
    assert_eq!(done.state, InstanceState::Completed);
}
