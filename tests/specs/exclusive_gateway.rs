// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive gateway routing with conditions and a default flow.

use crate::prelude::*;
use crate::vars;
use weir_core::test_support::exclusive_gateway_process;
use weir_core::{InstanceState, TokenState};

fn end_reached(h: &Harness, x: i64) -> String {
    let instance = h
        .engine
        .start_instance("route", vars! { "x" => x }, None)
        .expect("start");
    assert_eq!(instance.state, InstanceState::Completed);
    let tokens = h.engine.list_tokens(&instance.instance_id).expect("tokens");
    tokens
        .iter()
        .find(|t| t.state == TokenState::Completed && t.current_element_id.starts_with("end"))
        .map(|t| t.current_element_id.to_string())
        .expect("a completed end token")
}

#[test]
fn first_true_condition_wins_in_document_order() {
    let h = harness();
    h.engine
        .deploy(exclusive_gateway_process("route", "=x>10", "=x<0"), false)
        .expect("deploy");

    assert_eq!(end_reached(&h, 42), "endHigh");
    assert_eq!(end_reached(&h, -1), "endLow");
    assert_eq!(end_reached(&h, 5), "endDefault");
}

#[test]
fn no_match_without_default_opens_expression_incident() {
    use weir_core::{Element, ElementType, IncidentStatus, IncidentType, ProcessDefinition};
    use weir_core::test_support::connect;

    let h = harness();
    let mut start = Element::new("start", ElementType::StartEvent);
    let mut xor = Element::new("xor", ElementType::ExclusiveGateway);
    let mut end = Element::new("end", ElementType::EndEvent);
    let f1 = connect(&mut start, "f1", &mut xor);
    let mut f2 = connect(&mut xor, "f2", &mut end);
    f2.condition = Some("=x > 10".to_string());
    let process = ProcessDefinition::new("strict", 1, "", vec![start, xor, end, f1, f2]);
    h.engine.deploy(process, false).expect("deploy");

    let instance = h
        .engine
        .start_instance("strict", vars! { "x" => 1i64 }, None)
        .expect("start");

    // The instance stays up with the token parked on an incident.
    assert_eq!(instance.state, InstanceState::Active);
    let incidents = h
        .engine
        .list_incidents(Some(IncidentStatus::Open), Some(&instance.instance_id))
        .expect("incidents");
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].incident_type, IncidentType::ExpressionError);
}
