// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn three_element_process() -> ProcessDefinition {
    let mut start = Element::new("start", ElementType::StartEvent);
    start.outgoing = vec!["f1".into()];
    let mut task = Element::new("task", ElementType::ServiceTask);
    task.incoming = vec!["f1".into()];
    task.outgoing = vec!["f2".into()];
    task.task_type = Some("email".to_string());
    let mut end = Element::new("end", ElementType::EndEvent);
    end.incoming = vec!["f2".into()];
    let f1 = Element::new("f1", ElementType::SequenceFlow);
    let f2 = Element::new("f2", ElementType::SequenceFlow);

    ProcessDefinition::new("order", 1, "", vec![start, task, end, f1, f2])
}

#[test]
fn process_key_format() {
    let def = three_element_process();
    assert_eq!(def.process_key(), "order:v1");
}

#[test]
fn content_hash_is_24_chars_and_stable() {
    let a = three_element_process();
    let b = three_element_process();
    assert_eq!(a.content_hash.len(), 24);
    assert_eq!(a.content_hash, b.content_hash);
}

#[test]
fn content_hash_changes_with_graph() {
    let a = three_element_process();
    let mut elements: Vec<Element> = a.elements.values().cloned().collect();
    elements.push(Element::new("extra", ElementType::ManualTask));
    let b = ProcessDefinition::new("order", 1, "", elements);
    assert_ne!(a.content_hash, b.content_hash);
}

#[test]
fn flow_target_resolves_via_incoming_list() {
    let def = three_element_process();
    assert_eq!(def.flow_target("f1").map(|e| e.id.as_str()), Some("task"));
    assert_eq!(def.flow_target("f2").map(|e| e.id.as_str()), Some("end"));
    assert!(def.flow_target("missing").is_none());
}

#[test]
fn flow_source_resolves_via_outgoing_list() {
    let def = three_element_process();
    assert_eq!(def.flow_source("f1").map(|e| e.id.as_str()), Some("start"));
}

#[test]
fn none_start_event_skips_message_starts() {
    let mut plain = Element::new("s1", ElementType::StartEvent);
    plain.outgoing = vec!["f1".into()];
    let mut msg = Element::new("s2", ElementType::StartEvent);
    msg.event_definition = Some(EventDefinition::Message {
        message_ref: "m".into(),
        correlation_key: None,
    });
    let def = ProcessDefinition::new("p", 1, "", vec![plain, msg]);
    assert_eq!(def.none_start_event().map(|e| e.id.as_str()), Some("s1"));
}

#[test]
fn boundary_events_for_activity() {
    let task = Element::new("task", ElementType::UserTask);
    let mut boundary = Element::new("b1", ElementType::BoundaryEvent);
    boundary.attached_to_ref = Some("task".into());
    boundary.event_definition = Some(EventDefinition::Timer { spec: "PT2S".to_string() });
    let def = ProcessDefinition::new("p", 1, "", vec![task, boundary]);

    let found = def.boundary_events_for("task");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "b1");
    assert!(found[0].cancel_activity);
}

#[test]
fn executable_element_count_skips_flows_and_declarations() {
    let def = three_element_process();
    // start + task + end; the two flows don't count.
    assert_eq!(def.executable_element_count(), 3);
}

#[yare::parameterized(
    service  = { ElementType::ServiceTask, true },
    user     = { ElementType::UserTask, true },
    call     = { ElementType::CallActivity, true },
    subproc  = { ElementType::SubProcess, true },
    start    = { ElementType::StartEvent, false },
    gateway  = { ElementType::ParallelGateway, false },
    flow     = { ElementType::SequenceFlow, false },
)]
fn activity_classification(ty: ElementType, expected: bool) {
    assert_eq!(ty.is_activity(), expected);
}

#[test]
fn definition_roundtrips_through_serde() {
    let def = three_element_process();
    let json = serde_json::to_string(&def).unwrap();
    let back: ProcessDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(def, back);
}
