// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::process::{Element, ElementType, EventDefinition, ProcessDefinition};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::token::TokenState;
    use proptest::prelude::*;

    pub fn arb_token_state() -> impl Strategy<Value = TokenState> {
        prop_oneof![
            Just(TokenState::Active),
            Just(TokenState::Waiting),
            Just(TokenState::Completed),
            Just(TokenState::Cancelled),
        ]
    }
}

// ── Graph factory functions ─────────────────────────────────────────────

/// Wire `from --flow--> to`, appending to the elements' flow lists.
pub fn connect(from: &mut Element, flow_id: &str, to: &mut Element) -> Element {
    from.outgoing.push(flow_id.into());
    to.incoming.push(flow_id.into());
    Element::new(flow_id, ElementType::SequenceFlow)
}

/// `start → serviceTask(job_type) → end` — the minimal useful process.
pub fn service_task_process(process_id: &str, job_type: &str) -> ProcessDefinition {
    let mut start = Element::new("start", ElementType::StartEvent);
    let mut task = Element::new("task", ElementType::ServiceTask);
    task.task_type = Some(job_type.to_string());
    let mut end = Element::new("end", ElementType::EndEvent);

    let f1 = connect(&mut start, "f1", &mut task);
    let f2 = connect(&mut task, "f2", &mut end);

    ProcessDefinition::new(process_id, 1, "", vec![start, task, end, f1, f2])
}

/// `start → catch(message M, correlation expr) → end`
pub fn message_catch_process(
    process_id: &str,
    message_name: &str,
    correlation_key: &str,
) -> ProcessDefinition {
    let mut start = Element::new("start", ElementType::StartEvent);
    let mut catch = Element::new("catch", ElementType::IntermediateCatchEvent);
    catch.event_definition = Some(EventDefinition::Message {
        message_ref: message_name.into(),
        correlation_key: Some(correlation_key.to_string()),
    });
    let mut end = Element::new("end", ElementType::EndEvent);

    let f1 = connect(&mut start, "f1", &mut catch);
    let f2 = connect(&mut catch, "f2", &mut end);

    let message = Element::new(message_name, ElementType::Message);

    ProcessDefinition::new(process_id, 1, "", vec![start, catch, end, f1, f2, message])
}

/// `start → userTask [boundary timer spec] → endA; boundary → endB`
pub fn boundary_timer_process(process_id: &str, timer_spec: &str) -> ProcessDefinition {
    let mut start = Element::new("start", ElementType::StartEvent);
    let mut task = Element::new("task", ElementType::UserTask);
    task.task_type = Some("user".to_string());
    let mut end_a = Element::new("endA", ElementType::EndEvent);
    let mut boundary = Element::new("boundary", ElementType::BoundaryEvent);
    boundary.attached_to_ref = Some("task".into());
    boundary.event_definition = Some(EventDefinition::Timer { spec: timer_spec.to_string() });
    let mut end_b = Element::new("endB", ElementType::EndEvent);

    let f1 = connect(&mut start, "f1", &mut task);
    let f2 = connect(&mut task, "f2", &mut end_a);
    let f3 = connect(&mut boundary, "f3", &mut end_b);

    ProcessDefinition::new(process_id, 1, "", vec![start, task, end_a, boundary, end_b, f1, f2, f3])
}

/// `start → fork ⇉ (taskA, taskB) ⇉ join → end` — parallel fork/join pair.
pub fn parallel_fork_join_process(process_id: &str, job_type: &str) -> ProcessDefinition {
    let mut start = Element::new("start", ElementType::StartEvent);
    let mut fork = Element::new("fork", ElementType::ParallelGateway);
    let mut task_a = Element::new("taskA", ElementType::ServiceTask);
    task_a.task_type = Some(job_type.to_string());
    let mut task_b = Element::new("taskB", ElementType::ServiceTask);
    task_b.task_type = Some(job_type.to_string());
    let mut join = Element::new("join", ElementType::ParallelGateway);
    let mut end = Element::new("end", ElementType::EndEvent);

    let f1 = connect(&mut start, "f1", &mut fork);
    let f2 = connect(&mut fork, "f2", &mut task_a);
    let f3 = connect(&mut fork, "f3", &mut task_b);
    let f4 = connect(&mut task_a, "f4", &mut join);
    let f5 = connect(&mut task_b, "f5", &mut join);
    let f6 = connect(&mut join, "f6", &mut end);

    ProcessDefinition::new(
        process_id,
        1,
        "",
        vec![start, fork, task_a, task_b, join, end, f1, f2, f3, f4, f5, f6],
    )
}

/// Exclusive gateway with two conditions and a default branch.
///
/// `start → xor → (endHigh if c1) | (endLow if c2) | endDefault`
pub fn exclusive_gateway_process(
    process_id: &str,
    condition_high: &str,
    condition_low: &str,
) -> ProcessDefinition {
    let mut start = Element::new("start", ElementType::StartEvent);
    let mut xor = Element::new("xor", ElementType::ExclusiveGateway);
    let mut end_high = Element::new("endHigh", ElementType::EndEvent);
    let mut end_low = Element::new("endLow", ElementType::EndEvent);
    let mut end_default = Element::new("endDefault", ElementType::EndEvent);

    let f1 = connect(&mut start, "f1", &mut xor);
    let mut f2 = connect(&mut xor, "f2", &mut end_high);
    f2.condition = Some(condition_high.to_string());
    let mut f3 = connect(&mut xor, "f3", &mut end_low);
    f3.condition = Some(condition_low.to_string());
    let f4 = connect(&mut xor, "f4", &mut end_default);
    xor.default_flow = Some("f4".into());

    ProcessDefinition::new(
        process_id,
        1,
        "",
        vec![start, xor, end_high, end_low, end_default, f1, f2, f3, f4],
    )
}
