// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::interpreter::result::Wait;
use weir_core::test_support::{
    exclusive_gateway_process, parallel_fork_join_process, service_task_process,
};
use weir_core::{ElementId, ProcessInstance, Token, Value, VarMap};

fn ctx_token(process: &weir_core::ProcessDefinition, element: &str) -> (ProcessInstance, Token) {
    let instance = ProcessInstance::builder()
        .process_key(process.process_key())
        .process_id(process.process_id.clone())
        .build();
    let token = Token::builder()
        .process_key(process.process_key())
        .current_element_id(ElementId::new(element))
        .build();
    (instance, token)
}

#[test]
fn start_event_follows_outgoing() {
    let process = service_task_process("order", "email");
    let (instance, token) = ctx_token(&process, "start");
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    assert_eq!(result.next_elements, vec![ElementId::new("f1")]);
    assert!(!result.completed);
}

#[test]
fn service_task_requests_a_job() {
    let process = service_task_process("order", "email");
    let (mut instance, token) = ctx_token(&process, "task");
    instance.variables.insert("to".to_string(), Value::Str("x@y".into()));
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    match result.wait {
        Some(Wait::Job { job_type, variables, retries, .. }) => {
            assert_eq!(job_type, "email");
            assert_eq!(variables.get("to"), Some(&Value::Str("x@y".into())));
            assert_eq!(retries, 3);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn end_event_completes() {
    let process = service_task_process("order", "email");
    let (instance, token) = ctx_token(&process, "end");
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    assert!(result.completed);
    assert!(result.next_elements.is_empty());
}

#[test]
fn token_variables_shadow_instance_variables() {
    let process = service_task_process("order", "email");
    let (mut instance, mut token) = ctx_token(&process, "task");
    instance.variables.insert("x".to_string(), Value::Int(1));
    token.variables.insert("x".to_string(), Value::Int(2));
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    assert_eq!(ctx.vars().get("x"), Some(&Value::Int(2)));
}

#[yare::parameterized(
    high    = { 42, "f2" },
    low     = { -1, "f3" },
    default = { 5, "f4" },
)]
fn exclusive_gateway_picks_first_true_or_default(x: i64, expected_flow: &str) {
    let process = exclusive_gateway_process("route", "=x>10", "=x<0");
    let (mut instance, token) = ctx_token(&process, "xor");
    instance.variables.insert("x".to_string(), Value::Int(x));
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    assert_eq!(result.next_elements, vec![ElementId::new(expected_flow)]);
}

#[test]
fn exclusive_gateway_without_match_or_default_is_expression_error() {
    let mut process = exclusive_gateway_process("route", "=x>10", "=x<0");
    let mut elements: Vec<weir_core::Element> = process.elements.values().cloned().collect();
    for el in &mut elements {
        if el.id == "xor" {
            el.default_flow = None;
            el.outgoing.retain(|f| f != "f4");
        }
    }
    elements.retain(|e| e.id != "f4" && e.id != "endDefault");
    process = weir_core::ProcessDefinition::new("route", 1, "", elements);

    let (mut instance, token) = ctx_token(&process, "xor");
    instance.variables.insert("x".to_string(), Value::Int(5));
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let failure = execute_element(&ctx).unwrap_err();
    assert_eq!(failure.incident_type, weir_core::IncidentType::ExpressionError);
}

#[test]
fn parallel_fork_spawns_one_token_per_branch() {
    let process = parallel_fork_join_process("par", "work");
    let (instance, token) = ctx_token(&process, "fork");
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    assert_eq!(result.new_tokens.len(), 2);
    let targets: Vec<&str> = result.new_tokens.iter().map(|t| t.element.as_str()).collect();
    assert_eq!(targets, vec!["taskA", "taskB"]);
}

#[test]
fn parallel_join_waits() {
    let process = parallel_fork_join_process("par", "work");
    let (instance, token) = ctx_token(&process, "join");
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    assert!(matches!(result.wait, Some(Wait::Join)));
}

#[test]
fn timer_catch_event_requests_timer() {
    let mut start = weir_core::Element::new("start", weir_core::ElementType::StartEvent);
    let mut catch = weir_core::Element::new("catch", weir_core::ElementType::IntermediateCatchEvent);
    catch.event_definition =
        Some(weir_core::EventDefinition::Timer { spec: "PT10S".to_string() });
    let mut end = weir_core::Element::new("end", weir_core::ElementType::EndEvent);
    let f1 = weir_core::test_support::connect(&mut start, "f1", &mut catch);
    let f2 = weir_core::test_support::connect(&mut catch, "f2", &mut end);
    let process =
        weir_core::ProcessDefinition::new("waits", 1, "", vec![start, catch, end, f1, f2]);

    let (instance, token) = ctx_token(&process, "catch");
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };
    let result = execute_element(&ctx).unwrap();
    match result.wait {
        Some(Wait::Timer { spec }) => assert_eq!(spec, "PT10S"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn message_catch_event_evaluates_correlation() {
    let process = weir_core::test_support::message_catch_process("order", "M", "=orderId");
    let (mut instance, token) = ctx_token(&process, "catch");
    instance.variables.insert("orderId".to_string(), Value::Str("O1".into()));
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    match result.wait {
        Some(Wait::Message { name, correlation_key, .. }) => {
            assert_eq!(name, "M");
            assert_eq!(correlation_key, "O1");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn script_task_merges_result_variable() {
    let mut start = weir_core::Element::new("start", weir_core::ElementType::StartEvent);
    let mut script = weir_core::Element::new("calc", weir_core::ElementType::ScriptTask);
    script.script = Some("=x > 3".to_string());
    script.result_variable = Some("big".to_string());
    let mut end = weir_core::Element::new("end", weir_core::ElementType::EndEvent);
    let f1 = weir_core::test_support::connect(&mut start, "f1", &mut script);
    let f2 = weir_core::test_support::connect(&mut script, "f2", &mut end);
    let process = weir_core::ProcessDefinition::new("calc", 1, "", vec![start, script, end, f1, f2]);

    let (mut instance, token) = ctx_token(&process, "calc");
    instance.variables.insert("x".to_string(), Value::Int(5));
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };

    let result = execute_element(&ctx).unwrap();
    assert_eq!(
        result.variables.unwrap().get("big"),
        Some(&Value::Bool(true))
    );
    assert_eq!(result.next_elements, vec![ElementId::new("f2")]);
}

#[test]
fn manual_task_auto_advances() {
    let mut start = weir_core::Element::new("start", weir_core::ElementType::StartEvent);
    let mut manual = weir_core::Element::new("check", weir_core::ElementType::ManualTask);
    let mut end = weir_core::Element::new("end", weir_core::ElementType::EndEvent);
    let f1 = weir_core::test_support::connect(&mut start, "f1", &mut manual);
    let f2 = weir_core::test_support::connect(&mut manual, "f2", &mut end);
    let process = weir_core::ProcessDefinition::new("man", 1, "", vec![start, manual, end, f1, f2]);

    let (instance, token) = ctx_token(&process, "check");
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };
    let result = execute_element(&ctx).unwrap();
    assert_eq!(result.next_elements, vec![ElementId::new("f2")]);
}

#[test]
fn mappings_apply_expressions() {
    let source = VarMap::from([
        ("a".to_string(), Value::Int(1)),
        ("b".to_string(), Value::Int(2)),
    ]);
    let mappings = vec![
        weir_core::IoMapping { source: "=a".to_string(), target: "first".to_string() },
        weir_core::IoMapping { source: "=b > 1".to_string(), target: "check".to_string() },
    ];
    let out = apply_mappings(&source, &mappings).unwrap();
    assert_eq!(out.get("first"), Some(&Value::Int(1)));
    assert_eq!(out.get("check"), Some(&Value::Bool(true)));
    assert_eq!(out.len(), 2);
}

#[test]
fn empty_mappings_copy_everything() {
    let source = VarMap::from([("a".to_string(), Value::Int(1))]);
    let out = apply_mappings(&source, &[]).unwrap();
    assert_eq!(out, source);
}

#[test]
fn missing_task_type_is_process_failure() {
    let mut start = weir_core::Element::new("start", weir_core::ElementType::StartEvent);
    let mut task = weir_core::Element::new("task", weir_core::ElementType::ServiceTask);
    let f1 = weir_core::test_support::connect(&mut start, "f1", &mut task);
    let process = weir_core::ProcessDefinition::new("bad", 1, "", vec![start, task, f1]);

    let (instance, token) = ctx_token(&process, "task");
    let ctx = ExecCtx { definition: &process, instance: &instance, token: &token, now_ms: 0 };
    let failure = execute_element(&ctx).unwrap_err();
    assert_eq!(failure.incident_type, weir_core::IncidentType::ProcessError);
}
