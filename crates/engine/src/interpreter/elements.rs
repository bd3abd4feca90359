// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Element executors.
//!
//! One function per element family, dispatched by [`execute_element`].
//! Executors never touch storage or other components; they return an
//! [`ExecutionResult`] describing what should happen.

use super::result::{
    BpmnError, BranchWait, EventBranch, ExecCtx, ExecFailure, ExecutionResult, NewToken,
    PublishSpec, Wait,
};
use weir_core::{Element, ElementType, EventDefinition, IoMapping, Value, VarMap};
use weir_expr::{evaluate_condition, evaluate_text, parse_retries};

/// Dispatch the executor for the token's current element.
pub fn execute_element(ctx: &ExecCtx<'_>) -> Result<ExecutionResult, ExecFailure> {
    let element = ctx
        .definition
        .element(&ctx.token.current_element_id)
        .ok_or_else(|| {
            ExecFailure::process(format!(
                "element {} not in process {}",
                ctx.token.current_element_id,
                ctx.definition.process_key()
            ))
        })?;

    match element.element_type {
        ElementType::StartEvent => Ok(ExecutionResult::next(&element.outgoing)),
        ElementType::EndEvent => end_event(ctx, element),
        ElementType::IntermediateCatchEvent => catch_event(ctx, element),
        ElementType::IntermediateThrowEvent => throw_event(ctx, element),
        // A token standing on a boundary event was spawned by its firing;
        // it just follows the boundary's outgoing flows.
        ElementType::BoundaryEvent => Ok(ExecutionResult::next(&element.outgoing)),
        ElementType::ServiceTask | ElementType::SendTask | ElementType::BusinessRuleTask => {
            worker_task(ctx, element)
        }
        ElementType::UserTask => user_task(ctx, element),
        ElementType::ReceiveTask => receive_task(ctx, element),
        ElementType::ManualTask => Ok(ExecutionResult::next(&element.outgoing)),
        ElementType::ScriptTask => script_task(ctx, element),
        ElementType::CallActivity => call_activity(ctx, element),
        ElementType::SubProcess => Ok(ExecutionResult::wait(Wait::Join)),
        ElementType::ExclusiveGateway => exclusive_gateway(ctx, element),
        ElementType::ParallelGateway => parallel_gateway(ctx, element),
        ElementType::InclusiveGateway => inclusive_gateway(ctx, element),
        ElementType::EventBasedGateway => event_based_gateway(ctx, element),
        ElementType::SequenceFlow
        | ElementType::Message
        | ElementType::Error
        | ElementType::Signal
        | ElementType::Escalation => Err(ExecFailure::process(format!(
            "token cannot occupy {} element {}",
            element.element_type, element.id
        ))),
    }
}

fn end_event(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    match &element.event_definition {
        None => Ok(ExecutionResult::completed()),
        Some(EventDefinition::Message { message_ref, correlation_key }) => {
            let publish = build_publish(ctx, message_ref, correlation_key.as_deref(), false)?;
            Ok(ExecutionResult { publish: Some(publish), completed: true, ..Default::default() })
        }
        Some(EventDefinition::Signal { signal_ref }) => {
            let publish = build_publish(ctx, signal_ref, None, true)?;
            Ok(ExecutionResult { publish: Some(publish), completed: true, ..Default::default() })
        }
        Some(EventDefinition::Error { error_code }) => Ok(ExecutionResult {
            error: Some(BpmnError {
                code: error_code.clone().unwrap_or_default(),
                message: format!("error end event {}", element.id),
            }),
            ..Default::default()
        }),
        Some(EventDefinition::Escalation { escalation_code }) => Ok(ExecutionResult {
            error: Some(BpmnError {
                code: escalation_code.clone().unwrap_or_default(),
                message: format!("escalation end event {}", element.id),
            }),
            ..Default::default()
        }),
        Some(EventDefinition::Compensation) => Ok(ExecutionResult {
            compensate: true,
            completed: true,
            ..Default::default()
        }),
        Some(other) => Err(ExecFailure::process(format!(
            "unsupported end event definition {other:?} on {}",
            element.id
        ))),
    }
}

fn catch_event(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    match &element.event_definition {
        Some(EventDefinition::Timer { spec }) => {
            Ok(ExecutionResult::wait(Wait::Timer { spec: spec.clone() }))
        }
        Some(EventDefinition::Message { message_ref, correlation_key }) => {
            let name = resolve_message_name(ctx, message_ref);
            let key = eval_correlation(ctx, correlation_key.as_deref())?;
            Ok(ExecutionResult::wait(Wait::Message {
                name,
                message_ref: message_ref.clone(),
                correlation_key: key,
            }))
        }
        Some(EventDefinition::Signal { signal_ref }) => {
            let name = format!("signal:{}", resolve_message_name(ctx, signal_ref));
            Ok(ExecutionResult::wait(Wait::Message {
                name,
                message_ref: signal_ref.clone(),
                correlation_key: String::new(),
            }))
        }
        Some(EventDefinition::Conditional { condition }) => {
            let fulfilled = evaluate_condition(condition, &ctx.vars())
                .map_err(|e| ExecFailure::expression(e.to_string()))?;
            if fulfilled {
                Ok(ExecutionResult::next(&element.outgoing))
            } else {
                // Parked on an internal subscription; the engine republishes
                // it whenever instance variables change.
                Ok(ExecutionResult::wait(Wait::Message {
                    name: format!("__conditional__:{}", ctx.instance.instance_id),
                    message_ref: element.id.clone(),
                    correlation_key: String::new(),
                }))
            }
        }
        other => Err(ExecFailure::process(format!(
            "catch event {} has unsupported definition {other:?}",
            element.id
        ))),
    }
}

fn throw_event(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    match &element.event_definition {
        None => Ok(ExecutionResult::next(&element.outgoing)),
        Some(EventDefinition::Message { message_ref, correlation_key }) => {
            let publish = build_publish(ctx, message_ref, correlation_key.as_deref(), false)?;
            Ok(ExecutionResult {
                publish: Some(publish),
                next_elements: element.outgoing.clone(),
                ..Default::default()
            })
        }
        Some(EventDefinition::Signal { signal_ref }) => {
            let publish = build_publish(ctx, signal_ref, None, true)?;
            Ok(ExecutionResult {
                publish: Some(publish),
                next_elements: element.outgoing.clone(),
                ..Default::default()
            })
        }
        Some(EventDefinition::Escalation { escalation_code }) => Ok(ExecutionResult {
            error: Some(BpmnError {
                code: escalation_code.clone().unwrap_or_default(),
                message: format!("escalation throw {}", element.id),
            }),
            ..Default::default()
        }),
        Some(EventDefinition::Compensation) => Ok(ExecutionResult {
            compensate: true,
            next_elements: element.outgoing.clone(),
            ..Default::default()
        }),
        Some(other) => Err(ExecFailure::process(format!(
            "throw event {} has unsupported definition {other:?}",
            element.id
        ))),
    }
}

fn worker_task(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    let job_type = element.task_type.clone().ok_or_else(|| {
        ExecFailure::process(format!("task {} has no task definition type", element.id))
    })?;
    let variables = apply_mappings(&ctx.vars(), &element.input_mappings)?;
    Ok(ExecutionResult::wait(Wait::Job {
        job_type,
        variables,
        headers: element.headers.clone(),
        retries: parse_retries(element.task_retries.as_deref()),
    }))
}

fn user_task(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    // User tasks are job-shaped: a human-facing worker completes them.
    let job_type = element
        .task_type
        .clone()
        .unwrap_or_else(|| "user".to_string());
    let variables = apply_mappings(&ctx.vars(), &element.input_mappings)?;
    Ok(ExecutionResult::wait(Wait::Job {
        job_type,
        variables,
        headers: element.headers.clone(),
        retries: parse_retries(element.task_retries.as_deref()),
    }))
}

fn receive_task(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    match &element.event_definition {
        Some(EventDefinition::Message { message_ref, correlation_key }) => {
            let name = resolve_message_name(ctx, message_ref);
            let key = eval_correlation(ctx, correlation_key.as_deref())?;
            Ok(ExecutionResult::wait(Wait::Message {
                name,
                message_ref: message_ref.clone(),
                correlation_key: key,
            }))
        }
        _ => Err(ExecFailure::process(format!(
            "receive task {} has no message definition",
            element.id
        ))),
    }
}

fn script_task(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    let script = element.script.as_deref().ok_or_else(|| {
        ExecFailure::process(format!("script task {} has no script", element.id))
    })?;
    let value = evaluate_text(script, &ctx.vars())
        .map_err(|e| ExecFailure::expression(e.to_string()))?;
    let target = element.result_variable.clone().unwrap_or_else(|| "result".to_string());
    let mut variables = VarMap::new();
    variables.insert(target, value);
    Ok(ExecutionResult {
        variables: Some(variables),
        next_elements: element.outgoing.clone(),
        ..Default::default()
    })
}

fn call_activity(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    let process_id = element.called_process_id.clone().ok_or_else(|| {
        ExecFailure::process(format!("call activity {} names no process", element.id))
    })?;
    let variables = if element.input_mappings.is_empty() {
        ctx.vars()
    } else {
        apply_mappings(&ctx.vars(), &element.input_mappings)?
    };
    Ok(ExecutionResult::wait(Wait::CallActivity { process_id, variables }))
}

fn exclusive_gateway(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    let vars = ctx.vars();
    // Conditions evaluate in document order; the first true flow wins.
    for flow_id in &element.outgoing {
        if Some(flow_id) == element.default_flow.as_ref() {
            continue;
        }
        let Some(flow) = ctx.definition.element(flow_id) else {
            continue;
        };
        match &flow.condition {
            Some(condition) => {
                let taken = evaluate_condition(condition, &vars)
                    .map_err(|e| ExecFailure::expression(e.to_string()))?;
                if taken {
                    return Ok(ExecutionResult::next(std::slice::from_ref(flow_id)));
                }
            }
            // An unconditional non-default flow is taken unconditionally.
            None => return Ok(ExecutionResult::next(std::slice::from_ref(flow_id))),
        }
    }
    if let Some(default_flow) = &element.default_flow {
        return Ok(ExecutionResult::next(std::slice::from_ref(default_flow)));
    }
    Err(ExecFailure::expression(format!(
        "no outgoing condition of exclusive gateway {} matched and no default flow is set",
        element.id
    )))
}

fn parallel_gateway(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    if element.incoming.len() > 1 {
        // Join side; the processor owns the atomic check-and-consume.
        return Ok(ExecutionResult::wait(Wait::Join));
    }
    fork_all(ctx, element)
}

fn inclusive_gateway(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    if element.incoming.len() > 1 {
        return Ok(ExecutionResult::wait(Wait::Join));
    }
    let vars = ctx.vars();
    let mut taken = Vec::new();
    for flow_id in &element.outgoing {
        if Some(flow_id) == element.default_flow.as_ref() {
            continue;
        }
        let Some(flow) = ctx.definition.element(flow_id) else {
            continue;
        };
        let matched = match &flow.condition {
            Some(condition) => evaluate_condition(condition, &vars)
                .map_err(|e| ExecFailure::expression(e.to_string()))?,
            None => true,
        };
        if matched {
            taken.push(flow_id.clone());
        }
    }
    if taken.is_empty() {
        match &element.default_flow {
            Some(default_flow) => taken.push(default_flow.clone()),
            None => {
                return Err(ExecFailure::expression(format!(
                    "no outgoing condition of inclusive gateway {} matched",
                    element.id
                )))
            }
        }
    }
    // Always fork (even a single branch) so the matching inclusive join
    // sees the produced-token count for this family.
    branch_tokens(ctx, element, &taken)
}

fn event_based_gateway(
    ctx: &ExecCtx<'_>,
    element: &Element,
) -> Result<ExecutionResult, ExecFailure> {
    let mut branches = Vec::new();
    for flow_id in &element.outgoing {
        let Some(target) = ctx.definition.flow_target(flow_id) else {
            continue;
        };
        let wait = match &target.event_definition {
            Some(EventDefinition::Timer { spec }) => BranchWait::Timer { spec: spec.clone() },
            Some(EventDefinition::Message { message_ref, correlation_key }) => {
                BranchWait::Message {
                    name: resolve_message_name(ctx, message_ref),
                    correlation_key: eval_correlation(ctx, correlation_key.as_deref())?,
                }
            }
            Some(EventDefinition::Signal { signal_ref }) => BranchWait::Message {
                name: format!("signal:{}", resolve_message_name(ctx, signal_ref)),
                correlation_key: String::new(),
            },
            other => {
                return Err(ExecFailure::process(format!(
                    "event gateway {} branch {} is not a timer/message catch ({other:?})",
                    element.id, target.id
                )))
            }
        };
        branches.push(EventBranch { element: target.id.clone(), wait });
    }
    if branches.is_empty() {
        return Err(ExecFailure::process(format!(
            "event gateway {} has no catchable branches",
            element.id
        )));
    }
    Ok(ExecutionResult::wait(Wait::EventGateway { branches }))
}

/// Fork one child per outgoing flow target.
fn fork_all(ctx: &ExecCtx<'_>, element: &Element) -> Result<ExecutionResult, ExecFailure> {
    if element.outgoing.len() <= 1 {
        return Ok(ExecutionResult::next(&element.outgoing));
    }
    branch_tokens(ctx, element, &element.outgoing.clone())
}

fn branch_tokens(
    ctx: &ExecCtx<'_>,
    element: &Element,
    flows: &[weir_core::ElementId],
) -> Result<ExecutionResult, ExecFailure> {
    let mut new_tokens = Vec::new();
    for flow_id in flows {
        let target = ctx.definition.flow_target(flow_id).ok_or_else(|| {
            ExecFailure::process(format!("flow {flow_id} of {} has no target", element.id))
        })?;
        new_tokens.push(NewToken {
            element: target.id.clone(),
            variables: ctx.token.variables.clone(),
        });
    }
    Ok(ExecutionResult { new_tokens, ..Default::default() })
}

/// Evaluate input/output mappings over a source scope.
pub fn apply_mappings(source: &VarMap, mappings: &[IoMapping]) -> Result<VarMap, ExecFailure> {
    if mappings.is_empty() {
        return Ok(source.clone());
    }
    let mut out = VarMap::new();
    for mapping in mappings {
        let value = evaluate_text(&mapping.source, source)
            .map_err(|e| ExecFailure::expression(format!("mapping {}: {e}", mapping.target)))?;
        out.insert(mapping.target.clone(), value);
    }
    Ok(out)
}

/// A `messageRef` points at a message declaration element; its name is the
/// published message name. Falls back to the ref itself.
fn resolve_message_name(ctx: &ExecCtx<'_>, message_ref: &str) -> String {
    ctx.definition
        .element(message_ref)
        .and_then(|m| m.name.clone())
        .unwrap_or_else(|| message_ref.to_string())
}

fn eval_correlation(
    ctx: &ExecCtx<'_>,
    correlation_key: Option<&str>,
) -> Result<String, ExecFailure> {
    let Some(expr) = correlation_key else {
        return Ok(String::new());
    };
    let value = evaluate_text(expr, &ctx.vars())
        .map_err(|e| ExecFailure::expression(format!("correlation key: {e}")))?;
    Ok(match value {
        Value::Null => String::new(),
        other => other.display_string(),
    })
}

fn build_publish(
    ctx: &ExecCtx<'_>,
    message_ref: &str,
    correlation_key: Option<&str>,
    broadcast: bool,
) -> Result<PublishSpec, ExecFailure> {
    let name = resolve_message_name(ctx, message_ref);
    let name = if broadcast { format!("signal:{name}") } else { name };
    Ok(PublishSpec {
        name,
        correlation_key: eval_correlation(ctx, correlation_key)?,
        variables: ctx.vars(),
        broadcast,
    })
}

#[cfg(test)]
#[path = "elements_tests.rs"]
mod tests;
