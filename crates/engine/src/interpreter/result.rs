// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution results produced by element executors.
//!
//! Executors are pure: they look at the graph, the instance, and the
//! token, and return *what should happen*. The ExecutionProcessor applies
//! the result (creating jobs, timers, subscriptions, child tokens) through
//! the engine's capability interface.

use std::collections::BTreeMap;
use weir_core::{ElementId, IncidentType, ProcessDefinition, ProcessInstance, Token, VarMap};

/// Read-only context handed to element executors.
pub struct ExecCtx<'a> {
    pub definition: &'a ProcessDefinition,
    pub instance: &'a ProcessInstance,
    pub token: &'a Token,
    pub now_ms: u64,
}

impl ExecCtx<'_> {
    /// Effective variables: instance scope overlaid with token scope.
    pub fn vars(&self) -> VarMap {
        let mut vars = self.instance.variables.clone();
        for (k, v) in &self.token.variables {
            vars.insert(k.clone(), v.clone());
        }
        vars
    }
}

/// A child token the processor must create (parallel/inclusive fork).
#[derive(Debug, Clone)]
pub struct NewToken {
    /// Target element the child starts on.
    pub element: ElementId,
    pub variables: VarMap,
}

/// A BPMN error raised by an executor (error end event).
#[derive(Debug, Clone)]
pub struct BpmnError {
    pub code: String,
    pub message: String,
}

/// A message published on the way through a throw or end event.
#[derive(Debug, Clone)]
pub struct PublishSpec {
    pub name: String,
    pub correlation_key: String,
    pub variables: VarMap,
    /// Signal semantics: broadcast, never buffered for a single consumer.
    pub broadcast: bool,
}

/// One arm of an event-based gateway.
#[derive(Debug, Clone)]
pub struct EventBranch {
    /// The catch event element this branch waits on.
    pub element: ElementId,
    pub wait: BranchWait,
}

#[derive(Debug, Clone)]
pub enum BranchWait {
    Timer { spec: String },
    Message { name: String, correlation_key: String },
}

/// A wait the token enters instead of moving on.
#[derive(Debug, Clone)]
pub enum Wait {
    Timer {
        spec: String,
    },
    Message {
        name: String,
        message_ref: ElementId,
        correlation_key: String,
    },
    Job {
        job_type: String,
        variables: VarMap,
        headers: BTreeMap<String, String>,
        retries: u32,
    },
    CallActivity {
        process_id: String,
        variables: VarMap,
    },
    /// Arrival at a parallel/inclusive join.
    Join,
    /// First-of-N event race at an event-based gateway.
    EventGateway { branches: Vec<EventBranch> },
}

/// What one execution step of one element decided.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Variables to merge into the token before anything else.
    pub variables: Option<VarMap>,
    /// Publish before moving on (message/signal throw and end events).
    pub publish: Option<PublishSpec>,
    /// Run registered compensation handlers before moving on.
    pub compensate: bool,
    /// Outgoing sequence-flow ids to follow. One target moves the token;
    /// several fork it.
    pub next_elements: Vec<ElementId>,
    /// Explicit forked children (parallel/inclusive gateways).
    pub new_tokens: Vec<NewToken>,
    /// The token reached an end state.
    pub completed: bool,
    /// Park instead of moving.
    pub wait: Option<Wait>,
    /// Raise a BPMN error (starts error propagation).
    pub error: Option<BpmnError>,
}

impl ExecutionResult {
    pub fn completed() -> Self {
        Self { completed: true, ..Self::default() }
    }

    pub fn next(flows: &[ElementId]) -> Self {
        Self { next_elements: flows.to_vec(), ..Self::default() }
    }

    pub fn wait(wait: Wait) -> Self {
        Self { wait: Some(wait), ..Self::default() }
    }
}

/// An executor-level failure that becomes an incident, parking the token.
#[derive(Debug, Clone)]
pub struct ExecFailure {
    pub incident_type: IncidentType,
    pub message: String,
    pub error_code: Option<String>,
}

impl ExecFailure {
    pub fn expression(message: impl Into<String>) -> Self {
        Self {
            incident_type: IncidentType::ExpressionError,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self {
            incident_type: IncidentType::ProcessError,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn timer(message: impl Into<String>) -> Self {
        Self {
            incident_type: IncidentType::TimerError,
            message: message.into(),
            error_code: None,
        }
    }
}
