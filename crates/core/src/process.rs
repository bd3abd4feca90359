// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Normalized process definition graph.
//!
//! A deployed process is an immutable mapping of element id to element
//! descriptor. The engine never sees BPMN XML; the out-of-scope parser
//! hands it this normalized form. Sequence flows are elements too: a
//! flow's target is the element whose `incoming` list names the flow.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Element identifier within a process graph (BPMN id or 24-char content hash).
pub type ElementId = SmolStr;

/// BPMN element kinds the interpreter executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    StartEvent,
    EndEvent,
    IntermediateCatchEvent,
    IntermediateThrowEvent,
    BoundaryEvent,
    ServiceTask,
    SendTask,
    BusinessRuleTask,
    UserTask,
    ReceiveTask,
    ManualTask,
    ScriptTask,
    CallActivity,
    SubProcess,
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    EventBasedGateway,
    SequenceFlow,
    Message,
    Error,
    Signal,
    Escalation,
}

impl ElementType {
    /// Activities are elements boundary events can attach to.
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            ElementType::ServiceTask
                | ElementType::SendTask
                | ElementType::BusinessRuleTask
                | ElementType::UserTask
                | ElementType::ReceiveTask
                | ElementType::ManualTask
                | ElementType::ScriptTask
                | ElementType::CallActivity
                | ElementType::SubProcess
        )
    }

    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            ElementType::ExclusiveGateway
                | ElementType::ParallelGateway
                | ElementType::InclusiveGateway
                | ElementType::EventBasedGateway
        )
    }
}

crate::simple_display! {
    ElementType {
        StartEvent => "startEvent",
        EndEvent => "endEvent",
        IntermediateCatchEvent => "intermediateCatchEvent",
        IntermediateThrowEvent => "intermediateThrowEvent",
        BoundaryEvent => "boundaryEvent",
        ServiceTask => "serviceTask",
        SendTask => "sendTask",
        BusinessRuleTask => "businessRuleTask",
        UserTask => "userTask",
        ReceiveTask => "receiveTask",
        ManualTask => "manualTask",
        ScriptTask => "scriptTask",
        CallActivity => "callActivity",
        SubProcess => "subProcess",
        ExclusiveGateway => "exclusiveGateway",
        ParallelGateway => "parallelGateway",
        InclusiveGateway => "inclusiveGateway",
        EventBasedGateway => "eventBasedGateway",
        SequenceFlow => "sequenceFlow",
        Message => "message",
        Error => "error",
        Signal => "signal",
        Escalation => "escalation",
    }
}

/// Event definition attached to catch/throw/boundary/start/end events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDefinition {
    /// ISO-8601 duration, RFC-3339 date, or `R[N]/…` cycle.
    Timer { spec: String },
    /// References a message element; correlation key is an expression
    /// evaluated against the instance variables.
    Message {
        message_ref: ElementId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_key: Option<String>,
    },
    Signal { signal_ref: ElementId },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    Escalation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        escalation_code: Option<String>,
    },
    Conditional { condition: String },
    Compensation,
}

/// A single input or output variable mapping on a task or call activity.
///
/// `source` is an expression evaluated against the originating scope;
/// `target` is the variable name written in the receiving scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoMapping {
    pub source: String,
    pub target: String,
}

/// One node (or flow) of the normalized process graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incoming sequence-flow ids. A flow's target is the element listing it here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incoming: Vec<ElementId>,
    /// Outgoing sequence-flow ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outgoing: Vec<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_definition: Option<EventDefinition>,
    /// Boundary binding: the activity this boundary event is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to_ref: Option<ElementId>,
    /// Whether a firing boundary event cancels its host activity.
    #[serde(default = "default_true")]
    pub cancel_activity: bool,
    /// Worker subscription type for service/send/business-rule tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    /// Retries expression for jobs created from this element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_retries: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_mappings: Vec<IoMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_mappings: Vec<IoMapping>,
    /// Headers copied verbatim onto jobs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Condition expression (sequence flows out of exclusive/inclusive gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Default flow id (exclusive/inclusive gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_flow: Option<ElementId>,
    /// Target process id for call activities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_process_id: Option<String>,
    /// Script expression for script tasks; result merges into token variables
    /// under `result_variable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_variable: Option<String>,
    /// Enclosing sub-process element, if any. Used for scope walks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ElementId>,
}

fn default_true() -> bool {
    true
}

impl Element {
    /// Minimal element with the given id and type; everything else empty.
    pub fn new(id: impl Into<ElementId>, element_type: ElementType) -> Self {
        Self {
            id: id.into(),
            element_type,
            name: None,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            event_definition: None,
            attached_to_ref: None,
            cancel_activity: true,
            task_type: None,
            task_retries: None,
            input_mappings: Vec::new(),
            output_mappings: Vec::new(),
            headers: BTreeMap::new(),
            condition: None,
            default_flow: None,
            called_process_id: None,
            script: None,
            result_variable: None,
            scope: None,
        }
    }
}

/// An immutable, deployed process definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub process_id: String,
    pub version: u32,
    #[serde(default)]
    pub tenant_id: String,
    /// 24-char content hash over the element graph. Deploy dedupe key.
    pub content_hash: String,
    pub elements: BTreeMap<ElementId, Element>,
}

impl ProcessDefinition {
    /// Build a definition, computing the content hash from the graph.
    pub fn new(
        process_id: impl Into<String>,
        version: u32,
        tenant_id: impl Into<String>,
        elements: Vec<Element>,
    ) -> Self {
        let elements: BTreeMap<ElementId, Element> =
            elements.into_iter().map(|e| (e.id.clone(), e)).collect();
        let process_id = process_id.into();
        let content_hash = hash_elements(&process_id, &elements);
        Self { process_id, version, tenant_id: tenant_id.into(), content_hash, elements }
    }

    /// `<process_id>:v<version>` — the unique key of this deployed version.
    pub fn process_key(&self) -> String {
        process_key(&self.process_id, self.version)
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    /// The element a sequence flow leads to: the one naming the flow in `incoming`.
    pub fn flow_target(&self, flow_id: &str) -> Option<&Element> {
        self.elements
            .values()
            .find(|e| e.incoming.iter().any(|f| f == flow_id))
    }

    /// The element a sequence flow departs from.
    pub fn flow_source(&self, flow_id: &str) -> Option<&Element> {
        self.elements
            .values()
            .find(|e| e.outgoing.iter().any(|f| f == flow_id))
    }

    /// All start events, in element-id order. `scope=None` filters to
    /// top-level starts; otherwise starts of the given sub-process.
    pub fn start_events(&self, scope: Option<&str>) -> Vec<&Element> {
        self.elements
            .values()
            .filter(|e| {
                e.element_type == ElementType::StartEvent
                    && e.scope.as_deref() == scope
            })
            .collect()
    }

    /// The single no-event-definition start event of the top-level scope.
    pub fn none_start_event(&self) -> Option<&Element> {
        self.start_events(None)
            .into_iter()
            .find(|e| e.event_definition.is_none())
    }

    /// Boundary events attached to the given activity.
    pub fn boundary_events_for(&self, activity_id: &str) -> Vec<&Element> {
        self.elements
            .values()
            .filter(|e| {
                e.element_type == ElementType::BoundaryEvent
                    && e.attached_to_ref.as_deref() == Some(activity_id)
            })
            .collect()
    }

    /// Elements directly inside the given sub-process scope.
    pub fn elements_in_scope(&self, scope_id: &str) -> Vec<&Element> {
        self.elements
            .values()
            .filter(|e| e.scope.as_deref() == Some(scope_id))
            .collect()
    }

    /// Count of executable elements (everything except flows and
    /// message/error/signal declarations). Used by engine statistics.
    pub fn executable_element_count(&self) -> usize {
        self.elements
            .values()
            .filter(|e| {
                !matches!(
                    e.element_type,
                    ElementType::SequenceFlow
                        | ElementType::Message
                        | ElementType::Error
                        | ElementType::Signal
                        | ElementType::Escalation
                )
            })
            .count()
    }
}

/// `<process_id>:v<version>`
pub fn process_key(process_id: &str, version: u32) -> String {
    format!("{process_id}:v{version}")
}

/// 24-char hex content hash over the canonical JSON of the graph.
fn hash_elements(process_id: &str, elements: &BTreeMap<ElementId, Element>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(process_id.as_bytes());
    // BTreeMap iteration is ordered, so the serialization is canonical.
    if let Ok(bytes) = serde_json::to_vec(elements) {
        hasher.update(&bytes);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(24);
    for byte in digest.iter().take(12) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
