// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incident records for non-transient execution failures.

use crate::id::{IncidentId, InstanceId, JobKey, TimerId, TokenId};
use crate::process::ElementId;
use crate::value::VarMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    JobFailure,
    BpmnError,
    ExpressionError,
    ProcessError,
    TimerError,
    MessageError,
    SystemError,
}

crate::simple_display! {
    IncidentType {
        JobFailure => "job_failure",
        BpmnError => "bpmn_error",
        ExpressionError => "expression_error",
        ProcessError => "process_error",
        TimerError => "timer_error",
        MessageError => "message_error",
        SystemError => "system_error",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Open,
    Resolved,
    Dismissed,
}

crate::simple_display! {
    IncidentStatus {
        Open => "open",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
}

/// Operator action when resolving an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveAction {
    /// Restore retries and re-enqueue the failed operation.
    Retry,
    /// Give up: cancel the parked token.
    Dismiss,
}

crate::simple_display! {
    ResolveAction {
        Retry => "retry",
        Dismiss => "dismiss",
    }
}

/// A durable record of a non-transient execution failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub status: IncidentStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub process_instance_id: InstanceId,
    pub process_key: String,
    pub element_id: ElementId,
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_key: Option<JobKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_id: Option<TimerId>,
    /// Retries the job had when it was first created; RETRY restores these
    /// unless the resolver supplies its own count.
    #[serde(default)]
    pub original_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_retries: Option<u32>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "VarMap::is_empty")]
    pub metadata: VarMap,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }

    /// Close the incident with the given outcome.
    pub fn resolve(&mut self, action: ResolveAction, resolved_by: Option<&str>, epoch_ms: u64) {
        self.status = match action {
            ResolveAction::Retry => IncidentStatus::Resolved,
            ResolveAction::Dismiss => IncidentStatus::Dismissed,
        };
        self.resolved_at_ms = Some(epoch_ms);
        self.resolved_by = resolved_by.map(str::to_string);
        self.updated_at_ms = epoch_ms;
    }
}

crate::builder! {
    pub struct IncidentBuilder => Incident {
        into {
            message: String = "job failed",
            process_key: String = "test:v1",
            element_id: ElementId = "task1",
            element_type: String = "serviceTask",
        }
        set {
            id: IncidentId = IncidentId::new("test-inc1"),
            incident_type: IncidentType = IncidentType::JobFailure,
            status: IncidentStatus = IncidentStatus::Open,
            process_instance_id: InstanceId = InstanceId::new("test-inst1"),
            original_retries: u32 = 3,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
            metadata: VarMap = VarMap::new(),
        }
        option {
            error_code: String = None,
            token_id: TokenId = None,
            job_key: JobKey = None,
            timer_id: TimerId = None,
            new_retries: u32 = None,
            resolved_at_ms: u64 = None,
            resolved_by: String = None,
        }
    }
}

#[cfg(test)]
#[path = "incident_tests.rs"]
mod tests;
