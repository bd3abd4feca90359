// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External job records handed to workers by the broker.

use crate::id::{InstanceId, JobKey, TimerId, TokenId};
use crate::process::ElementId;
use crate::value::VarMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job lifecycle state.
///
/// `PENDING → ACTIVATED → (COMPLETED | FAILED | CANCELLED)`; a failure with
/// retries left returns to `PENDING` after backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Activated,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled)
    }
}

crate::simple_display! {
    JobState {
        Pending => "pending",
        Activated => "activated",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// A unit of external work created by a task element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_key: JobKey,
    /// Worker subscription type (`taskDefinition.type`).
    pub job_type: String,
    pub process_instance_id: InstanceId,
    pub element_id: ElementId,
    pub token_id: TokenId,
    #[serde(default)]
    pub variables: VarMap,
    /// Headers copied from the task definition, opaque to the engine.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub retries_remaining: u32,
    /// Retries the job was created with; incidents report this.
    #[serde(default)]
    pub retries_initial: u32,
    /// Backoff before a failed job returns to PENDING, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    /// Standalone wheel timer driving the pending retry, if one is armed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_timer_id: Option<TimerId>,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at_ms: Option<u64>,
    /// Activation lease expiry; the sweeper returns the job to PENDING past it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at_ms: u64,
}

impl Job {
    /// Claim the job for a worker under an activation lease.
    pub fn activate(&mut self, worker: &str, deadline_ms: u64, now_ms: u64) {
        self.state = JobState::Activated;
        self.worker = Some(worker.to_string());
        self.activated_at_ms = Some(now_ms);
        self.deadline_ms = Some(deadline_ms);
    }

    /// Return an expired activation to the queue without burning a retry.
    pub fn release(&mut self) {
        self.state = JobState::Pending;
        self.worker = None;
        self.activated_at_ms = None;
        self.deadline_ms = None;
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            job_type: String = "work",
            element_id: ElementId = "task1",
        }
        set {
            job_key: JobKey = JobKey::new("test-job1"),
            process_instance_id: InstanceId = InstanceId::new("test-inst1"),
            token_id: TokenId = TokenId::new("test-tok1"),
            variables: VarMap = VarMap::new(),
            headers: BTreeMap<String, String> = BTreeMap::new(),
            retries_remaining: u32 = 3,
            retries_initial: u32 = 3,
            state: JobState = JobState::Pending,
            created_at_ms: u64 = 1_000_000,
        }
        option {
            retry_backoff_ms: u64 = None,
            retry_timer_id: TimerId = None,
            worker: String = None,
            activated_at_ms: u64 = None,
            deadline_ms: u64 = None,
            error_code: String = None,
            error_message: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
