// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process instance state.

use crate::id::{InstanceId, TokenId};
use crate::process::ElementId;
use crate::value::VarMap;
use serde::{Deserialize, Serialize};

/// Instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Active,
    Completed,
    Cancelled,
    Failed,
    Suspended,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceState::Completed | InstanceState::Cancelled | InstanceState::Failed
        )
    }
}

crate::simple_display! {
    InstanceState {
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
        Failed => "failed",
        Suspended => "suspended",
    }
}

/// A running (or finished) execution of a deployed process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub instance_id: InstanceId,
    pub process_key: String,
    pub process_id: String,
    pub version: u32,
    #[serde(default)]
    pub tenant_id: String,
    pub state: InstanceState,
    #[serde(default)]
    pub variables: VarMap,
    /// Most recently entered activity, for observability only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<ElementId>,
    pub started_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    /// Set on children started by a call activity; completion resumes this token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_token_id: Option<TokenId>,
}

impl ProcessInstance {
    pub fn new(
        instance_id: InstanceId,
        process_id: impl Into<String>,
        version: u32,
        tenant_id: impl Into<String>,
        variables: VarMap,
        epoch_ms: u64,
    ) -> Self {
        let process_id = process_id.into();
        Self {
            instance_id,
            process_key: crate::process::process_key(&process_id, version),
            process_id,
            version,
            tenant_id: tenant_id.into(),
            state: InstanceState::Active,
            variables,
            current_activity: None,
            started_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
            completed_at_ms: None,
            parent_token_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn transition(&mut self, state: InstanceState, epoch_ms: u64) {
        self.state = state;
        self.updated_at_ms = epoch_ms;
        if state.is_terminal() {
            self.completed_at_ms = Some(epoch_ms);
        }
    }
}

crate::builder! {
    pub struct ProcessInstanceBuilder => ProcessInstance {
        into {
            process_key: String = "test:v1",
            process_id: String = "test",
            tenant_id: String = "",
        }
        set {
            instance_id: InstanceId = InstanceId::new("test-inst1"),
            version: u32 = 1,
            state: InstanceState = InstanceState::Active,
            variables: VarMap = VarMap::new(),
            started_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            current_activity: ElementId = None,
            completed_at_ms: u64 = None,
            parent_token_id: TokenId = None,
        }
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
