// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution token state machine.
//!
//! A token is the mobile unit of execution: it sits on one element of the
//! process graph, carries variables, and either runs, waits on an external
//! resource, or has reached a terminal state. The `waiting_for` string
//! discriminates the wait source and round-trips through [`WaitReason`].

use crate::id::{IncidentId, InstanceId, JobKey, SubscriptionId, TimerId, TokenId};
use crate::process::ElementId;
use crate::value::VarMap;
use serde::{Deserialize, Serialize};

/// Token lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    Active,
    Waiting,
    Completed,
    Cancelled,
}

impl TokenState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenState::Completed | TokenState::Cancelled)
    }
}

crate::simple_display! {
    TokenState {
        Active => "active",
        Waiting => "waiting",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

/// Parsed representation of a token's `waiting_for` discriminator.
///
/// String forms: `timer:<id>`, `message:<subscription>`, `job:<key>`,
/// `call_activity:<child instance>`, `gateway_join:<element>`,
/// `incident:<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitReason {
    Timer(TimerId),
    Message(SubscriptionId),
    Job(JobKey),
    CallActivity(InstanceId),
    GatewayJoin(ElementId),
    Incident(IncidentId),
}

impl WaitReason {
    /// Parse a `waiting_for` string. Returns `None` for unrecognized forms.
    pub fn parse(s: &str) -> Option<WaitReason> {
        if let Some(rest) = s.strip_prefix("timer:") {
            return Some(WaitReason::Timer(TimerId::new(rest)));
        }
        if let Some(rest) = s.strip_prefix("message:") {
            return Some(WaitReason::Message(SubscriptionId::new(rest)));
        }
        if let Some(rest) = s.strip_prefix("job:") {
            return Some(WaitReason::Job(JobKey::new(rest)));
        }
        if let Some(rest) = s.strip_prefix("call_activity:") {
            return Some(WaitReason::CallActivity(InstanceId::new(rest)));
        }
        if let Some(rest) = s.strip_prefix("gateway_join:") {
            return Some(WaitReason::GatewayJoin(ElementId::new(rest)));
        }
        if let Some(rest) = s.strip_prefix("incident:") {
            return Some(WaitReason::Incident(IncidentId::new(rest)));
        }
        None
    }

    /// Canonical string form stored on the token.
    pub fn to_wait_string(&self) -> String {
        match self {
            WaitReason::Timer(id) => format!("timer:{id}"),
            WaitReason::Message(id) => format!("message:{id}"),
            WaitReason::Job(key) => format!("job:{key}"),
            WaitReason::CallActivity(id) => format!("call_activity:{id}"),
            WaitReason::GatewayJoin(el) => format!("gateway_join:{el}"),
            WaitReason::Incident(id) => format!("incident:{id}"),
        }
    }
}

/// The unit of execution advancing through a process graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token_id: TokenId,
    pub process_instance_id: InstanceId,
    pub process_key: String,
    pub current_element_id: ElementId,
    /// Set on fork children; joins count arrivals per parent family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_token_id: Option<TokenId>,
    pub state: TokenState,
    /// Wait discriminator; see [`WaitReason`]. `None` while active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<String>,
    #[serde(default)]
    pub variables: VarMap,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

impl Token {
    /// New active token positioned at `element`.
    pub fn new(
        token_id: TokenId,
        instance_id: InstanceId,
        process_key: impl Into<String>,
        element: impl Into<ElementId>,
        epoch_ms: u64,
    ) -> Self {
        Self {
            token_id,
            process_instance_id: instance_id,
            process_key: process_key.into(),
            current_element_id: element.into(),
            parent_token_id: None,
            state: TokenState::Active,
            waiting_for: None,
            variables: VarMap::new(),
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
            completed_at_ms: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Parsed wait reason, if the token is waiting on a recognized source.
    pub fn wait_reason(&self) -> Option<WaitReason> {
        self.waiting_for.as_deref().and_then(WaitReason::parse)
    }

    /// Park the token on the given wait source.
    pub fn set_waiting(&mut self, reason: &WaitReason, epoch_ms: u64) {
        self.state = TokenState::Waiting;
        self.waiting_for = Some(reason.to_wait_string());
        self.updated_at_ms = epoch_ms;
    }

    /// Clear the wait and return the token to active execution.
    pub fn wake(&mut self, epoch_ms: u64) {
        self.state = TokenState::Active;
        self.waiting_for = None;
        self.updated_at_ms = epoch_ms;
    }

    pub fn complete(&mut self, epoch_ms: u64) {
        self.state = TokenState::Completed;
        self.waiting_for = None;
        self.updated_at_ms = epoch_ms;
        self.completed_at_ms = Some(epoch_ms);
    }

    pub fn cancel(&mut self, epoch_ms: u64) {
        self.state = TokenState::Cancelled;
        self.waiting_for = None;
        self.updated_at_ms = epoch_ms;
        self.completed_at_ms = Some(epoch_ms);
    }

    /// Move the token to a new element, keeping it active.
    pub fn move_to(&mut self, element: impl Into<ElementId>, epoch_ms: u64) {
        self.current_element_id = element.into();
        self.state = TokenState::Active;
        self.waiting_for = None;
        self.updated_at_ms = epoch_ms;
    }

    /// The token family a join counts this token under: the fork parent
    /// when present, otherwise the token itself.
    pub fn family(&self) -> TokenId {
        self.parent_token_id.unwrap_or(self.token_id)
    }
}

crate::builder! {
    pub struct TokenBuilder => Token {
        into {
            process_key: String = "test:v1",
            current_element_id: ElementId = "start",
        }
        set {
            token_id: TokenId = TokenId::new("test-tok1"),
            process_instance_id: InstanceId = InstanceId::new("test-inst1"),
            state: TokenState = TokenState::Active,
            variables: VarMap = VarMap::new(),
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            parent_token_id: TokenId = None,
            waiting_for: String = None,
            completed_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
