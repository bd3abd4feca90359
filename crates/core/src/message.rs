// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message subscriptions and the buffer for unmatched messages.

use crate::id::{MessageId, SubscriptionId, TokenId};
use crate::process::ElementId;
use crate::value::VarMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// What a matched subscription does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionType {
    /// Starts a new process instance at `start_event_id`.
    StartEvent,
    /// Wakes the waiting token referenced by `token_id`.
    IntermediateCatch,
}

crate::simple_display! {
    SubscriptionType {
        StartEvent => "start_event",
        IntermediateCatch => "intermediate_catch",
    }
}

/// An active interest in messages of a given name and correlation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSubscription {
    pub id: SubscriptionId,
    #[serde(default)]
    pub tenant_id: String,
    pub process_definition_key: String,
    pub process_version: u32,
    /// Start event to instantiate for START_EVENT subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_event_id: Option<ElementId>,
    pub message_name: SmolStr,
    /// The message element the subscription came from.
    #[serde(default)]
    pub message_ref: SmolStr,
    /// Evaluated correlation key. Empty matches only empty.
    #[serde(default)]
    pub correlation_key: String,
    pub is_active: bool,
    pub subscription_type: SubscriptionType,
    /// Waiting token for INTERMEDIATE_CATCH subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl MessageSubscription {
    /// Dedup identity: two subscriptions from the same element and
    /// correlation key are the same interest.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.process_definition_key,
            self.process_version,
            self.start_event_id.as_deref().unwrap_or(self.message_ref.as_str()),
            self.correlation_key,
        )
    }
}

/// Why a published message went to the buffer instead of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferReason {
    NoSubscription,
    NoCorrelation,
}

crate::simple_display! {
    BufferReason {
        NoSubscription => "no_subscription",
        NoCorrelation => "no_correlation",
    }
}

/// A published message waiting for a matching subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub id: MessageId,
    #[serde(default)]
    pub tenant_id: String,
    pub name: SmolStr,
    #[serde(default)]
    pub correlation_key: String,
    #[serde(default)]
    pub variables: VarMap,
    pub published_at_ms: u64,
    pub buffered_at_ms: u64,
    /// TTL expiry; `None` keeps the message until matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    pub reason: BufferReason,
}

impl BufferedMessage {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| at < now_ms)
    }
}

crate::builder! {
    pub struct MessageSubscriptionBuilder => MessageSubscription {
        into {
            process_definition_key: String = "test:v1",
            message_name: SmolStr = "order_paid",
            message_ref: SmolStr = "msg1",
            correlation_key: String = "K1",
            tenant_id: String = "",
        }
        set {
            id: SubscriptionId = SubscriptionId::new("test-sub1"),
            process_version: u32 = 1,
            is_active: bool = true,
            subscription_type: SubscriptionType = SubscriptionType::IntermediateCatch,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            start_event_id: ElementId = None,
            token_id: TokenId = None,
        }
    }
}

crate::builder! {
    pub struct BufferedMessageBuilder => BufferedMessage {
        into {
            name: SmolStr = "order_paid",
            correlation_key: String = "K1",
            tenant_id: String = "",
        }
        set {
            id: MessageId = MessageId::new("test-msg1"),
            variables: VarMap = VarMap::new(),
            published_at_ms: u64 = 1_000_000,
            buffered_at_ms: u64 = 1_000_000,
            reason: BufferReason = BufferReason::NoSubscription,
        }
        option {
            expires_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
