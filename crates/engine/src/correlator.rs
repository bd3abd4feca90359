// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message correlation: subscription matching, buffering, and replay.
//!
//! The correlator decides *what* a published message matches; the engine
//! performs the deliveries it returns (waking tokens, starting instances).
//! Publishing is idempotent on `request_id`: a durable marker records the
//! first outcome and repeats return it without re-delivery.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use weir_core::{
    BufferReason, BufferedMessage, LifecycleEvent, MessageId, MessageSubscription,
    SubscriptionId, SubscriptionType, VarMap,
};
use weir_storage::{views, IndexEntry, Record, Store};

/// A publish call, correlated end-to-end on `request_id`.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub tenant_id: String,
    pub name: String,
    pub correlation_key: String,
    pub variables: VarMap,
    pub ttl_ms: Option<u64>,
    pub request_id: String,
}

/// What happened to a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishDisposition {
    Correlated,
    Buffered,
}

/// Durable outcome of a publish, also the idempotence marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub request_id: String,
    pub message_id: MessageId,
    pub disposition: PublishDisposition,
    pub matched_subscriptions: Vec<SubscriptionId>,
    /// True on repeats served from the marker.
    #[serde(default)]
    pub duplicate: bool,
}

impl Record for PublishReceipt {
    const KIND: &'static str = "publish_marker";

    fn key(&self) -> String {
        self.request_id.clone()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        Vec::new()
    }
}

/// A delivery the engine must perform for a correlated message.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Wake the waiting token of an intermediate-catch subscription.
    WakeToken {
        subscription: MessageSubscription,
        variables: VarMap,
    },
    /// Start a new instance at the subscription's start event.
    StartInstance {
        subscription: MessageSubscription,
        variables: VarMap,
    },
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub receipt: PublishReceipt,
    pub deliveries: Vec<Delivery>,
}

pub struct Correlator {
    store: Arc<Store>,
    node: String,
}

impl Correlator {
    pub fn new(store: Arc<Store>, node: impl Into<String>) -> Self {
        Self { store, node: node.into() }
    }

    /// Match a message against active subscriptions, or buffer it.
    ///
    /// Intermediate-catch subscriptions are preferred over start-event
    /// subscriptions; a single intermediate consumes the message (FIFO by
    /// subscription creation), while start-event matches fan out.
    pub fn publish(&mut self, req: PublishRequest, now_ms: u64) -> Result<PublishOutcome, EngineError> {
        if let Some(mut receipt) = self.store.get::<PublishReceipt>(&req.request_id)? {
            tracing::debug!(request_id = %req.request_id, "duplicate publish, replaying receipt");
            receipt.duplicate = true;
            return Ok(PublishOutcome { receipt, deliveries: Vec::new() });
        }

        let scope = views::message_scope(&req.tenant_id, &req.name, &req.correlation_key);
        let subs: Vec<MessageSubscription> =
            self.store.load_by_index(views::SUBSCRIPTIONS_BY_SCOPE, &scope)?;
        let active: Vec<&MessageSubscription> = subs.iter().filter(|s| s.is_active).collect();

        let message_id = MessageId::generate(&self.node);
        let mut deliveries = Vec::new();
        let mut matched = Vec::new();

        if let Some(intermediate) = active
            .iter()
            .find(|s| s.subscription_type == SubscriptionType::IntermediateCatch)
        {
            let mut consumed = (*intermediate).clone();
            consumed.is_active = false;
            consumed.updated_at_ms = now_ms;
            self.store.put(&consumed)?;
            matched.push(consumed.id);
            deliveries.push(Delivery::WakeToken {
                subscription: consumed,
                variables: req.variables.clone(),
            });
        } else {
            for sub in active
                .iter()
                .filter(|s| s.subscription_type == SubscriptionType::StartEvent)
            {
                matched.push(sub.id);
                deliveries.push(Delivery::StartInstance {
                    subscription: (*sub).clone(),
                    variables: req.variables.clone(),
                });
            }
        }

        let disposition = if matched.is_empty() {
            let message = BufferedMessage {
                id: message_id,
                tenant_id: req.tenant_id.clone(),
                name: req.name.clone().into(),
                correlation_key: req.correlation_key.clone(),
                variables: req.variables.clone(),
                published_at_ms: now_ms,
                buffered_at_ms: now_ms,
                expires_at_ms: req.ttl_ms.map(|ttl| now_ms + ttl),
                reason: BufferReason::NoSubscription,
            };
            self.store.put(&message)?;
            tracing::info!(name = %req.name, key = %req.correlation_key, "message buffered");
            PublishDisposition::Buffered
        } else {
            PublishDisposition::Correlated
        };

        let receipt = PublishReceipt {
            request_id: req.request_id.clone(),
            message_id,
            disposition,
            matched_subscriptions: matched,
            duplicate: false,
        };
        self.store.put(&receipt)?;
        self.store.append_event(&LifecycleEvent::MessagePublished {
            message_id,
            name: req.name.clone(),
            correlation_key: req.correlation_key.clone(),
            disposition: match disposition {
                PublishDisposition::Correlated => "correlated".to_string(),
                PublishDisposition::Buffered => "buffered".to_string(),
            },
        })?;

        Ok(PublishOutcome { receipt, deliveries })
    }

    /// Persist a subscription and replay matching buffered messages.
    ///
    /// Duplicate subscriptions (same definition, element, and correlation)
    /// are idempotent: the existing record is reused and replay still runs.
    /// Each replayed message is removed before it is handed out, so it is
    /// delivered exactly once. An intermediate catch consumes at most one
    /// buffered message; start-event subscriptions drain the whole bucket.
    pub fn create_subscription(
        &mut self,
        sub: MessageSubscription,
    ) -> Result<(MessageSubscription, Vec<BufferedMessage>), EngineError> {
        let scope = views::message_scope(&sub.tenant_id, &sub.message_name, &sub.correlation_key);
        let existing: Vec<MessageSubscription> =
            self.store.load_by_index(views::SUBSCRIPTIONS_BY_SCOPE, &scope)?;
        let sub = match existing
            .into_iter()
            .find(|s| s.is_active && s.dedup_key() == sub.dedup_key())
        {
            Some(present) => {
                tracing::debug!(id = %present.id, "duplicate subscription, reusing");
                present
            }
            None => {
                self.store.put(&sub)?;
                sub
            }
        };

        let buffered: Vec<BufferedMessage> =
            self.store.load_by_index(views::BUFFERED_BY_SCOPE, &scope)?;
        let take = match sub.subscription_type {
            SubscriptionType::IntermediateCatch => 1,
            SubscriptionType::StartEvent => buffered.len(),
        };

        let mut replayed = Vec::new();
        for message in buffered.into_iter().take(take) {
            // Removed before delivery: replay happens exactly once.
            self.store.delete::<BufferedMessage>(message.id.as_str())?;
            replayed.push(message);
        }
        if !replayed.is_empty() {
            tracing::info!(
                subscription = %sub.id,
                count = replayed.len(),
                "replayed buffered messages"
            );
        }
        Ok((sub, replayed))
    }

    /// Deactivate a subscription (token cancelled, boundary removed).
    pub fn cancel_subscription(&mut self, id: &SubscriptionId, now_ms: u64) -> Result<(), EngineError> {
        if let Some(mut sub) = self.store.get::<MessageSubscription>(id.as_str())? {
            if sub.is_active {
                sub.is_active = false;
                sub.updated_at_ms = now_ms;
                self.store.put(&sub)?;
            }
        }
        Ok(())
    }

    /// Remove expired buffered messages; returns how many were dropped.
    pub fn cleanup(&mut self, now_ms: u64) -> Result<usize, EngineError> {
        let all: Vec<BufferedMessage> = self.store.load_by_index(views::BUFFERED_ALL, "all")?;
        let mut removed = 0;
        for message in all {
            if message.is_expired(now_ms) {
                self.store.delete::<BufferedMessage>(message.id.as_str())?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "expired buffered messages cleaned up");
        }
        Ok(removed)
    }

}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
