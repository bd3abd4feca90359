// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn dedup_key_uses_start_event_when_present() {
    let sub = MessageSubscription::builder()
        .start_event_id(ElementId::new("msgStart"))
        .subscription_type(SubscriptionType::StartEvent)
        .build();
    assert_eq!(sub.dedup_key(), "test:v1:1:msgStart:K1");
}

#[test]
fn dedup_key_falls_back_to_message_ref() {
    let sub = MessageSubscription::builder().build();
    assert_eq!(sub.dedup_key(), "test:v1:1:msg1:K1");
}

#[test]
fn expiry_is_strict() {
    let msg = BufferedMessage::builder().expires_at_ms(2_000u64).build();
    assert!(!msg.is_expired(1_999));
    assert!(!msg.is_expired(2_000));
    assert!(msg.is_expired(2_001));
}

#[test]
fn no_ttl_never_expires() {
    let msg = BufferedMessage::builder().build();
    assert!(!msg.is_expired(u64::MAX));
}
