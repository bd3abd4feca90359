// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    timer         = { "timer:wk01-t1" },
    message       = { "message:wk01-s1" },
    job           = { "job:wk01-j1" },
    call_activity = { "call_activity:wk01-i1" },
    gateway_join  = { "gateway_join:join1" },
    incident      = { "incident:wk01-c1" },
)]
fn wait_reason_roundtrips(s: &str) {
    let reason = WaitReason::parse(s).unwrap();
    assert_eq!(reason.to_wait_string(), s);
}

#[test]
fn wait_reason_rejects_unknown_prefix() {
    assert!(WaitReason::parse("decision:abc").is_none());
    assert!(WaitReason::parse("timer").is_none());
}

#[test]
fn waiting_then_wake() {
    let mut token = Token::builder().build();
    token.set_waiting(&WaitReason::Job(JobKey::new("wk01-j9")), 2_000);

    assert_eq!(token.state, TokenState::Waiting);
    assert_eq!(token.waiting_for.as_deref(), Some("job:wk01-j9"));
    assert_eq!(token.wait_reason(), Some(WaitReason::Job(JobKey::new("wk01-j9"))));

    token.wake(3_000);
    assert_eq!(token.state, TokenState::Active);
    assert!(token.waiting_for.is_none());
    assert_eq!(token.updated_at_ms, 3_000);
}

#[test]
fn complete_is_terminal_and_stamped() {
    let mut token = Token::builder().build();
    token.complete(5_000);
    assert!(token.is_terminal());
    assert_eq!(token.completed_at_ms, Some(5_000));
}

#[test]
fn cancel_clears_wait() {
    let mut token = Token::builder().waiting_for("timer:wk01-t2").state(TokenState::Waiting).build();
    token.cancel(5_000);
    assert_eq!(token.state, TokenState::Cancelled);
    assert!(token.waiting_for.is_none());
}

#[test]
fn move_to_reactivates() {
    let mut token = Token::builder().state(TokenState::Waiting).build();
    token.move_to("next", 4_000);
    assert_eq!(token.current_element_id, "next");
    assert_eq!(token.state, TokenState::Active);
}

#[test]
fn family_prefers_fork_parent() {
    let root = Token::builder().build();
    assert_eq!(root.family(), root.token_id);

    let child = Token::builder()
        .token_id(TokenId::new("test-tok2"))
        .parent_token_id(TokenId::new("test-tok1"))
        .build();
    assert_eq!(child.family(), TokenId::new("test-tok1"));
}

#[test]
fn token_roundtrips_through_serde() {
    let token = Token::builder().waiting_for("timer:wk01-t1").build();
    let json = serde_json::to_string(&token).unwrap();
    let back: Token = serde_json::from_str(&json).unwrap();
    assert_eq!(token, back);
}
