// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn retry_resolution_marks_resolved() {
    let mut incident = Incident::builder().build();
    assert!(incident.is_open());

    incident.resolve(ResolveAction::Retry, Some("ops"), 2_000_000);
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert_eq!(incident.resolved_by.as_deref(), Some("ops"));
    assert_eq!(incident.resolved_at_ms, Some(2_000_000));
}

#[test]
fn dismiss_resolution_marks_dismissed() {
    let mut incident = Incident::builder().build();
    incident.resolve(ResolveAction::Dismiss, None, 2_000_000);
    assert_eq!(incident.status, IncidentStatus::Dismissed);
    assert!(incident.resolved_by.is_none());
}

#[test]
fn incident_roundtrips_through_serde() {
    let incident = Incident::builder()
        .job_key(JobKey::new("test-job1"))
        .token_id(TokenId::new("test-tok1"))
        .error_code("E42")
        .build();
    let json = serde_json::to_string(&incident).unwrap();
    let back: Incident = serde_json::from_str(&json).unwrap();
    assert_eq!(incident, back);
}
