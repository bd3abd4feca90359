// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn activate_stamps_lease() {
    let mut job = Job::builder().build();
    job.activate("worker-7", 1_030_000, 1_000_000);

    assert_eq!(job.state, JobState::Activated);
    assert_eq!(job.worker.as_deref(), Some("worker-7"));
    assert_eq!(job.activated_at_ms, Some(1_000_000));
    assert_eq!(job.deadline_ms, Some(1_030_000));
}

#[test]
fn release_returns_to_pending_without_touching_retries() {
    let mut job = Job::builder().build();
    job.activate("worker-7", 1_030_000, 1_000_000);
    job.release();

    assert_eq!(job.state, JobState::Pending);
    assert!(job.worker.is_none());
    assert!(job.deadline_ms.is_none());
    assert_eq!(job.retries_remaining, 3);
}

#[yare::parameterized(
    pending   = { JobState::Pending, false },
    activated = { JobState::Activated, false },
    completed = { JobState::Completed, true },
    failed    = { JobState::Failed, false },
    cancelled = { JobState::Cancelled, true },
)]
fn terminal_states(state: JobState, expected: bool) {
    assert_eq!(state.is_terminal(), expected);
}

#[test]
fn job_roundtrips_through_serde() {
    let job = Job::builder()
        .worker("w")
        .error_message("boom")
        .retry_backoff_ms(5_000u64)
        .build();
    let json = serde_json::to_string(&job).unwrap();
    let back: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(job, back);
}
