// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secondary-index view names.
//!
//! A view maps a composite key to an ordered set of primary keys. Every
//! hot-path query in the engine goes through one of these; the raw
//! keyspace is never scanned.

pub const TOKENS_BY_INSTANCE: &str = "tokens_by_instance";
pub const TOKENS_BY_STATE: &str = "tokens_by_state";
/// Keyed by the token's full `waiting_for` string (e.g. `job:<key>`).
pub const TOKENS_BY_WAITING: &str = "tokens_by_waiting";

pub const INSTANCES_BY_STATE: &str = "instances_by_state";

/// Composite `<tenant>:<name>:<correlation_key>`.
pub const SUBSCRIPTIONS_BY_SCOPE: &str = "subscriptions_by_scope";
/// Composite `<tenant>:<name>:<correlation_key>`, ordered by publish time.
pub const BUFFERED_BY_SCOPE: &str = "buffered_by_scope";
/// All buffered messages (composite "all"), for TTL cleanup.
pub const BUFFERED_ALL: &str = "buffered_all";

/// Composite `<type>:<state>`.
pub const JOBS_BY_TYPE_STATE: &str = "jobs_by_type_state";
pub const JOBS_BY_INSTANCE: &str = "jobs_by_instance";
pub const JOBS_BY_STATE: &str = "jobs_by_state";

/// Ordered by `fires_at_ms`.
pub const TIMERS_BY_STATUS: &str = "timers_by_status";

pub const INCIDENTS_BY_STATUS: &str = "incidents_by_status";
pub const INCIDENTS_BY_INSTANCE: &str = "incidents_by_instance";

/// Composite process id, ordered by version.
pub const PROCESSES_BY_PROCESS_ID: &str = "processes_by_process_id";
/// All deployed definitions (composite "all"), for statistics.
pub const PROCESSES_ALL: &str = "processes_all";

/// Composite key for message-scope views.
pub fn message_scope(tenant: &str, name: &str, correlation_key: &str) -> String {
    format!("{tenant}:{name}:{correlation_key}")
}

/// Composite key for the job type/state view.
pub fn job_type_state(job_type: &str, state: &str) -> String {
    format!("{job_type}:{state}")
}
