// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events appended to the durable event log.
//!
//! Events are facts about what happened; components never read them back
//! to rebuild state (records are authoritative), but the log gives
//! operators and tests an ordered history of every transition.
//!
//! Serializes with `{"type": "object:verb", ...fields}` format.

use crate::id::{IncidentId, InstanceId, JobKey, MessageId, TimerId};
use crate::incident::{IncidentType, ResolveAction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    // -- process --
    #[serde(rename = "process:deployed")]
    ProcessDeployed {
        process_key: String,
        content_hash: String,
    },

    // -- instance --
    #[serde(rename = "instance:started")]
    InstanceStarted {
        instance_id: InstanceId,
        process_key: String,
    },

    #[serde(rename = "instance:completed")]
    InstanceCompleted { instance_id: InstanceId },

    #[serde(rename = "instance:cancelled")]
    InstanceCancelled { instance_id: InstanceId },

    #[serde(rename = "instance:failed")]
    InstanceFailed {
        instance_id: InstanceId,
        reason: String,
    },

    // -- job --
    #[serde(rename = "job:created")]
    JobCreated {
        job_key: JobKey,
        job_type: String,
        instance_id: InstanceId,
    },

    #[serde(rename = "job:completed")]
    JobCompleted { job_key: JobKey },

    #[serde(rename = "job:failed")]
    JobFailed {
        job_key: JobKey,
        retries_remaining: u32,
    },

    // -- timer --
    #[serde(rename = "timer:scheduled")]
    TimerScheduled { timer_id: TimerId },

    #[serde(rename = "timer:fired")]
    TimerFired { timer_id: TimerId },

    #[serde(rename = "timer:cancelled")]
    TimerCancelled { timer_id: TimerId },

    // -- message --
    #[serde(rename = "message:published")]
    MessagePublished {
        message_id: MessageId,
        name: String,
        correlation_key: String,
        /// "correlated" or "buffered"
        disposition: String,
    },

    // -- incident --
    #[serde(rename = "incident:opened")]
    IncidentOpened {
        incident_id: IncidentId,
        incident_type: IncidentType,
        instance_id: InstanceId,
    },

    #[serde(rename = "incident:resolved")]
    IncidentResolved {
        incident_id: IncidentId,
        action: ResolveAction,
    },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl LifecycleEvent {
    /// Short summary for log lines.
    pub fn log_summary(&self) -> String {
        match self {
            LifecycleEvent::ProcessDeployed { process_key, .. } => {
                format!("process:deployed {process_key}")
            }
            LifecycleEvent::InstanceStarted { instance_id, process_key } => {
                format!("instance:started {instance_id} {process_key}")
            }
            LifecycleEvent::InstanceCompleted { instance_id } => {
                format!("instance:completed {instance_id}")
            }
            LifecycleEvent::InstanceCancelled { instance_id } => {
                format!("instance:cancelled {instance_id}")
            }
            LifecycleEvent::InstanceFailed { instance_id, .. } => {
                format!("instance:failed {instance_id}")
            }
            LifecycleEvent::JobCreated { job_key, job_type, .. } => {
                format!("job:created {job_key} type={job_type}")
            }
            LifecycleEvent::JobCompleted { job_key } => format!("job:completed {job_key}"),
            LifecycleEvent::JobFailed { job_key, retries_remaining } => {
                format!("job:failed {job_key} retries={retries_remaining}")
            }
            LifecycleEvent::TimerScheduled { timer_id } => {
                format!("timer:scheduled {timer_id}")
            }
            LifecycleEvent::TimerFired { timer_id } => format!("timer:fired {timer_id}"),
            LifecycleEvent::TimerCancelled { timer_id } => {
                format!("timer:cancelled {timer_id}")
            }
            LifecycleEvent::MessagePublished { name, disposition, .. } => {
                format!("message:published {name} {disposition}")
            }
            LifecycleEvent::IncidentOpened { incident_id, incident_type, .. } => {
                format!("incident:opened {incident_id} {incident_type}")
            }
            LifecycleEvent::IncidentResolved { incident_id, action } => {
                format!("incident:resolved {incident_id} {action}")
            }
            LifecycleEvent::Custom => "custom".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
