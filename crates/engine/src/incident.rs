// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incident store: durable records of non-transient execution failures
//! with explicit resolve/dismiss actions.

use crate::error::EngineError;
use std::sync::Arc;
use weir_core::{
    ElementId, Incident, IncidentId, IncidentStatus, IncidentType, InstanceId, JobKey,
    LifecycleEvent, ResolveAction, TimerId, TokenId, VarMap,
};
use weir_storage::{views, Store};

/// Everything needed to open an incident.
#[derive(Debug, Clone)]
pub struct IncidentDraft {
    pub incident_type: IncidentType,
    pub message: String,
    pub error_code: Option<String>,
    pub process_instance_id: InstanceId,
    pub process_key: String,
    pub element_id: ElementId,
    pub element_type: String,
    pub token_id: Option<TokenId>,
    pub job_key: Option<JobKey>,
    pub timer_id: Option<TimerId>,
    pub original_retries: u32,
    pub metadata: VarMap,
}

/// What the engine must do after a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Restore the job's retries and re-queue it.
    RetryJob { job_key: JobKey, retries: u32 },
    /// Re-fire the originating timer.
    RetryTimer { timer_id: TimerId },
    /// Re-execute the parked token (expression and process errors).
    RetryToken { token_id: TokenId },
    /// Dismissed: cancel the parked token, then check process completion.
    Dismiss { token_id: Option<TokenId> },
}

pub struct IncidentStore {
    store: Arc<Store>,
    node: String,
}

impl IncidentStore {
    pub fn new(store: Arc<Store>, node: impl Into<String>) -> Self {
        Self { store, node: node.into() }
    }

    /// Open an incident. The caller parks the affected token on
    /// `incident:<id>`.
    pub fn create(&mut self, draft: IncidentDraft, now_ms: u64) -> Result<Incident, EngineError> {
        let incident = Incident {
            id: IncidentId::generate(&self.node),
            incident_type: draft.incident_type,
            status: IncidentStatus::Open,
            message: draft.message,
            error_code: draft.error_code,
            process_instance_id: draft.process_instance_id,
            process_key: draft.process_key,
            element_id: draft.element_id,
            element_type: draft.element_type,
            token_id: draft.token_id,
            job_key: draft.job_key,
            timer_id: draft.timer_id,
            original_retries: draft.original_retries,
            new_retries: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            resolved_at_ms: None,
            resolved_by: None,
            metadata: draft.metadata,
        };
        self.store.put(&incident)?;
        self.store.append_event(&LifecycleEvent::IncidentOpened {
            incident_id: incident.id,
            incident_type: incident.incident_type,
            instance_id: incident.process_instance_id,
        })?;
        tracing::warn!(
            incident = %incident.id,
            incident_type = %incident.incident_type,
            instance = %incident.process_instance_id,
            element = %incident.element_id,
            "incident opened"
        );
        Ok(incident)
    }

    pub fn get(&self, id: &IncidentId) -> Result<Option<Incident>, EngineError> {
        Ok(self.store.get::<Incident>(id.as_str())?)
    }

    /// List incidents, optionally filtered by status and/or instance.
    pub fn list(
        &self,
        status: Option<IncidentStatus>,
        instance: Option<&InstanceId>,
    ) -> Result<Vec<Incident>, EngineError> {
        let incidents: Vec<Incident> = match (status, instance) {
            (_, Some(instance_id)) => self
                .store
                .load_by_index(views::INCIDENTS_BY_INSTANCE, instance_id.as_str())?,
            (Some(status), None) => self
                .store
                .load_by_index(views::INCIDENTS_BY_STATUS, &status.to_string())?,
            (None, None) => {
                let mut all = Vec::new();
                for s in ["open", "resolved", "dismissed"] {
                    all.extend(
                        self.store
                            .load_by_index::<Incident>(views::INCIDENTS_BY_STATUS, s)?,
                    );
                }
                all
            }
        };
        Ok(match status {
            Some(wanted) => incidents.into_iter().filter(|i| i.status == wanted).collect(),
            None => incidents,
        })
    }

    /// Resolve an open incident; returns the follow-up action the engine
    /// must perform.
    pub fn resolve(
        &mut self,
        id: &IncidentId,
        action: ResolveAction,
        new_retries: Option<u32>,
        resolved_by: Option<&str>,
        now_ms: u64,
    ) -> Result<(Incident, ResolveOutcome), EngineError> {
        let mut incident = self
            .store
            .get::<Incident>(id.as_str())?
            .ok_or_else(|| EngineError::not_found("incident", id.as_str()))?;
        if !incident.is_open() {
            return Err(EngineError::FailedPrecondition(format!(
                "incident {id} is {}",
                incident.status
            )));
        }

        incident.new_retries = new_retries;
        incident.resolve(action, resolved_by, now_ms);
        self.store.put(&incident)?;
        self.store.append_event(&LifecycleEvent::IncidentResolved {
            incident_id: incident.id,
            action,
        })?;
        tracing::info!(incident = %id, action = %action, "incident resolved");

        let outcome = match action {
            ResolveAction::Retry => {
                if let Some(job_key) = incident.job_key {
                    ResolveOutcome::RetryJob {
                        job_key,
                        retries: new_retries.unwrap_or(incident.original_retries),
                    }
                } else if let Some(timer_id) = incident.timer_id {
                    ResolveOutcome::RetryTimer { timer_id }
                } else if let Some(token_id) = incident.token_id {
                    ResolveOutcome::RetryToken { token_id }
                } else {
                    ResolveOutcome::Dismiss { token_id: None }
                }
            }
            ResolveAction::Dismiss => ResolveOutcome::Dismiss { token_id: incident.token_id },
        };
        Ok((incident, outcome))
    }
}

#[cfg(test)]
#[path = "incident_tests.rs"]
mod tests;
