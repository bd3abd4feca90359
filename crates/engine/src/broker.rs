// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job broker: the hand-off point between the interpreter and external
//! workers.
//!
//! `PENDING → ACTIVATED → (COMPLETED | FAILED | CANCELLED)`. Activation is
//! a lease: a background sweep returns expired activations to PENDING
//! without burning retries. Failures with retries left arm a standalone
//! wheel timer that flips the job back to PENDING; failures at zero
//! retries surface as incidents (handled by the engine from the returned
//! outcome).

use crate::error::EngineError;
use std::collections::BTreeMap;
use std::sync::Arc;
use weir_core::{
    ElementId, InstanceId, Job, JobKey, JobState, LifecycleEvent, TimerId, TokenId, VarMap,
};
use weir_storage::{views, Store};

/// A job the interpreter wants created for a task element.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_type: String,
    pub process_instance_id: InstanceId,
    pub element_id: ElementId,
    pub token_id: TokenId,
    pub variables: VarMap,
    pub headers: BTreeMap<String, String>,
    pub retries: u32,
    pub retry_backoff_ms: Option<u64>,
}

/// Result of completing a job.
#[derive(Debug, Clone)]
pub enum CompleteOutcome {
    /// First completion: the engine merges variables and advances the token.
    Applied { job: Job, variables: VarMap },
    /// Repeat call: success, nothing to apply.
    AlreadyCompleted,
}

/// Result of failing a job.
#[derive(Debug, Clone)]
pub enum FailOutcome {
    /// Retries remain: arm a backoff timer, job returns to PENDING on fire.
    Backoff { job: Job, delay_ms: u64 },
    /// Retries exhausted: the engine opens a JOB_FAILURE incident.
    Exhausted { job: Job },
}

pub struct JobBroker {
    store: Arc<Store>,
    node: String,
}

impl JobBroker {
    pub fn new(store: Arc<Store>, node: impl Into<String>) -> Self {
        Self { store, node: node.into() }
    }

    /// Create a PENDING job for a task element.
    pub fn create(&mut self, req: JobRequest, now_ms: u64) -> Result<Job, EngineError> {
        let job = Job {
            job_key: JobKey::generate(&self.node),
            job_type: req.job_type,
            process_instance_id: req.process_instance_id,
            element_id: req.element_id,
            token_id: req.token_id,
            variables: req.variables,
            headers: req.headers,
            retries_remaining: req.retries,
            retries_initial: req.retries,
            retry_backoff_ms: req.retry_backoff_ms,
            retry_timer_id: None,
            state: JobState::Pending,
            worker: None,
            activated_at_ms: None,
            deadline_ms: None,
            error_code: None,
            error_message: None,
            created_at_ms: now_ms,
        };
        self.store.put(&job)?;
        self.store.append_event(&LifecycleEvent::JobCreated {
            job_key: job.job_key,
            job_type: job.job_type.clone(),
            instance_id: job.process_instance_id,
        })?;
        tracing::info!(job = %job.job_key, job_type = %job.job_type, "job created");
        Ok(job)
    }

    /// Atomically claim up to `max_jobs` PENDING jobs of a type for a
    /// worker, stamping the activation lease.
    pub fn activate(
        &mut self,
        job_type: &str,
        worker: &str,
        max_jobs: usize,
        timeout_ms: u64,
        now_ms: u64,
    ) -> Result<Vec<Job>, EngineError> {
        let pending: Vec<Job> = self.store.load_by_index(
            views::JOBS_BY_TYPE_STATE,
            &views::job_type_state(job_type, "pending"),
        )?;

        let mut activated = Vec::new();
        for mut job in pending.into_iter().take(max_jobs) {
            job.activate(worker, now_ms + timeout_ms, now_ms);
            self.store.put(&job)?;
            activated.push(job);
        }
        if !activated.is_empty() {
            tracing::info!(worker, job_type, count = activated.len(), "jobs activated");
        }
        Ok(activated)
    }

    /// Return jobs whose activation lease expired to PENDING.
    /// Retries are untouched; the worker simply lost its claim.
    pub fn sweep(&mut self, now_ms: u64) -> Result<usize, EngineError> {
        let activated: Vec<Job> =
            self.store.load_by_index(views::JOBS_BY_STATE, "activated")?;
        let mut released = 0;
        for mut job in activated {
            if job.deadline_ms.is_some_and(|d| d < now_ms) {
                tracing::warn!(
                    job = %job.job_key,
                    worker = job.worker.as_deref().unwrap_or(""),
                    "activation lease expired, releasing"
                );
                job.release();
                self.store.put(&job)?;
                released += 1;
            }
        }
        Ok(released)
    }

    /// Complete a job. Idempotent: completing a COMPLETED job succeeds
    /// without applying anything.
    pub fn complete(
        &mut self,
        job_key: &JobKey,
        variables: VarMap,
    ) -> Result<CompleteOutcome, EngineError> {
        let mut job = self.require(job_key)?;
        match job.state {
            JobState::Completed => return Ok(CompleteOutcome::AlreadyCompleted),
            JobState::Cancelled => {
                return Err(EngineError::FailedPrecondition(format!(
                    "job {job_key} is cancelled"
                )))
            }
            JobState::Pending | JobState::Activated | JobState::Failed => {}
        }

        job.state = JobState::Completed;
        job.deadline_ms = None;
        self.store.put(&job)?;
        self.store
            .append_event(&LifecycleEvent::JobCompleted { job_key: *job_key })?;
        tracing::info!(job = %job_key, "job completed");
        Ok(CompleteOutcome::Applied { job, variables })
    }

    /// Fail a job, setting its remaining retries.
    pub fn fail(
        &mut self,
        job_key: &JobKey,
        new_retries: u32,
        error_message: &str,
        retry_backoff_ms: Option<u64>,
    ) -> Result<FailOutcome, EngineError> {
        let mut job = self.require(job_key)?;
        if job.state.is_terminal() {
            return Err(EngineError::FailedPrecondition(format!(
                "job {job_key} is {}",
                job.state
            )));
        }

        job.retries_remaining = new_retries;
        job.error_message = Some(error_message.to_string());
        job.worker = None;
        job.activated_at_ms = None;
        job.deadline_ms = None;
        job.state = JobState::Failed;
        if let Some(backoff) = retry_backoff_ms {
            job.retry_backoff_ms = Some(backoff);
        }
        self.store.put(&job)?;
        self.store.append_event(&LifecycleEvent::JobFailed {
            job_key: *job_key,
            retries_remaining: new_retries,
        })?;

        if new_retries > 0 {
            let delay_ms = job.retry_backoff_ms.unwrap_or(0);
            tracing::info!(job = %job_key, retries = new_retries, delay_ms, "job failed, will retry");
            Ok(FailOutcome::Backoff { job, delay_ms })
        } else {
            tracing::warn!(job = %job_key, error = error_message, "job failed with no retries left");
            Ok(FailOutcome::Exhausted { job })
        }
    }

    /// Record the standalone timer armed for a failed job's backoff.
    pub fn arm_retry_timer(
        &mut self,
        job_key: &JobKey,
        timer_id: TimerId,
    ) -> Result<(), EngineError> {
        let mut job = self.require(job_key)?;
        job.retry_timer_id = Some(timer_id);
        self.store.put(&job)?;
        Ok(())
    }

    /// Backoff elapsed: return the failed job to PENDING.
    pub fn retry_ready(&mut self, job_key: &JobKey) -> Result<(), EngineError> {
        let mut job = self.require(job_key)?;
        if job.state != JobState::Failed {
            // Cancelled or completed while the backoff timer was in flight.
            tracing::debug!(job = %job_key, state = %job.state, "retry fired on non-failed job");
            return Ok(());
        }
        job.state = JobState::Pending;
        job.retry_timer_id = None;
        self.store.put(&job)?;
        tracing::info!(job = %job_key, "job re-queued after backoff");
        Ok(())
    }

    /// Restore retries and re-queue (incident RETRY resolution).
    pub fn restore_retries(
        &mut self,
        job_key: &JobKey,
        retries: u32,
    ) -> Result<Job, EngineError> {
        let mut job = self.require(job_key)?;
        if job.state.is_terminal() {
            return Err(EngineError::FailedPrecondition(format!(
                "job {job_key} is {}",
                job.state
            )));
        }
        job.retries_remaining = retries;
        job.state = JobState::Pending;
        job.error_message = None;
        job.retry_timer_id = None;
        self.store.put(&job)?;
        tracing::info!(job = %job_key, retries, "job retries restored");
        Ok(job)
    }

    /// A worker raised a BPMN error: the job is done, the error propagates
    /// through the process. Returns the job for propagation.
    pub fn throw_error(
        &mut self,
        job_key: &JobKey,
        error_code: &str,
        error_message: &str,
    ) -> Result<Job, EngineError> {
        let mut job = self.require(job_key)?;
        if job.state.is_terminal() {
            return Err(EngineError::FailedPrecondition(format!(
                "job {job_key} is {}",
                job.state
            )));
        }
        job.state = JobState::Completed;
        job.error_code = Some(error_code.to_string());
        job.error_message = Some(error_message.to_string());
        job.deadline_ms = None;
        self.store.put(&job)?;
        self.store
            .append_event(&LifecycleEvent::JobCompleted { job_key: *job_key })?;
        tracing::info!(job = %job_key, code = error_code, "job threw BPMN error");
        Ok(job)
    }

    /// Terminal cancellation (instance cancel, interrupting boundary).
    /// Returns the retry timer to disarm, if one was pending.
    pub fn cancel(&mut self, job_key: &JobKey) -> Result<Option<TimerId>, EngineError> {
        let mut job = self.require(job_key)?;
        if job.state.is_terminal() {
            return Ok(None);
        }
        let timer = job.retry_timer_id.take();
        job.state = JobState::Cancelled;
        job.deadline_ms = None;
        self.store.put(&job)?;
        tracing::info!(job = %job_key, "job cancelled");
        Ok(timer)
    }

    pub fn get(&self, job_key: &JobKey) -> Result<Option<Job>, EngineError> {
        Ok(self.store.get::<Job>(job_key.as_str())?)
    }

    fn require(&self, job_key: &JobKey) -> Result<Job, EngineError> {
        self.store
            .get::<Job>(job_key.as_str())?
            .ok_or_else(|| EngineError::not_found("job", job_key.as_str()))
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
