// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The public engine facade.
//!
//! Wires storage, the timing wheel, the broker, the correlator, the
//! incident store, and the interpreter together, and exposes the uniform
//! operations the (out-of-scope) RPC layer consumes. Cross-component
//! notifications travel as envelopes through component mailboxes;
//! `settle` drains them until quiet. The async `run` driver ticks the
//! wheel and the periodic sweeps.

use crate::broker::{CompleteOutcome, FailOutcome, JobBroker, JobRequest};
use crate::bus::Dispatcher;
use crate::config::EngineConfig;
use crate::correlator::{Correlator, Delivery, PublishReceipt, PublishRequest};
use crate::error::EngineError;
use crate::incident::{IncidentDraft, IncidentStore, ResolveOutcome};
use crate::interpreter::{EngineServices, Interpreter};
use crate::wheel::{TimerInfo, TimingWheel};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weir_core::{
    Clock, ElementId, EventDefinition, Incident, IncidentId, IncidentStatus, IncidentType,
    InstanceId, InstanceState, Job, JobKey, LifecycleEvent, MessageSubscription,
    ProcessDefinition, ProcessInstance, RequestEnvelope, ResolveAction, SubscriptionId,
    SubscriptionType, TimeSpec, TimerBinding, TimerId, TimerKind, TimerRecord, TimerStatus,
    Token, TokenId, Value, VarMap,
};
use weir_storage::{views, Store};

const COMPONENT_INTERPRETER: &str = "interpreter";
const COMPONENT_CORRELATOR: &str = "correlator";
const COMPONENT_BROKER: &str = "broker";

/// Real counters exposed by `stats`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub deployed_processes: usize,
    pub executable_elements: usize,
    pub instances_by_state: BTreeMap<String, usize>,
    pub pending_jobs: usize,
    pub scheduled_timers: usize,
    pub buffered_messages: usize,
    pub open_incidents: usize,
}

struct EngineInner<C: Clock> {
    config: EngineConfig,
    clock: C,
    store: Arc<Store>,
    wheel: Mutex<TimingWheel>,
    broker: Mutex<JobBroker>,
    correlator: Mutex<Correlator>,
    incidents: Mutex<IncidentStore>,
    interpreter: Interpreter,
    dispatcher: Dispatcher,
}

/// The workflow engine: a facade over the execution substrate.
pub struct Engine<C: Clock> {
    inner: Arc<EngineInner<C>>,
}

impl<C: Clock> Clone for Engine<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> Engine<C> {
    /// Open the engine over a storage directory, recovering persisted
    /// timers (overdue ones fire immediately).
    pub fn open(dir: &Path, config: EngineConfig, clock: C) -> Result<Self, EngineError> {
        let store = Arc::new(Store::open(dir)?);
        let now = clock.epoch_ms();
        let node = config.node_prefix.clone();

        let mut wheel = TimingWheel::new(config.wheel.clone(), Arc::clone(&store), now);
        let overdue = wheel.recover(now)?;

        let inner = Arc::new(EngineInner {
            dispatcher: Dispatcher::new(config.mailbox_capacity),
            wheel: Mutex::new(wheel),
            broker: Mutex::new(JobBroker::new(Arc::clone(&store), node.clone())),
            correlator: Mutex::new(Correlator::new(Arc::clone(&store), node.clone())),
            incidents: Mutex::new(IncidentStore::new(Arc::clone(&store), node)),
            interpreter: Interpreter::new(Arc::clone(&store)),
            config,
            clock,
            store,
        });

        let engine = Self { inner };
        for record in overdue {
            engine.inner.route_fired_timer(&record)?;
        }
        engine.settle()?;
        Ok(engine)
    }

    // ── Deploy ──────────────────────────────────────────────────────────

    /// Install a parsed process graph. Re-deploying identical content is a
    /// no-op returning the existing version unless `force` bumps it.
    pub fn deploy(
        &self,
        definition: ProcessDefinition,
        force: bool,
    ) -> Result<ProcessDefinition, EngineError> {
        let versions: Vec<ProcessDefinition> = self
            .inner
            .store
            .load_by_index(views::PROCESSES_BY_PROCESS_ID, &definition.process_id)?;
        let latest = versions.last();

        if let Some(existing) = latest {
            if existing.content_hash == definition.content_hash && !force {
                tracing::info!(
                    process = %existing.process_key(),
                    "deploy deduplicated on content hash"
                );
                return Ok(existing.clone());
            }
        }
        let version = latest.map(|d| d.version + 1).unwrap_or(1);
        let mut definition = definition;
        definition.version = version;

        self.inner.store.put(&definition)?;
        self.inner.store.append_event(&LifecycleEvent::ProcessDeployed {
            process_key: definition.process_key(),
            content_hash: definition.content_hash.clone(),
        })?;
        tracing::info!(process = %definition.process_key(), "process deployed");

        // Message start events subscribe immediately so publishes can
        // create instances.
        let now = self.inner.now_ms();
        for start in definition.start_events(None) {
            let Some(EventDefinition::Message { message_ref, correlation_key }) =
                &start.event_definition
            else {
                continue;
            };
            let name = definition
                .element(message_ref)
                .and_then(|m| m.name.clone())
                .unwrap_or_else(|| message_ref.to_string());
            let key = correlation_key.clone().unwrap_or_default();
            let subscription = MessageSubscription {
                id: SubscriptionId::generate(self.inner.node()),
                tenant_id: definition.tenant_id.clone(),
                process_definition_key: definition.process_key(),
                process_version: definition.version,
                start_event_id: Some(start.id.clone()),
                message_name: name.into(),
                message_ref: message_ref.clone(),
                correlation_key: key,
                is_active: true,
                subscription_type: SubscriptionType::StartEvent,
                token_id: None,
                created_at_ms: now,
                updated_at_ms: now,
            };
            self.inner.create_subscription(subscription)?;
        }
        self.settle()?;
        Ok(definition)
    }

    pub fn get_process(&self, process_key: &str) -> Result<ProcessDefinition, EngineError> {
        self.inner.definition(process_key)
    }

    // ── Instances ───────────────────────────────────────────────────────

    /// Start an instance of a deployed process. Accepts a process id
    /// (latest version) or an explicit `<id>:v<n>` key.
    pub fn start_instance(
        &self,
        process: &str,
        variables: VarMap,
        tenant: Option<&str>,
    ) -> Result<ProcessInstance, EngineError> {
        let definition = self.inner.resolve_process(process)?;
        let start = definition
            .none_start_event()
            .ok_or_else(|| {
                EngineError::FailedPrecondition(format!(
                    "process {} has no plain start event",
                    definition.process_key()
                ))
            })?
            .id
            .clone();
        let instance_id = self.inner.create_instance(
            &definition,
            start,
            variables,
            tenant.unwrap_or(&self.inner.config.default_tenant),
            None,
        )?;
        let token_id = self.inner.initial_token_of(&instance_id)?;
        self.inner.interpreter.run_token(&*self.inner, token_id)?;
        self.settle()?;
        self.get_instance(&instance_id)
    }

    pub fn get_instance(&self, instance_id: &InstanceId) -> Result<ProcessInstance, EngineError> {
        self.inner
            .store
            .get::<ProcessInstance>(instance_id.as_str())?
            .ok_or_else(|| EngineError::not_found("instance", instance_id.as_str()))
    }

    /// List instances, optionally by state.
    pub fn list_instances(
        &self,
        state: Option<InstanceState>,
    ) -> Result<Vec<ProcessInstance>, EngineError> {
        let states: Vec<String> = match state {
            Some(s) => vec![s.to_string()],
            None => ["active", "completed", "cancelled", "failed", "suspended"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        let mut out = Vec::new();
        for s in states {
            out.extend(
                self.inner
                    .store
                    .load_by_index::<ProcessInstance>(views::INSTANCES_BY_STATE, &s)?,
            );
        }
        Ok(out)
    }

    /// Tokens of an instance, for observability and tests.
    pub fn list_tokens(&self, instance_id: &InstanceId) -> Result<Vec<Token>, EngineError> {
        Ok(self
            .inner
            .store
            .load_by_index(views::TOKENS_BY_INSTANCE, instance_id.as_str())?)
    }

    /// Cancel an instance and, transitively, its jobs, timers,
    /// subscriptions, and call-activity children.
    pub fn cancel_instance(&self, instance_id: &InstanceId) -> Result<(), EngineError> {
        self.inner.cancel_instance(instance_id)?;
        self.settle()
    }

    // ── Messages ────────────────────────────────────────────────────────

    /// Publish a message. Correlates against active subscriptions or
    /// buffers with the given TTL; idempotent on `request_id`.
    pub fn publish_message(
        &self,
        name: &str,
        correlation_key: &str,
        variables: VarMap,
        ttl_ms: Option<u64>,
        tenant: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<PublishReceipt, EngineError> {
        let request = PublishRequest {
            tenant_id: tenant.unwrap_or(&self.inner.config.default_tenant).to_string(),
            name: name.to_string(),
            correlation_key: correlation_key.to_string(),
            variables,
            ttl_ms,
            request_id: request_id
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        };
        let receipt = self.inner.publish_and_deliver(request)?;
        self.settle()?;
        Ok(receipt)
    }

    /// Remove expired buffered messages; returns the count removed.
    pub fn cleanup_buffers(&self) -> Result<usize, EngineError> {
        let now = self.inner.now_ms();
        self.inner.correlator.lock().cleanup(now)
    }

    // ── Jobs ────────────────────────────────────────────────────────────

    /// Claim up to `max_jobs` pending jobs of a type for a worker.
    pub fn activate_jobs(
        &self,
        job_type: &str,
        worker: &str,
        max_jobs: usize,
        timeout: Duration,
    ) -> Result<Vec<Job>, EngineError> {
        let now = self.inner.now_ms();
        self.inner
            .broker
            .lock()
            .activate(job_type, worker, max_jobs, timeout.as_millis() as u64, now)
    }

    /// Complete a job with result variables; the waiting token advances.
    pub fn complete_job(&self, job_key: &JobKey, variables: VarMap) -> Result<(), EngineError> {
        let outcome = self.inner.broker.lock().complete(job_key, variables)?;
        if let CompleteOutcome::Applied { job, variables } = outcome {
            self.inner
                .interpreter
                .on_job_completed(&*self.inner, &job, variables)?;
        }
        self.settle()
    }

    /// Fail a job. With retries left it re-queues after backoff; at zero
    /// retries a JOB_FAILURE incident parks the token.
    pub fn fail_job(
        &self,
        job_key: &JobKey,
        new_retries: u32,
        error_message: &str,
        retry_backoff: Option<Duration>,
    ) -> Result<(), EngineError> {
        let outcome = self.inner.broker.lock().fail(
            job_key,
            new_retries,
            error_message,
            retry_backoff.map(|d| d.as_millis() as u64),
        )?;
        match outcome {
            FailOutcome::Backoff { job, delay_ms } => {
                let now = self.inner.now_ms();
                let mut metadata = VarMap::new();
                metadata.insert(
                    "job_key".to_string(),
                    Value::Str(job.job_key.to_string()),
                );
                let record = TimerRecord {
                    timer_id: TimerId::generate(self.inner.node()),
                    tenant_id: String::new(),
                    kind: TimerKind::Duration,
                    original_spec: format!("PT{}S", delay_ms.div_ceil(1_000)),
                    fires_at_ms: now + delay_ms,
                    repetitions: None,
                    interval_ms: None,
                    binding: TimerBinding::Standalone,
                    token_id: None,
                    element_id: None,
                    metadata,
                    callback_target: COMPONENT_BROKER.to_string(),
                    status: TimerStatus::Scheduled,
                    wheel_level: 0,
                    slot_position: 0,
                };
                let timer_id = record.timer_id;
                self.inner.schedule_timer(record)?;
                self.inner.broker.lock().arm_retry_timer(&job.job_key, timer_id)?;
            }
            FailOutcome::Exhausted { job } => {
                let process_key = self
                    .inner
                    .store
                    .get::<ProcessInstance>(job.process_instance_id.as_str())?
                    .map(|i| i.process_key)
                    .unwrap_or_default();
                let element_type = self
                    .inner
                    .store
                    .get::<ProcessDefinition>(&process_key)?
                    .and_then(|d| d.element(&job.element_id).map(|e| e.element_type.to_string()))
                    .unwrap_or_else(|| "serviceTask".to_string());
                let incident = self.inner.open_incident(IncidentDraft {
                    incident_type: IncidentType::JobFailure,
                    message: format!(
                        "job failed: {}",
                        job.error_message.as_deref().unwrap_or("unknown")
                    ),
                    error_code: job.error_code.clone(),
                    process_instance_id: job.process_instance_id,
                    process_key,
                    element_id: job.element_id.clone(),
                    element_type,
                    token_id: Some(job.token_id),
                    job_key: Some(job.job_key),
                    timer_id: None,
                    original_retries: job.retries_initial,
                    metadata: VarMap::new(),
                })?;
                self.inner
                    .interpreter
                    .park_on_incident(&*self.inner, &job.token_id, &incident.id)?;
            }
        }
        self.settle()
    }

    /// A worker raised a BPMN error: the error propagates through the
    /// process's error handlers.
    pub fn throw_error(
        &self,
        job_key: &JobKey,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), EngineError> {
        let job = self
            .inner
            .broker
            .lock()
            .throw_error(job_key, error_code, error_message)?;
        self.inner
            .interpreter
            .on_job_error(&*self.inner, &job, error_code, error_message)?;
        self.settle()
    }

    pub fn cancel_job(&self, job_key: &JobKey) -> Result<(), EngineError> {
        self.inner.cancel_job(job_key)
    }

    pub fn get_job(&self, job_key: &JobKey) -> Result<Option<Job>, EngineError> {
        self.inner.broker.lock().get(job_key)
    }

    /// Return expired activation leases to PENDING.
    pub fn sweep_job_leases(&self) -> Result<usize, EngineError> {
        let now = self.inner.now_ms();
        self.inner.broker.lock().sweep(now)
    }

    // ── Timers ──────────────────────────────────────────────────────────

    /// Create a standalone timer from an ISO-8601 specification.
    pub fn create_timer(
        &self,
        spec: &str,
        tenant: Option<&str>,
        metadata: VarMap,
    ) -> Result<TimerId, EngineError> {
        let parsed = TimeSpec::parse(spec)?;
        let now = self.inner.now_ms();
        let (kind, repetitions, interval_ms) = match &parsed {
            TimeSpec::Duration(_) => (TimerKind::Duration, None, None),
            TimeSpec::Date(_) => (TimerKind::Date, None, None),
            TimeSpec::Cycle { repetitions, interval } => (
                TimerKind::Cycle,
                *repetitions,
                Some(interval.as_millis() as u64),
            ),
        };
        let record = TimerRecord {
            timer_id: TimerId::generate(self.inner.node()),
            tenant_id: tenant.unwrap_or(&self.inner.config.default_tenant).to_string(),
            kind,
            original_spec: spec.to_string(),
            fires_at_ms: parsed.fires_at_ms(now),
            repetitions,
            interval_ms,
            binding: TimerBinding::Standalone,
            token_id: None,
            element_id: None,
            metadata,
            callback_target: "standalone".to_string(),
            status: TimerStatus::Scheduled,
            wheel_level: 0,
            slot_position: 0,
        };
        let timer_id = record.timer_id;
        self.inner.schedule_timer(record)?;
        Ok(timer_id)
    }

    pub fn cancel_timer(&self, timer_id: &TimerId) -> Result<bool, EngineError> {
        self.inner.cancel_timer(timer_id)
    }

    /// Observability: wheel level and remaining time of a timer.
    pub fn get_timer_info(&self, timer_id: &TimerId) -> Option<TimerInfo> {
        let now = self.inner.now_ms();
        self.inner.wheel.lock().timer_info(timer_id, now)
    }

    /// Advance the wheel to the clock's now, dispatching every firing.
    /// Returns the number of timers fired.
    pub fn fire_timers(&self) -> Result<usize, EngineError> {
        let now = self.inner.now_ms();
        let fired = self.inner.wheel.lock().fire(now)?;
        let count = fired.len();
        for record in &fired {
            self.inner.route_fired_timer(record)?;
        }
        self.settle()?;
        Ok(count)
    }

    // ── Incidents ───────────────────────────────────────────────────────

    pub fn list_incidents(
        &self,
        status: Option<IncidentStatus>,
        instance: Option<&InstanceId>,
    ) -> Result<Vec<Incident>, EngineError> {
        self.inner.incidents.lock().list(status, instance)
    }

    pub fn get_incident(&self, id: &IncidentId) -> Result<Option<Incident>, EngineError> {
        self.inner.incidents.lock().get(id)
    }

    /// Resolve an incident: RETRY restores the failed operation, DISMISS
    /// cancels the parked token.
    pub fn resolve_incident(
        &self,
        id: &IncidentId,
        action: ResolveAction,
        new_retries: Option<u32>,
        resolved_by: Option<&str>,
    ) -> Result<Incident, EngineError> {
        let now = self.inner.now_ms();
        let (incident, outcome) =
            self.inner
                .incidents
                .lock()
                .resolve(id, action, new_retries, resolved_by, now)?;

        match outcome {
            ResolveOutcome::RetryJob { job_key, retries } => {
                self.inner.broker.lock().restore_retries(&job_key, retries)?;
                if let Some(token_id) = incident.token_id {
                    self.inner
                        .interpreter
                        .repark_on_job(&*self.inner, &token_id, &job_key)?;
                }
            }
            ResolveOutcome::RetryTimer { timer_id } => {
                if let Some(mut record) = self.inner.store.get::<TimerRecord>(timer_id.as_str())? {
                    let parsed = TimeSpec::parse(&record.original_spec)?;
                    record.fires_at_ms = parsed.fires_at_ms(now);
                    record.status = TimerStatus::Scheduled;
                    self.inner.schedule_timer(record)?;
                }
            }
            ResolveOutcome::RetryToken { token_id } => {
                self.inner.interpreter.reexecute_token(&*self.inner, &token_id)?;
            }
            ResolveOutcome::Dismiss { token_id } => {
                if let Some(token_id) = token_id {
                    self.inner.interpreter.dismiss_token(&*self.inner, &token_id)?;
                }
            }
        }
        self.settle()?;
        Ok(incident)
    }

    // ── Observability ───────────────────────────────────────────────────

    /// Real counters (never synthetic placeholders).
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let store = &self.inner.store;
        let processes: Vec<ProcessDefinition> =
            store.load_by_index(views::PROCESSES_ALL, "all")?;

        let mut instances_by_state = BTreeMap::new();
        for state in ["active", "completed", "cancelled", "failed", "suspended"] {
            let count = store.keys_by_index(views::INSTANCES_BY_STATE, state).len();
            if count > 0 {
                instances_by_state.insert(state.to_string(), count);
            }
        }

        Ok(EngineStats {
            deployed_processes: processes.len(),
            executable_elements: processes
                .iter()
                .map(|p| p.executable_element_count())
                .sum(),
            instances_by_state,
            pending_jobs: store.keys_by_index(views::JOBS_BY_STATE, "pending").len(),
            scheduled_timers: store
                .keys_by_index(views::TIMERS_BY_STATUS, "scheduled")
                .len(),
            buffered_messages: store.keys_by_index(views::BUFFERED_ALL, "all").len(),
            open_incidents: store
                .keys_by_index(views::INCIDENTS_BY_STATUS, "open")
                .len(),
        })
    }

    /// Lifecycle events after a sequence number (0 for all).
    pub fn events_since(&self, after_seq: u64) -> Vec<(u64, LifecycleEvent)> {
        self.inner.store.events_since(after_seq)
    }

    // ── Drivers ─────────────────────────────────────────────────────────

    /// Drain all component mailboxes until the system is quiet.
    pub fn settle(&self) -> Result<(), EngineError> {
        self.inner.settle()
    }

    /// Async driver: ticks the wheel, sweeps activation leases, and cleans
    /// the message buffer until the token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), EngineError> {
        let mut tick = tokio::time::interval(self.inner.config.wheel.tick);
        let mut sweep = tokio::time::interval(self.inner.config.activation_sweep_interval);
        let mut cleanup = tokio::time::interval(self.inner.config.buffer_cleanup_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("engine driver stopping");
                    return Ok(());
                }
                _ = tick.tick() => {
                    self.fire_timers()?;
                }
                _ = sweep.tick() => {
                    self.sweep_job_leases()?;
                }
                _ = cleanup.tick() => {
                    self.cleanup_buffers()?;
                }
            }
        }
    }
}

// ── Inner: services implementation and envelope handling ───────────────

impl<C: Clock> EngineInner<C> {
    fn resolve_process(&self, process: &str) -> Result<ProcessDefinition, EngineError> {
        if process.contains(":v") {
            return self.definition(process);
        }
        let versions: Vec<ProcessDefinition> = self
            .store
            .load_by_index(views::PROCESSES_BY_PROCESS_ID, process)?;
        versions
            .into_iter()
            .next_back()
            .ok_or_else(|| EngineError::not_found("process", process))
    }

    /// Create an instance with its initial token (not yet executed).
    fn create_instance(
        &self,
        definition: &ProcessDefinition,
        start_element: ElementId,
        variables: VarMap,
        tenant: &str,
        parent_token: Option<TokenId>,
    ) -> Result<InstanceId, EngineError> {
        let now = self.now_ms();
        let mut instance = ProcessInstance::new(
            InstanceId::generate(self.node()),
            definition.process_id.clone(),
            definition.version,
            tenant,
            variables.clone(),
            now,
        );
        instance.parent_token_id = parent_token;
        self.store.put(&instance)?;

        let token = Token::new(
            TokenId::generate(self.node()),
            instance.instance_id,
            definition.process_key(),
            start_element,
            now,
        );
        self.store.put(&token)?;

        self.store.append_event(&LifecycleEvent::InstanceStarted {
            instance_id: instance.instance_id,
            process_key: instance.process_key.clone(),
        })?;
        tracing::info!(
            instance = %instance.instance_id,
            process = %instance.process_key,
            "instance started"
        );
        Ok(instance.instance_id)
    }

    fn initial_token_of(&self, instance_id: &InstanceId) -> Result<TokenId, EngineError> {
        let tokens: Vec<Token> = self
            .store
            .load_by_index(views::TOKENS_BY_INSTANCE, instance_id.as_str())?;
        tokens
            .first()
            .map(|t| t.token_id)
            .ok_or_else(|| EngineError::Internal(format!("instance {instance_id} has no token")))
    }

    /// Publish through the correlator and perform the returned deliveries.
    fn publish_and_deliver(&self, request: PublishRequest) -> Result<PublishReceipt, EngineError> {
        let outcome = {
            let now = self.now_ms();
            self.correlator.lock().publish(request, now)?
        };
        for delivery in outcome.deliveries {
            self.perform_delivery(delivery)?;
        }
        Ok(outcome.receipt)
    }

    fn perform_delivery(&self, delivery: Delivery) -> Result<(), EngineError> {
        match delivery {
            Delivery::WakeToken { subscription, variables } => {
                self.interpreter.on_message(self, &subscription, variables)?;
            }
            Delivery::StartInstance { subscription, variables } => {
                let definition = self.definition(&subscription.process_definition_key)?;
                let Some(start) = subscription.start_event_id.clone() else {
                    return Ok(());
                };
                let instance_id = self.create_instance(
                    &definition,
                    start,
                    variables,
                    &subscription.tenant_id,
                    None,
                )?;
                let token_id = self.initial_token_of(&instance_id)?;
                self.interpreter.run_token(self, token_id)?;
            }
        }
        Ok(())
    }

    /// Dispatch a fired timer to its callback component's mailbox.
    fn route_fired_timer(&self, record: &TimerRecord) -> Result<(), EngineError> {
        match record.callback_target.as_str() {
            COMPONENT_BROKER => {
                let Some(Value::Str(job_key)) = record.metadata.get("job_key") else {
                    tracing::warn!(timer = %record.timer_id, "broker timer without job_key");
                    return Ok(());
                };
                let envelope = RequestEnvelope::new(
                    "retry_job",
                    serde_json::json!({ "job_key": job_key }),
                );
                self.dispatcher.route("wheel", COMPONENT_BROKER, envelope)?;
            }
            COMPONENT_INTERPRETER => {
                let envelope = RequestEnvelope::new(
                    "fire_timer",
                    serde_json::json!({ "timer_id": record.timer_id.as_str() }),
                );
                self.dispatcher.route("wheel", COMPONENT_INTERPRETER, envelope)?;
            }
            other => {
                // Standalone API timers have no callback component; the
                // firing is observable through the event log.
                tracing::debug!(timer = %record.timer_id, target = other, "timer fired");
            }
        }
        Ok(())
    }

    /// Drain component mailboxes until nothing is queued.
    fn settle(&self) -> Result<(), EngineError> {
        loop {
            let mut drained = false;
            while let Some(envelope) = self.dispatcher.mailbox(COMPONENT_CORRELATOR).pop() {
                drained = true;
                self.handle_correlator_request(envelope)?;
            }
            while let Some(envelope) = self.dispatcher.mailbox(COMPONENT_INTERPRETER).pop() {
                drained = true;
                self.handle_interpreter_request(envelope)?;
            }
            while let Some(envelope) = self.dispatcher.mailbox(COMPONENT_BROKER).pop() {
                drained = true;
                self.handle_broker_request(envelope)?;
            }
            if !drained {
                return Ok(());
            }
        }
    }

    fn handle_correlator_request(&self, envelope: RequestEnvelope) -> Result<(), EngineError> {
        match envelope.request_type.as_str() {
            "publish_message" => {
                let payload = &envelope.payload;
                let variables = payload
                    .get("variables")
                    .cloned()
                    .map(json_to_vars)
                    .unwrap_or_default();
                let request = PublishRequest {
                    tenant_id: str_field(payload, "tenant_id"),
                    name: str_field(payload, "name"),
                    correlation_key: str_field(payload, "correlation_key"),
                    variables,
                    ttl_ms: payload.get("ttl_ms").and_then(|v| v.as_u64()),
                    request_id: envelope.request_id.clone(),
                };
                self.publish_and_deliver(request)?;
            }
            other => tracing::warn!(request = other, "unknown correlator request"),
        }
        Ok(())
    }

    fn handle_interpreter_request(&self, envelope: RequestEnvelope) -> Result<(), EngineError> {
        match envelope.request_type.as_str() {
            "fire_timer" => {
                let timer_id = str_field(&envelope.payload, "timer_id");
                if let Some(record) = self.store.get::<TimerRecord>(&timer_id)? {
                    self.interpreter.on_timer_fired(self, &record)?;
                }
            }
            "deliver_message" => {
                let subscription_id = str_field(&envelope.payload, "subscription_id");
                let variables = envelope
                    .payload
                    .get("variables")
                    .cloned()
                    .map(json_to_vars)
                    .unwrap_or_default();
                if let Some(subscription) =
                    self.store.get::<MessageSubscription>(&subscription_id)?
                {
                    self.interpreter.on_message(self, &subscription, variables)?;
                }
            }
            other => tracing::warn!(request = other, "unknown interpreter request"),
        }
        Ok(())
    }

    fn handle_broker_request(&self, envelope: RequestEnvelope) -> Result<(), EngineError> {
        match envelope.request_type.as_str() {
            "retry_job" => {
                let job_key = JobKey::new(str_field(&envelope.payload, "job_key"));
                self.broker.lock().retry_ready(&job_key)?;
            }
            other => tracing::warn!(request = other, "unknown broker request"),
        }
        Ok(())
    }

    fn cancel_job(&self, job_key: &JobKey) -> Result<(), EngineError> {
        let retry_timer = self.broker.lock().cancel(job_key)?;
        if let Some(timer_id) = retry_timer {
            self.cancel_timer(&timer_id)?;
        }
        Ok(())
    }
}

impl<C: Clock> EngineServices for EngineInner<C> {
    fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    fn node(&self) -> &str {
        &self.config.node_prefix
    }

    fn definition(&self, process_key: &str) -> Result<ProcessDefinition, EngineError> {
        self.store
            .get::<ProcessDefinition>(process_key)?
            .ok_or_else(|| EngineError::not_found("process", process_key))
    }

    fn schedule_timer(&self, record: TimerRecord) -> Result<(), EngineError> {
        self.wheel.lock().schedule(record)
    }

    fn cancel_timer(&self, timer_id: &TimerId) -> Result<bool, EngineError> {
        self.wheel.lock().cancel(timer_id)
    }

    fn create_job(&self, request: JobRequest) -> Result<Job, EngineError> {
        let now = self.now_ms();
        self.broker.lock().create(request, now)
    }

    fn cancel_job(&self, job_key: &JobKey) -> Result<(), EngineError> {
        EngineInner::cancel_job(self, job_key)
    }

    fn create_subscription(
        &self,
        subscription: MessageSubscription,
    ) -> Result<MessageSubscription, EngineError> {
        let (subscription, replayed) =
            self.correlator.lock().create_subscription(subscription)?;
        // Replays are delivered once the current step settles; the
        // subscriber's token is parked by then.
        for message in replayed {
            let envelope = RequestEnvelope::new(
                "deliver_message",
                serde_json::json!({
                    "subscription_id": subscription.id.as_str(),
                    "variables": vars_to_json(&message.variables),
                }),
            );
            self.dispatcher
                .route(COMPONENT_CORRELATOR, COMPONENT_INTERPRETER, envelope)?;
        }
        Ok(subscription)
    }

    fn cancel_subscription(&self, id: &SubscriptionId) -> Result<(), EngineError> {
        let now = self.now_ms();
        self.correlator.lock().cancel_subscription(id, now)
    }

    fn publish_async(&self, request: PublishRequest) -> Result<(), EngineError> {
        let envelope = RequestEnvelope::with_id(
            "publish_message",
            request.request_id.clone(),
            serde_json::json!({
                "tenant_id": request.tenant_id,
                "name": request.name,
                "correlation_key": request.correlation_key,
                "variables": vars_to_json(&request.variables),
                "ttl_ms": request.ttl_ms,
            }),
        );
        self.dispatcher
            .route(COMPONENT_INTERPRETER, COMPONENT_CORRELATOR, envelope)
    }

    fn start_child_instance(
        &self,
        process_id: &str,
        variables: VarMap,
        parent_token: TokenId,
        tenant: &str,
    ) -> Result<(InstanceId, TokenId), EngineError> {
        let definition = self.resolve_process(process_id)?;
        let start = definition
            .none_start_event()
            .ok_or_else(|| {
                EngineError::FailedPrecondition(format!(
                    "called process {process_id} has no plain start event"
                ))
            })?
            .id
            .clone();
        let instance_id =
            self.create_instance(&definition, start, variables, tenant, Some(parent_token))?;
        let token_id = self.initial_token_of(&instance_id)?;
        Ok((instance_id, token_id))
    }

    fn cancel_instance(&self, instance_id: &InstanceId) -> Result<(), EngineError> {
        let Some(mut instance) = self.store.get::<ProcessInstance>(instance_id.as_str())? else {
            return Err(EngineError::not_found("instance", instance_id.as_str()));
        };
        if instance.is_terminal() {
            return Ok(());
        }
        let now = self.now_ms();
        instance.transition(InstanceState::Cancelled, now);
        self.store.put(&instance)?;

        let tokens: Vec<Token> = self
            .store
            .load_by_index(views::TOKENS_BY_INSTANCE, instance_id.as_str())?;
        for token in tokens {
            if !token.is_terminal() {
                self.interpreter.cancel_token(self, &token.token_id)?;
            }
        }
        self.store
            .append_event(&LifecycleEvent::InstanceCancelled { instance_id: *instance_id })?;
        tracing::info!(instance = %instance_id, "instance cancelled");
        Ok(())
    }

    fn open_incident(&self, draft: IncidentDraft) -> Result<Incident, EngineError> {
        let now = self.now_ms();
        self.incidents.lock().create(draft, now)
    }
}

fn str_field(payload: &serde_json::Value, field: &str) -> String {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn vars_to_json(vars: &VarMap) -> serde_json::Value {
    serde_json::Value::Object(
        vars.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

fn json_to_vars(value: serde_json::Value) -> VarMap {
    match Value::from_json(value) {
        Value::Map(map) => map,
        _ => VarMap::new(),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
