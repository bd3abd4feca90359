// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The token-driven process interpreter.
//!
//! Tokens are finite state machines with an explicit `waiting_for`
//! discriminator; there is no suspended native stack. Each advancement
//! step loads the token, dispatches the element executor, and applies the
//! result. Distinct tokens advance independently; a per-token lock keeps
//! any single token on one worker at a time.
//!
//! Executors reach the rest of the engine only through the
//! [`EngineServices`] capability interface, which breaks the
//! executor → interpreter → executor cycle.

pub mod elements;
pub mod result;
pub mod watchers;

use crate::broker::JobRequest;
use crate::correlator::PublishRequest;
use crate::error::EngineError;
use crate::incident::IncidentDraft;
use elements::{apply_mappings, execute_element};
use parking_lot::Mutex;
use result::{BranchWait, ExecCtx, ExecFailure, ExecutionResult, Wait};
use std::collections::HashMap;
use std::sync::Arc;
use watchers::{CompensationEntry, CompensationLog, ForkCount, Watcher, WatcherSet};
use weir_core::{
    Element, ElementId, ElementType, EventDefinition, IncidentType, InstanceId, InstanceState,
    Job, JobKey, LifecycleEvent, MessageSubscription, ProcessDefinition, ProcessInstance,
    SubscriptionId, SubscriptionType, TimeSpec, TimerBinding, TimerId, TimerKind, TimerRecord,
    TimerStatus, Token, TokenId, TokenState, VarMap, WaitReason,
};
use weir_core::{merge_vars, Incident};
use weir_storage::{views, Store};

/// Capability interface executors and the processor use to reach the rest
/// of the engine. The engine implements it; tests may substitute doubles.
pub trait EngineServices {
    fn now_ms(&self) -> u64;
    fn node(&self) -> &str;
    fn definition(&self, process_key: &str) -> Result<ProcessDefinition, EngineError>;
    fn schedule_timer(&self, record: TimerRecord) -> Result<(), EngineError>;
    fn cancel_timer(&self, timer_id: &TimerId) -> Result<bool, EngineError>;
    fn create_job(&self, request: JobRequest) -> Result<Job, EngineError>;
    fn cancel_job(&self, job_key: &JobKey) -> Result<(), EngineError>;
    /// Persist a subscription; buffered replays are delivered through the
    /// engine's mailboxes after the current step settles.
    fn create_subscription(
        &self,
        subscription: MessageSubscription,
    ) -> Result<MessageSubscription, EngineError>;
    fn cancel_subscription(&self, id: &SubscriptionId) -> Result<(), EngineError>;
    /// Non-blocking publish: enqueued and correlated when the engine
    /// settles its mailboxes.
    fn publish_async(&self, request: PublishRequest) -> Result<(), EngineError>;
    /// Create a child instance and its initial token without executing it.
    fn start_child_instance(
        &self,
        process_id: &str,
        variables: VarMap,
        parent_token: TokenId,
        tenant: &str,
    ) -> Result<(InstanceId, TokenId), EngineError>;
    fn cancel_instance(&self, instance_id: &InstanceId) -> Result<(), EngineError>;
    fn open_incident(&self, draft: IncidentDraft) -> Result<Incident, EngineError>;
}

/// Per-token serialization: one worker advances a given token at a time.
#[derive(Default)]
struct TokenLocks {
    map: Mutex<HashMap<TokenId, Arc<Mutex<()>>>>,
}

impl TokenLocks {
    fn handle(&self, token_id: &TokenId) -> Arc<Mutex<()>> {
        let mut map = self.map.lock();
        Arc::clone(map.entry(*token_id).or_default())
    }

    fn discard(&self, token_id: &TokenId) {
        self.map.lock().remove(token_id);
    }
}

enum Flow {
    /// The token moved; keep stepping it.
    Continue,
    /// The token parked, completed, or forked; stop stepping it.
    Done,
}

pub struct Interpreter {
    store: Arc<Store>,
    locks: TokenLocks,
    /// Serializes join check-and-consume across tokens.
    join_lock: Mutex<()>,
}

impl Interpreter {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store, locks: TokenLocks::default(), join_lock: Mutex::new(()) }
    }

    // ── Entry points ────────────────────────────────────────────────────

    /// Drive a token (and every follow-up token its advancement spawns)
    /// until all of them are parked or terminal.
    pub fn run_token(
        &self,
        services: &dyn EngineServices,
        token_id: TokenId,
    ) -> Result<(), EngineError> {
        let mut queue = vec![token_id];
        while let Some(next) = queue.pop() {
            let followups = self.step_token(services, next)?;
            queue.extend(followups);
        }
        Ok(())
    }

    /// A timer fired. Routes by binding: process waits advance their
    /// token; boundary timers interrupt or branch their host.
    pub fn on_timer_fired(
        &self,
        services: &dyn EngineServices,
        record: &TimerRecord,
    ) -> Result<(), EngineError> {
        let Some(token_id) = record.token_id else {
            return Ok(());
        };
        let mut followups = Vec::new();
        match record.binding {
            TimerBinding::ProcessWait => {
                let Some(mut token) = self.store.get::<Token>(token_id.as_str())? else {
                    return Ok(());
                };
                let expected = WaitReason::Timer(record.timer_id).to_wait_string();
                if token.waiting_for.as_deref() != Some(expected.as_str()) {
                    tracing::debug!(token = %token_id, timer = %record.timer_id, "stale timer fire");
                    return Ok(());
                }
                let definition = services.definition(&token.process_key)?;
                token.wake(services.now_ms());
                self.advance_past_current(services, &definition, token, &mut followups)?;
            }
            TimerBinding::Boundary => {
                // Liveness comes from the fired snapshot, not the stored
                // record: a catch-up fire() batch may have already
                // advanced or exhausted the cycle by the time this
                // envelope drains.
                let still_armed =
                    record.is_cycle() && record.repetitions.is_none_or(|n| n > 1);
                self.watcher_fired(
                    services,
                    token_id,
                    |set| set.by_timer(&record.timer_id).cloned(),
                    VarMap::new(),
                    still_armed,
                    &mut followups,
                )?;
            }
            TimerBinding::Standalone => {}
        }
        for id in followups {
            self.run_token(services, id)?;
        }
        Ok(())
    }

    /// A correlated message arrived for an intermediate subscription.
    pub fn on_message(
        &self,
        services: &dyn EngineServices,
        subscription: &MessageSubscription,
        variables: VarMap,
    ) -> Result<(), EngineError> {
        let Some(token_id) = subscription.token_id else {
            return Ok(());
        };
        let Some(mut token) = self.store.get::<Token>(token_id.as_str())? else {
            return Ok(());
        };
        if token.is_terminal() {
            return Ok(());
        }
        let mut followups = Vec::new();
        let direct = WaitReason::Message(subscription.id).to_wait_string();
        if token.waiting_for.as_deref() == Some(direct.as_str()) {
            let definition = services.definition(&token.process_key)?;
            merge_vars(&mut token.variables, &variables);
            token.wake(services.now_ms());
            let element = definition.element(&token.current_element_id).cloned();
            // Conditional catches re-evaluate in place; everything else
            // moves past the catch element.
            if element.as_ref().is_some_and(is_conditional_catch) {
                self.store.put(&token)?;
                followups.push(token.token_id);
            } else {
                self.advance_past_current(services, &definition, token, &mut followups)?;
            }
        } else {
            self.watcher_fired(
                services,
                token_id,
                |set| set.by_subscription(&subscription.id).cloned(),
                variables,
                false,
                &mut followups,
            )?;
        }
        for id in followups {
            self.run_token(services, id)?;
        }
        Ok(())
    }

    /// A worker completed a job: merge variables, wake, advance.
    pub fn on_job_completed(
        &self,
        services: &dyn EngineServices,
        job: &Job,
        variables: VarMap,
    ) -> Result<(), EngineError> {
        let Some(mut token) = self.store.get::<Token>(job.token_id.as_str())? else {
            return Ok(());
        };
        let expected = WaitReason::Job(job.job_key).to_wait_string();
        if token.waiting_for.as_deref() != Some(expected.as_str()) {
            tracing::debug!(token = %job.token_id, job = %job.job_key, "stale job completion");
            return Ok(());
        }
        let definition = services.definition(&token.process_key)?;
        merge_vars(&mut token.variables, &variables);
        token.wake(services.now_ms());

        let mut followups = Vec::new();
        self.advance_past_current(services, &definition, token, &mut followups)?;
        for id in followups {
            self.run_token(services, id)?;
        }
        self.recheck_conditionals(services, &job.process_instance_id)?;
        Ok(())
    }

    /// A job raised a BPMN error: wake the token and propagate.
    pub fn on_job_error(
        &self,
        services: &dyn EngineServices,
        job: &Job,
        error_code: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        let Some(token) = self.store.get::<Token>(job.token_id.as_str())? else {
            return Ok(());
        };
        let definition = services.definition(&token.process_key)?;
        let mut followups = Vec::new();
        self.propagate_error(services, &definition, token, error_code, message, false, &mut followups)?;
        for id in followups {
            self.run_token(services, id)?;
        }
        Ok(())
    }

    /// Park a token on an open incident (job failures park the waiting
    /// token here until the incident is resolved).
    pub fn park_on_incident(
        &self,
        services: &dyn EngineServices,
        token_id: &TokenId,
        incident_id: &weir_core::IncidentId,
    ) -> Result<(), EngineError> {
        if let Some(mut token) = self.store.get::<Token>(token_id.as_str())? {
            if !token.is_terminal() {
                token.set_waiting(&WaitReason::Incident(*incident_id), services.now_ms());
                self.store.put(&token)?;
            }
        }
        Ok(())
    }

    /// Incident RETRY on a job: park the token back on the job.
    pub fn repark_on_job(
        &self,
        services: &dyn EngineServices,
        token_id: &TokenId,
        job_key: &JobKey,
    ) -> Result<(), EngineError> {
        if let Some(mut token) = self.store.get::<Token>(token_id.as_str())? {
            token.set_waiting(&WaitReason::Job(*job_key), services.now_ms());
            self.store.put(&token)?;
        }
        Ok(())
    }

    /// Incident RETRY on a non-job failure: re-execute the element fresh.
    pub fn reexecute_token(
        &self,
        services: &dyn EngineServices,
        token_id: &TokenId,
    ) -> Result<(), EngineError> {
        if let Some(mut token) = self.store.get::<Token>(token_id.as_str())? {
            if !token.is_terminal() {
                token.wake(services.now_ms());
                self.store.put(&token)?;
                self.run_token(services, *token_id)?;
            }
        }
        Ok(())
    }

    /// Incident DISMISS: cancel the parked token and re-check completion.
    pub fn dismiss_token(
        &self,
        services: &dyn EngineServices,
        token_id: &TokenId,
    ) -> Result<(), EngineError> {
        let Some(mut token) = self.store.get::<Token>(token_id.as_str())? else {
            return Ok(());
        };
        if token.is_terminal() {
            return Ok(());
        }
        self.cancel_token_resources(services, &token)?;
        token.cancel(services.now_ms());
        self.store.put(&token)?;
        let mut followups = Vec::new();
        self.check_completion(services, &token.process_instance_id, &mut followups)?;
        for id in followups {
            self.run_token(services, id)?;
        }
        Ok(())
    }

    /// Cancel a token together with whatever external resource it waits
    /// on. Used by instance cancellation; does not run completion checks.
    pub fn cancel_token(
        &self,
        services: &dyn EngineServices,
        token_id: &TokenId,
    ) -> Result<(), EngineError> {
        let Some(mut token) = self.store.get::<Token>(token_id.as_str())? else {
            return Ok(());
        };
        if token.is_terminal() {
            return Ok(());
        }
        self.cancel_token_resources(services, &token)?;
        token.cancel(services.now_ms());
        self.store.put(&token)?;
        self.locks.discard(token_id);
        Ok(())
    }

    /// Re-evaluate conditional catch events of an instance after its
    /// variables changed.
    pub fn recheck_conditionals(
        &self,
        services: &dyn EngineServices,
        instance_id: &InstanceId,
    ) -> Result<(), EngineError> {
        let tokens: Vec<Token> = self
            .store
            .load_by_index(views::TOKENS_BY_INSTANCE, instance_id.as_str())?;
        let mut woken = Vec::new();
        for mut token in tokens {
            if token.state != TokenState::Waiting {
                continue;
            }
            let Some(WaitReason::Message(sub_id)) = token.wait_reason() else {
                continue;
            };
            let definition = services.definition(&token.process_key)?;
            let conditional = definition
                .element(&token.current_element_id)
                .is_some_and(|e| is_conditional_catch(e));
            if !conditional {
                continue;
            }
            services.cancel_subscription(&sub_id)?;
            token.wake(services.now_ms());
            self.store.put(&token)?;
            woken.push(token.token_id);
        }
        for id in woken {
            self.run_token(services, id)?;
        }
        Ok(())
    }

    // ── The execute loop ────────────────────────────────────────────────

    /// Advance one token until it parks, completes, or forks. Returns
    /// follow-up tokens to drive (children, resumed parents, survivors).
    fn step_token(
        &self,
        services: &dyn EngineServices,
        token_id: TokenId,
    ) -> Result<Vec<TokenId>, EngineError> {
        let handle = self.locks.handle(&token_id);
        let _guard = handle.lock();

        let mut followups = Vec::new();
        loop {
            let Some(token) = self.store.get::<Token>(token_id.as_str())? else {
                break;
            };
            if token.state != TokenState::Active {
                break;
            }
            let Some(instance) = self
                .store
                .get::<ProcessInstance>(token.process_instance_id.as_str())?
            else {
                break;
            };
            if instance.is_terminal() || instance.state == InstanceState::Suspended {
                break;
            }
            let definition = services.definition(&token.process_key)?;
            let Some(element) = definition.element(&token.current_element_id).cloned() else {
                let failure = ExecFailure::process(format!(
                    "element {} missing from {}",
                    token.current_element_id, definition.process_id
                ));
                self.open_incident_and_park(services, token, failure)?;
                break;
            };

            tracing::debug!(
                token = %token_id,
                element = %element.id,
                element_type = %element.element_type,
                "executing element"
            );
            self.note_current_activity(&instance, &element)?;

            let ctx = ExecCtx {
                definition: &definition,
                instance: &instance,
                token: &token,
                now_ms: services.now_ms(),
            };
            let result = match execute_element(&ctx) {
                Ok(result) => result,
                Err(failure) => {
                    self.open_incident_and_park(services, token, failure)?;
                    break;
                }
            };

            match self.apply(services, &definition, &instance, token, &element, result, &mut followups) {
                Ok(Flow::Continue) => continue,
                Ok(Flow::Done) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(followups)
    }

    /// The ExecutionProcessor: apply one executor result in contract order.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        instance: &ProcessInstance,
        mut token: Token,
        element: &Element,
        result: ExecutionResult,
        followups: &mut Vec<TokenId>,
    ) -> Result<Flow, EngineError> {
        let now = services.now_ms();

        if let Some(publish) = &result.publish {
            services.publish_async(PublishRequest {
                tenant_id: instance.tenant_id.clone(),
                name: publish.name.clone(),
                correlation_key: publish.correlation_key.clone(),
                variables: publish.variables.clone(),
                ttl_ms: None,
                request_id: format!("{}:{}:{}", token.token_id, element.id, publish.name),
            })?;
        }

        if let Some(variables) = &result.variables {
            merge_vars(&mut token.variables, variables);
            self.store.put(&token)?;
        }

        if result.compensate {
            self.run_compensation(services, instance, followups)?;
        }

        if let Some(error) = &result.error {
            self.propagate_error(
                services,
                definition,
                token,
                &error.code,
                &error.message,
                element.event_definition.as_ref().is_some_and(|d| {
                    matches!(d, EventDefinition::Escalation { .. })
                }),
                followups,
            )?;
            return Ok(Flow::Done);
        }

        if let Some(wait) = result.wait {
            return self.install_wait(services, definition, instance, token, element, wait, followups);
        }

        if result.completed {
            self.complete_token(services, definition, token, followups)?;
            return Ok(Flow::Done);
        }

        if !result.new_tokens.is_empty() {
            if element.element_type == ElementType::InclusiveGateway {
                self.store.put(&ForkCount {
                    process_instance_id: instance.instance_id,
                    family: token.token_id,
                    expected: result.new_tokens.len(),
                })?;
            }
            for child in &result.new_tokens {
                let mut spawned = Token::new(
                    TokenId::generate(services.node()),
                    instance.instance_id,
                    token.process_key.clone(),
                    child.element.clone(),
                    now,
                );
                spawned.parent_token_id = Some(token.token_id);
                spawned.variables = child.variables.clone();
                self.store.put(&spawned)?;
                followups.push(spawned.token_id);
            }
            // The forking token is consumed by its children.
            self.complete_token(services, definition, token, followups)?;
            return Ok(Flow::Done);
        }

        if !result.next_elements.is_empty() {
            let mut targets = Vec::new();
            for flow_id in &result.next_elements {
                match definition.flow_target(flow_id) {
                    Some(target) => targets.push(target.id.clone()),
                    None => {
                        self.open_incident_and_park(
                            services,
                            token,
                            ExecFailure::process(format!(
                                "sequence flow {flow_id} has no target element"
                            )),
                        )?;
                        return Ok(Flow::Done);
                    }
                }
            }
            return self.move_or_fork(services, definition, token, element, targets, followups);
        }

        // Nothing to do and nowhere to go: treat as an implicit end.
        self.complete_token(services, definition, token, followups)?;
        Ok(Flow::Done)
    }

    /// Move the token to a single target (continue stepping) or fork it
    /// across several targets.
    fn move_or_fork(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        mut token: Token,
        element: &Element,
        targets: Vec<ElementId>,
        followups: &mut Vec<TokenId>,
    ) -> Result<Flow, EngineError> {
        let now = services.now_ms();
        // Leaving an activity tears down its boundary watchers.
        if element.element_type.is_activity() {
            self.cancel_watchers(services, &token.token_id)?;
        }
        match targets.len() {
            0 => {
                self.complete_token(services, definition, token, followups)?;
                Ok(Flow::Done)
            }
            1 => {
                token.move_to(targets[0].clone(), now);
                self.store.put(&token)?;
                Ok(Flow::Continue)
            }
            _ => {
                for target in &targets {
                    let mut spawned = Token::new(
                        TokenId::generate(services.node()),
                        token.process_instance_id,
                        token.process_key.clone(),
                        target.clone(),
                        now,
                    );
                    spawned.parent_token_id = Some(token.token_id);
                    spawned.variables = token.variables.clone();
                    self.store.put(&spawned)?;
                    followups.push(spawned.token_id);
                }
                self.complete_token(services, definition, token, followups)?;
                Ok(Flow::Done)
            }
        }
    }

    // ── Waits ───────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn install_wait(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        instance: &ProcessInstance,
        mut token: Token,
        element: &Element,
        wait: Wait,
        followups: &mut Vec<TokenId>,
    ) -> Result<Flow, EngineError> {
        let now = services.now_ms();
        match wait {
            Wait::Timer { spec } => {
                let parsed = match TimeSpec::parse(&spec) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        self.open_incident_and_park(
                            services,
                            token,
                            ExecFailure::timer(format!("timer spec {spec:?}: {e}")),
                        )?;
                        return Ok(Flow::Done);
                    }
                };
                let record = build_timer(
                    services.node(),
                    &instance.tenant_id,
                    &parsed,
                    &spec,
                    TimerBinding::ProcessWait,
                    Some(token.token_id),
                    Some(element.id.clone()),
                    now,
                );
                let timer_id = record.timer_id;
                services.schedule_timer(record)?;
                token.set_waiting(&WaitReason::Timer(timer_id), now);
                self.store.put(&token)?;
            }
            Wait::Message { name, message_ref, correlation_key } => {
                // Receive tasks are activities and may carry boundary events.
                if element.element_type.is_activity() {
                    self.install_boundary_watchers(services, definition, instance, &token, element)?;
                }
                let subscription = MessageSubscription {
                    id: SubscriptionId::generate(services.node()),
                    tenant_id: instance.tenant_id.clone(),
                    process_definition_key: token.process_key.clone(),
                    process_version: definition.version,
                    start_event_id: None,
                    message_name: name.into(),
                    message_ref,
                    correlation_key,
                    is_active: true,
                    subscription_type: SubscriptionType::IntermediateCatch,
                    token_id: Some(token.token_id),
                    created_at_ms: now,
                    updated_at_ms: now,
                };
                let subscription = services.create_subscription(subscription)?;
                token.set_waiting(&WaitReason::Message(subscription.id), now);
                self.store.put(&token)?;
            }
            Wait::Job { job_type, variables, headers, retries } => {
                self.install_boundary_watchers(services, definition, instance, &token, element)?;
                let job = services.create_job(JobRequest {
                    job_type,
                    process_instance_id: instance.instance_id,
                    element_id: element.id.clone(),
                    token_id: token.token_id,
                    variables,
                    headers,
                    retries,
                    retry_backoff_ms: None,
                })?;
                token.set_waiting(&WaitReason::Job(job.job_key), now);
                self.store.put(&token)?;
            }
            Wait::CallActivity { process_id, variables } => {
                self.install_boundary_watchers(services, definition, instance, &token, element)?;
                let (child_instance, child_token) = services.start_child_instance(
                    &process_id,
                    variables,
                    token.token_id,
                    &instance.tenant_id,
                )?;
                token.set_waiting(&WaitReason::CallActivity(child_instance), now);
                self.store.put(&token)?;
                followups.push(child_token);
            }
            Wait::Join => {
                if element.element_type == ElementType::SubProcess {
                    return self.enter_subprocess(services, definition, instance, token, element, followups);
                }
                self.arrive_at_join(services, definition, instance, token, element, followups)?;
            }
            Wait::EventGateway { branches } => {
                let mut armed = Vec::new();
                for branch in &branches {
                    match &branch.wait {
                        BranchWait::Timer { spec } => {
                            let parsed = match TimeSpec::parse(spec) {
                                Ok(parsed) => parsed,
                                Err(e) => {
                                    self.open_incident_and_park(
                                        services,
                                        token,
                                        ExecFailure::timer(format!("timer spec {spec:?}: {e}")),
                                    )?;
                                    return Ok(Flow::Done);
                                }
                            };
                            let record = build_timer(
                                services.node(),
                                &instance.tenant_id,
                                &parsed,
                                spec,
                                TimerBinding::Boundary,
                                Some(token.token_id),
                                Some(branch.element.clone()),
                                now,
                            );
                            armed.push(Watcher {
                                element: branch.element.clone(),
                                timer_id: Some(record.timer_id),
                                subscription_id: None,
                                interrupting: true,
                            });
                            services.schedule_timer(record)?;
                        }
                        BranchWait::Message { name, correlation_key } => {
                            let subscription = MessageSubscription {
                                id: SubscriptionId::generate(services.node()),
                                tenant_id: instance.tenant_id.clone(),
                                process_definition_key: token.process_key.clone(),
                                process_version: definition.version,
                                start_event_id: None,
                                message_name: name.clone().into(),
                                message_ref: branch.element.clone(),
                                correlation_key: correlation_key.clone(),
                                is_active: true,
                                subscription_type: SubscriptionType::IntermediateCatch,
                                token_id: Some(token.token_id),
                                created_at_ms: now,
                                updated_at_ms: now,
                            };
                            let subscription = services.create_subscription(subscription)?;
                            armed.push(Watcher {
                                element: branch.element.clone(),
                                timer_id: None,
                                subscription_id: Some(subscription.id),
                                interrupting: true,
                            });
                        }
                    }
                }
                self.store.put(&WatcherSet {
                    token_id: token.token_id,
                    host_element: element.id.clone(),
                    watchers: armed,
                })?;
                token.set_waiting(&WaitReason::GatewayJoin(element.id.clone()), now);
                self.store.put(&token)?;
            }
        }
        Ok(Flow::Done)
    }

    /// Arm boundary timers/subscriptions declared on an activity.
    fn install_boundary_watchers(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        instance: &ProcessInstance,
        token: &Token,
        activity: &Element,
    ) -> Result<(), EngineError> {
        let boundaries = definition.boundary_events_for(&activity.id);
        if boundaries.is_empty() {
            return Ok(());
        }
        let now = services.now_ms();
        let mut armed = Vec::new();
        for boundary in boundaries {
            match &boundary.event_definition {
                Some(EventDefinition::Timer { spec }) => {
                    let parsed = TimeSpec::parse(spec)?;
                    let record = build_timer(
                        services.node(),
                        &instance.tenant_id,
                        &parsed,
                        spec,
                        TimerBinding::Boundary,
                        Some(token.token_id),
                        Some(boundary.id.clone()),
                        now,
                    );
                    armed.push(Watcher {
                        element: boundary.id.clone(),
                        timer_id: Some(record.timer_id),
                        subscription_id: None,
                        interrupting: boundary.cancel_activity,
                    });
                    services.schedule_timer(record)?;
                }
                Some(EventDefinition::Message { message_ref, correlation_key }) => {
                    let name = definition
                        .element(message_ref)
                        .and_then(|m| m.name.clone())
                        .unwrap_or_else(|| message_ref.to_string());
                    let mut vars = instance.variables.clone();
                    merge_vars(&mut vars, &token.variables);
                    let key = match correlation_key.as_deref() {
                        Some(expr) => weir_expr::evaluate_text(expr, &vars)
                            .map(|v| v.display_string())
                            .unwrap_or_default(),
                        None => String::new(),
                    };
                    let subscription = MessageSubscription {
                        id: SubscriptionId::generate(services.node()),
                        tenant_id: instance.tenant_id.clone(),
                        process_definition_key: token.process_key.clone(),
                        process_version: definition.version,
                        start_event_id: None,
                        message_name: name.into(),
                        message_ref: message_ref.clone(),
                        correlation_key: key,
                        is_active: true,
                        subscription_type: SubscriptionType::IntermediateCatch,
                        token_id: Some(token.token_id),
                        created_at_ms: now,
                        updated_at_ms: now,
                    };
                    let subscription = services.create_subscription(subscription)?;
                    armed.push(Watcher {
                        element: boundary.id.clone(),
                        timer_id: None,
                        subscription_id: Some(subscription.id),
                        interrupting: boundary.cancel_activity,
                    });
                }
                // Error/escalation/compensation boundaries are matched at
                // propagation/completion time; nothing to arm.
                _ => {}
            }
        }
        if !armed.is_empty() {
            self.store.put(&WatcherSet {
                token_id: token.token_id,
                host_element: activity.id.clone(),
                watchers: armed,
            })?;
        }
        Ok(())
    }

    /// Tear down a token's armed watchers.
    fn cancel_watchers(
        &self,
        services: &dyn EngineServices,
        token_id: &TokenId,
    ) -> Result<(), EngineError> {
        let Some(set) = self.store.get::<WatcherSet>(token_id.as_str())? else {
            return Ok(());
        };
        for watcher in &set.watchers {
            if let Some(timer_id) = &watcher.timer_id {
                services.cancel_timer(timer_id)?;
            }
            if let Some(sub_id) = &watcher.subscription_id {
                services.cancel_subscription(sub_id)?;
            }
        }
        self.store.delete::<WatcherSet>(token_id.as_str())?;
        Ok(())
    }

    /// A boundary or event-gateway watcher fired for a token.
    ///
    /// `timer_still_armed` is the fired cycle's snapshot liveness: true
    /// when the wheel keeps the timer SCHEDULED for further firings.
    /// Message watchers ignore it (they re-arm through the correlator).
    fn watcher_fired(
        &self,
        services: &dyn EngineServices,
        token_id: TokenId,
        select: impl Fn(&WatcherSet) -> Option<Watcher>,
        variables: VarMap,
        timer_still_armed: bool,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let Some(set) = self.store.get::<WatcherSet>(token_id.as_str())? else {
            return Ok(());
        };
        let Some(watcher) = select(&set) else {
            return Ok(());
        };
        let Some(mut token) = self.store.get::<Token>(token_id.as_str())? else {
            return Ok(());
        };
        if token.is_terminal() {
            return Ok(());
        }
        let definition = services.definition(&token.process_key)?;
        let now = services.now_ms();

        let host_is_gateway = definition
            .element(&set.host_element)
            .is_some_and(|e| e.element_type == ElementType::EventBasedGateway);

        if host_is_gateway {
            // First event wins: disarm the rest, take the branch.
            self.cancel_watchers(services, &token_id)?;
            merge_vars(&mut token.variables, &variables);
            token.move_to(watcher.element.clone(), now);
            self.store.put(&token)?;
            self.advance_past_current(services, &definition, token, followups)?;
            return Ok(());
        }

        if watcher.interrupting {
            tracing::info!(
                token = %token_id,
                boundary = %watcher.element,
                "interrupting boundary event fired"
            );
            self.cancel_token_resources(services, &token)?;
            token.cancel(now);
            self.store.put(&token)?;

            let mut handler = Token::new(
                TokenId::generate(services.node()),
                token.process_instance_id,
                token.process_key.clone(),
                watcher.element.clone(),
                now,
            );
            handler.parent_token_id = token.parent_token_id;
            handler.variables = token.variables.clone();
            merge_vars(&mut handler.variables, &variables);
            self.store.put(&handler)?;
            followups.push(handler.token_id);
        } else {
            tracing::info!(
                token = %token_id,
                boundary = %watcher.element,
                "non-interrupting boundary event fired"
            );
            // Spawn alongside the still-running host.
            let mut spawned = Token::new(
                TokenId::generate(services.node()),
                token.process_instance_id,
                token.process_key.clone(),
                watcher.element.clone(),
                now,
            );
            spawned.variables = token.variables.clone();
            merge_vars(&mut spawned.variables, &variables);
            self.store.put(&spawned)?;
            followups.push(spawned.token_id);

            // A non-interrupting boundary can fire again while the host
            // runs: a live cycle timer stays SCHEDULED in the wheel, so
            // its watcher stays armed; a message boundary re-arms a fresh
            // subscription (the correlator consumed the matched one).
            // Only a spent timer drops its watcher.
            let mut set = set;
            if watcher.timer_id.is_some() {
                if !timer_still_armed {
                    set.watchers.retain(|w| w != &watcher);
                }
            } else if let Some(sub_id) = &watcher.subscription_id {
                match self.store.get::<MessageSubscription>(sub_id.as_str())? {
                    Some(consumed) => {
                        let mut renewed = consumed;
                        renewed.id = SubscriptionId::generate(services.node());
                        renewed.is_active = true;
                        renewed.created_at_ms = now;
                        renewed.updated_at_ms = now;
                        let renewed = services.create_subscription(renewed)?;
                        for armed in &mut set.watchers {
                            if armed == &watcher {
                                armed.subscription_id = Some(renewed.id);
                            }
                        }
                    }
                    None => {
                        set.watchers.retain(|w| w != &watcher);
                    }
                }
            }
            if set.watchers.is_empty() {
                self.store.delete::<WatcherSet>(token_id.as_str())?;
            } else {
                self.store.put(&set)?;
            }
        }
        Ok(())
    }

    // ── Sub-processes and joins ─────────────────────────────────────────

    fn enter_subprocess(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        instance: &ProcessInstance,
        mut token: Token,
        element: &Element,
        followups: &mut Vec<TokenId>,
    ) -> Result<Flow, EngineError> {
        let now = services.now_ms();
        self.install_boundary_watchers(services, definition, instance, &token, element)?;

        let starts = definition.start_events(Some(element.id.as_str()));
        let Some(start) = starts.iter().find(|e| e.event_definition.is_none()) else {
            self.open_incident_and_park(
                services,
                token,
                ExecFailure::process(format!("sub-process {} has no start event", element.id)),
            )?;
            return Ok(Flow::Done);
        };

        let mut child = Token::new(
            TokenId::generate(services.node()),
            instance.instance_id,
            token.process_key.clone(),
            start.id.clone(),
            now,
        );
        child.parent_token_id = Some(token.token_id);
        child.variables = token.variables.clone();
        self.store.put(&child)?;
        followups.push(child.token_id);

        token.set_waiting(&WaitReason::GatewayJoin(element.id.clone()), now);
        self.store.put(&token)?;
        Ok(Flow::Done)
    }

    /// Atomic check-and-consume at a parallel/inclusive join.
    fn arrive_at_join(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        instance: &ProcessInstance,
        mut token: Token,
        gateway: &Element,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let _join_guard = self.join_lock.lock();
        let now = services.now_ms();
        let family = token.family();

        token.set_waiting(&WaitReason::GatewayJoin(gateway.id.clone()), now);
        self.store.put(&token)?;

        let wait_key = WaitReason::GatewayJoin(gateway.id.clone()).to_wait_string();
        let arrived: Vec<Token> = self
            .store
            .load_by_index::<Token>(views::TOKENS_BY_WAITING, &wait_key)?
            .into_iter()
            .filter(|t| t.process_instance_id == instance.instance_id && t.family() == family)
            .collect();

        let expected = match gateway.element_type {
            ElementType::InclusiveGateway => self
                .store
                .get::<ForkCount>(&ForkCount::storage_id(&instance.instance_id, &family))?
                .map(|f| f.expected)
                .unwrap_or_else(|| gateway.incoming.len()),
            _ => gateway.incoming.len(),
        };

        tracing::debug!(
            gateway = %gateway.id,
            family = %family,
            arrived = arrived.len(),
            expected,
            "join arrival"
        );
        if arrived.len() < expected {
            return Ok(());
        }

        // All branches are in: consume them and release one survivor per
        // outgoing flow.
        let mut survivor_vars = VarMap::new();
        for mut t in arrived {
            merge_vars(&mut survivor_vars, &t.variables);
            t.complete(now);
            self.store.put(&t)?;
            self.locks.discard(&t.token_id);
        }
        if gateway.element_type == ElementType::InclusiveGateway {
            self.store
                .delete::<ForkCount>(&ForkCount::storage_id(&instance.instance_id, &family))?;
        }

        let family_parent = self
            .store
            .get::<Token>(family.as_str())?
            .and_then(|t| t.parent_token_id);

        for flow_id in &gateway.outgoing {
            let Some(target) = definition.flow_target(flow_id) else {
                continue;
            };
            let mut survivor = Token::new(
                TokenId::generate(services.node()),
                instance.instance_id,
                token.process_key.clone(),
                target.id.clone(),
                now,
            );
            survivor.parent_token_id = family_parent;
            survivor.variables = survivor_vars.clone();
            self.store.put(&survivor)?;
            followups.push(survivor.token_id);
        }
        if gateway.outgoing.is_empty() {
            self.check_completion(services, &instance.instance_id, followups)?;
        }
        Ok(())
    }

    // ── Completion ──────────────────────────────────────────────────────

    /// Complete a token: tear down watchers, register compensation, fold
    /// variables into the instance, resume sub-process hosts, and check
    /// whether the instance is done.
    fn complete_token(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        mut token: Token,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let now = services.now_ms();
        self.cancel_watchers(services, &token.token_id)?;
        self.register_compensation(definition, &token)?;

        token.complete(now);
        self.store.put(&token)?;
        self.locks.discard(&token.token_id);

        if let Some(mut instance) = self
            .store
            .get::<ProcessInstance>(token.process_instance_id.as_str())?
        {
            merge_vars(&mut instance.variables, &token.variables);
            instance.updated_at_ms = now;
            self.store.put(&instance)?;
        }

        self.resume_subprocess_host(services, definition, &token, followups)?;
        self.check_completion(services, &token.process_instance_id, followups)?;
        Ok(())
    }

    /// If all children of a waiting sub-process host are terminal, resume
    /// the host past the sub-process element.
    fn resume_subprocess_host(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        token: &Token,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let Some(parent_id) = token.parent_token_id else {
            return Ok(());
        };
        let Some(mut parent) = self.store.get::<Token>(parent_id.as_str())? else {
            return Ok(());
        };
        let Some(WaitReason::GatewayJoin(host_element)) = parent.wait_reason() else {
            return Ok(());
        };
        let Some(host) = definition.element(&host_element) else {
            return Ok(());
        };
        if host.element_type != ElementType::SubProcess {
            return Ok(());
        }
        let children: Vec<Token> = self
            .store
            .load_by_index::<Token>(views::TOKENS_BY_INSTANCE, token.process_instance_id.as_str())?
            .into_iter()
            .filter(|t| t.parent_token_id == Some(parent_id))
            .collect();
        if !children.iter().all(|t| t.is_terminal()) {
            return Ok(());
        }

        let mut merged = VarMap::new();
        for child in &children {
            merge_vars(&mut merged, &child.variables);
        }
        merge_vars(&mut parent.variables, &merged);
        parent.wake(services.now_ms());
        self.store.put(&parent)?;
        self.advance_past_current(services, definition, parent, followups)?;
        Ok(())
    }

    /// When the last token of an instance terminates, complete it and
    /// resume any call-activity parent.
    pub fn check_completion(
        &self,
        services: &dyn EngineServices,
        instance_id: &InstanceId,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let tokens: Vec<Token> = self
            .store
            .load_by_index(views::TOKENS_BY_INSTANCE, instance_id.as_str())?;
        if tokens.is_empty() || !tokens.iter().all(|t| t.is_terminal()) {
            return Ok(());
        }
        let Some(mut instance) = self.store.get::<ProcessInstance>(instance_id.as_str())? else {
            return Ok(());
        };
        if instance.state != InstanceState::Active {
            return Ok(());
        }
        let now = services.now_ms();
        instance.transition(InstanceState::Completed, now);
        instance.current_activity = None;
        self.store.put(&instance)?;
        self.store
            .append_event(&LifecycleEvent::InstanceCompleted { instance_id: *instance_id })?;
        tracing::info!(instance = %instance_id, "process instance completed");

        // Resume the call-activity parent, applying output mappings.
        if let Some(parent_token_id) = instance.parent_token_id {
            let Some(mut parent) = self.store.get::<Token>(parent_token_id.as_str())? else {
                return Ok(());
            };
            let expected = WaitReason::CallActivity(*instance_id).to_wait_string();
            if parent.waiting_for.as_deref() != Some(expected.as_str()) {
                return Ok(());
            }
            let parent_definition = services.definition(&parent.process_key)?;
            let call_element = parent_definition
                .element(&parent.current_element_id)
                .cloned();
            let outputs = match &call_element {
                Some(el) if !el.output_mappings.is_empty() => {
                    match apply_mappings(&instance.variables, &el.output_mappings) {
                        Ok(mapped) => mapped,
                        Err(failure) => {
                            self.open_incident_and_park(services, parent, failure)?;
                            return Ok(());
                        }
                    }
                }
                _ => instance.variables.clone(),
            };
            merge_vars(&mut parent.variables, &outputs);
            parent.wake(now);
            self.store.put(&parent)?;
            self.advance_past_current(services, &parent_definition, parent, followups)?;
        }
        Ok(())
    }

    /// Move a woken token along the outgoing flows of its current element
    /// (used after waits complete; the element is not re-executed).
    fn advance_past_current(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        token: Token,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let Some(element) = definition.element(&token.current_element_id).cloned() else {
            return Ok(());
        };
        let token_id = token.token_id;
        let targets: Vec<ElementId> = element
            .outgoing
            .iter()
            .filter_map(|flow| definition.flow_target(flow))
            .map(|e| e.id.clone())
            .collect();
        if let Flow::Continue =
            self.move_or_fork(services, definition, token, &element, targets, followups)?
        {
            // The token is active on the next element; hand it to the
            // caller's run loop.
            followups.push(token_id);
        }
        Ok(())
    }

    // ── Compensation ────────────────────────────────────────────────────

    /// Record a completed activity's compensation handler, if any.
    fn register_compensation(
        &self,
        definition: &ProcessDefinition,
        token: &Token,
    ) -> Result<(), EngineError> {
        let Some(element) = definition.element(&token.current_element_id) else {
            return Ok(());
        };
        if !element.element_type.is_activity() {
            return Ok(());
        }
        for boundary in definition.boundary_events_for(&element.id) {
            if !matches!(boundary.event_definition, Some(EventDefinition::Compensation)) {
                continue;
            }
            let Some(handler) = boundary
                .outgoing
                .first()
                .and_then(|flow| definition.flow_target(flow))
            else {
                continue;
            };
            let mut log = self
                .store
                .get::<CompensationLog>(token.process_instance_id.as_str())?
                .unwrap_or(CompensationLog {
                    process_instance_id: token.process_instance_id,
                    entries: Vec::new(),
                });
            log.entries.push(CompensationEntry {
                activity: element.id.clone(),
                handler: handler.id.clone(),
                variables: token.variables.clone(),
            });
            self.store.put(&log)?;
        }
        Ok(())
    }

    /// A compensation throw: run registered handlers in reverse completion
    /// order, then clear the log.
    fn run_compensation(
        &self,
        services: &dyn EngineServices,
        instance: &ProcessInstance,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let Some(log) = self
            .store
            .get::<CompensationLog>(instance.instance_id.as_str())?
        else {
            return Ok(());
        };
        let now = services.now_ms();
        for entry in log.entries.iter().rev() {
            let mut handler = Token::new(
                TokenId::generate(services.node()),
                instance.instance_id,
                instance.process_key.clone(),
                entry.handler.clone(),
                now,
            );
            handler.variables = entry.variables.clone();
            self.store.put(&handler)?;
            followups.push(handler.token_id);
            tracing::info!(
                instance = %instance.instance_id,
                activity = %entry.activity,
                handler = %entry.handler,
                "compensating"
            );
        }
        self.store
            .delete::<CompensationLog>(instance.instance_id.as_str())?;
        Ok(())
    }

    // ── Error propagation ───────────────────────────────────────────────

    /// Walk from the current element up the scope chain looking for a
    /// matching error (or escalation) handler. A handled error cancels the
    /// host scope and spawns a token at the handler; an unhandled one
    /// fails the whole instance.
    #[allow(clippy::too_many_arguments)]
    pub fn propagate_error(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        token: Token,
        code: &str,
        message: &str,
        escalation: bool,
        followups: &mut Vec<TokenId>,
    ) -> Result<(), EngineError> {
        let now = services.now_ms();
        tracing::info!(
            token = %token.token_id,
            code,
            escalation,
            "propagating error"
        );

        // Candidate hosts: the current element, then enclosing sub-processes.
        let mut hosts: Vec<&Element> = Vec::new();
        let mut cursor = definition.element(&token.current_element_id);
        while let Some(element) = cursor {
            hosts.push(element);
            cursor = element.scope.as_deref().and_then(|s| definition.element(s));
        }

        for host in hosts {
            for boundary in definition.boundary_events_for(&host.id) {
                let matched = match (&boundary.event_definition, escalation) {
                    (Some(EventDefinition::Error { error_code }), false) => {
                        error_code.as_deref().is_none_or(|c| c == code)
                    }
                    (Some(EventDefinition::Escalation { escalation_code }), true) => {
                        escalation_code.as_deref().is_none_or(|c| c == code)
                    }
                    _ => false,
                };
                if !matched {
                    continue;
                }

                // Cancel the failing token and everything inside the scope.
                self.cancel_token_resources(services, &token)?;
                let mut failing = token;
                failing.cancel(now);
                self.store.put(&failing)?;
                self.cancel_scope_tokens(services, definition, &failing, &host.id)?;

                let mut handler = Token::new(
                    TokenId::generate(services.node()),
                    failing.process_instance_id,
                    failing.process_key.clone(),
                    boundary.id.clone(),
                    now,
                );
                handler.parent_token_id = failing.parent_token_id;
                handler.variables = failing.variables.clone();
                self.store.put(&handler)?;
                followups.push(handler.token_id);
                tracing::info!(
                    handler = %boundary.id,
                    host = %host.id,
                    code,
                    "error caught by boundary handler"
                );
                return Ok(());
            }
        }

        // No handler anywhere: the instance fails.
        self.fail_instance(services, token, code, message)
    }

    /// Cancel all non-terminal tokens inside a scope element (the host's
    /// own parked token included).
    fn cancel_scope_tokens(
        &self,
        services: &dyn EngineServices,
        definition: &ProcessDefinition,
        failing: &Token,
        host_id: &str,
    ) -> Result<(), EngineError> {
        let Some(host) = definition.element(host_id) else {
            return Ok(());
        };
        if host.element_type != ElementType::SubProcess {
            return Ok(());
        }
        let tokens: Vec<Token> = self
            .store
            .load_by_index(views::TOKENS_BY_INSTANCE, failing.process_instance_id.as_str())?;
        for t in tokens {
            if t.is_terminal() || t.token_id == failing.token_id {
                continue;
            }
            let inside = definition
                .element(&t.current_element_id)
                .is_some_and(|e| in_scope(definition, e, host_id));
            let is_host = t.current_element_id.as_str() == host_id;
            if inside || is_host {
                self.cancel_token(services, &t.token_id)?;
            }
        }
        Ok(())
    }

    /// Unhandled failure: cancel everything, fail the instance, open a
    /// PROCESS_ERROR incident.
    fn fail_instance(
        &self,
        services: &dyn EngineServices,
        token: Token,
        code: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        let now = services.now_ms();
        let instance_id = token.process_instance_id;

        let tokens: Vec<Token> = self
            .store
            .load_by_index(views::TOKENS_BY_INSTANCE, instance_id.as_str())?;
        for t in tokens {
            if !t.is_terminal() {
                self.cancel_token(services, &t.token_id)?;
            }
        }

        if let Some(mut instance) = self.store.get::<ProcessInstance>(instance_id.as_str())? {
            instance.transition(InstanceState::Failed, now);
            self.store.put(&instance)?;
            self.store.append_event(&LifecycleEvent::InstanceFailed {
                instance_id,
                reason: message.to_string(),
            })?;

            services.open_incident(IncidentDraft {
                incident_type: IncidentType::ProcessError,
                message: format!("unhandled BPMN error {code:?}: {message}"),
                error_code: if code.is_empty() { None } else { Some(code.to_string()) },
                process_instance_id: instance_id,
                process_key: instance.process_key.clone(),
                element_id: token.current_element_id.clone(),
                element_type: "errorEvent".to_string(),
                token_id: Some(token.token_id),
                job_key: None,
                timer_id: None,
                original_retries: 0,
                metadata: VarMap::new(),
            })?;
            tracing::error!(instance = %instance_id, code, message, "instance failed");

            // A failed call-activity child surfaces on the parent: an
            // incident on the call-activity element parks the caller.
            if let Some(parent_token_id) = instance.parent_token_id {
                if let Some(parent) = self.store.get::<Token>(parent_token_id.as_str())? {
                    if !parent.is_terminal() {
                        let incident = services.open_incident(IncidentDraft {
                            incident_type: IncidentType::ProcessError,
                            message: format!(
                                "called process instance {instance_id} failed: {message}"
                            ),
                            error_code: None,
                            process_instance_id: parent.process_instance_id,
                            process_key: parent.process_key.clone(),
                            element_id: parent.current_element_id.clone(),
                            element_type: "callActivity".to_string(),
                            token_id: Some(parent.token_id),
                            job_key: None,
                            timer_id: None,
                            original_retries: 0,
                            metadata: VarMap::new(),
                        })?;
                        self.park_on_incident(services, &parent_token_id, &incident.id)?;
                    }
                }
            }
        }
        Ok(())
    }

    // ── Incidents and resource cleanup ──────────────────────────────────

    /// Open an incident for an executor failure and park the token on it.
    fn open_incident_and_park(
        &self,
        services: &dyn EngineServices,
        mut token: Token,
        failure: ExecFailure,
    ) -> Result<(), EngineError> {
        let now = services.now_ms();
        let element_type = services
            .definition(&token.process_key)
            .ok()
            .and_then(|d| d.element(&token.current_element_id).map(|e| e.element_type.to_string()))
            .unwrap_or_default();

        let incident = services.open_incident(IncidentDraft {
            incident_type: failure.incident_type,
            message: failure.message,
            error_code: failure.error_code,
            process_instance_id: token.process_instance_id,
            process_key: token.process_key.clone(),
            element_id: token.current_element_id.clone(),
            element_type,
            token_id: Some(token.token_id),
            job_key: None,
            timer_id: None,
            original_retries: 0,
            metadata: VarMap::new(),
        })?;
        token.set_waiting(&WaitReason::Incident(incident.id), now);
        self.store.put(&token)?;
        Ok(())
    }

    /// Release whatever external resource a waiting token holds.
    fn cancel_token_resources(
        &self,
        services: &dyn EngineServices,
        token: &Token,
    ) -> Result<(), EngineError> {
        match token.wait_reason() {
            Some(WaitReason::Job(job_key)) => services.cancel_job(&job_key)?,
            Some(WaitReason::Timer(timer_id)) => {
                services.cancel_timer(&timer_id)?;
            }
            Some(WaitReason::Message(sub_id)) => services.cancel_subscription(&sub_id)?,
            Some(WaitReason::CallActivity(child)) => services.cancel_instance(&child)?,
            Some(WaitReason::GatewayJoin(_)) | Some(WaitReason::Incident(_)) | None => {}
        }
        self.cancel_watchers(services, &token.token_id)
    }

    /// Record the instance's "where is it now" hint for observability.
    fn note_current_activity(
        &self,
        instance: &ProcessInstance,
        element: &Element,
    ) -> Result<(), EngineError> {
        if !element.element_type.is_activity() {
            return Ok(());
        }
        if instance.current_activity.as_ref() == Some(&element.id) {
            return Ok(());
        }
        let mut updated = instance.clone();
        updated.current_activity = Some(element.id.clone());
        self.store.put(&updated)?;
        Ok(())
    }
}

fn is_conditional_catch(element: &Element) -> bool {
    matches!(element.event_definition, Some(EventDefinition::Conditional { .. }))
}

fn in_scope(definition: &ProcessDefinition, element: &Element, scope_id: &str) -> bool {
    let mut cursor = element.scope.as_deref();
    while let Some(s) = cursor {
        if s == scope_id {
            return true;
        }
        cursor = definition.element(s).and_then(|e| e.scope.as_deref());
    }
    false
}

/// Build a durable timer record from a parsed spec.
#[allow(clippy::too_many_arguments)]
fn build_timer(
    node: &str,
    tenant: &str,
    parsed: &TimeSpec,
    original: &str,
    binding: TimerBinding,
    token_id: Option<TokenId>,
    element_id: Option<ElementId>,
    now_ms: u64,
) -> TimerRecord {
    let (kind, repetitions, interval_ms) = match parsed {
        TimeSpec::Duration(_) => (TimerKind::Duration, None, None),
        TimeSpec::Date(_) => (TimerKind::Date, None, None),
        TimeSpec::Cycle { repetitions, interval } => (
            TimerKind::Cycle,
            *repetitions,
            Some(interval.as_millis() as u64),
        ),
    };
    TimerRecord {
        timer_id: TimerId::generate(node),
        tenant_id: tenant.to_string(),
        kind,
        original_spec: original.to_string(),
        fires_at_ms: parsed.fires_at_ms(now_ms),
        repetitions,
        interval_ms,
        binding,
        token_id,
        element_id,
        metadata: VarMap::new(),
        callback_target: "interpreter".to_string(),
        status: TimerStatus::Scheduled,
        wheel_level: 0,
        slot_position: 0,
    }
}
