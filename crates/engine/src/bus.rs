// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process message bus: named component mailboxes and a dispatcher
//! pairing responses to requests by `request_id`.
//!
//! Mailboxes are bounded; a full mailbox rejects with `Busy` and the
//! dispatcher retries transient rejections with a short backoff before
//! surfacing them. Response waits take a deadline; a late response is
//! discarded (all mutations are idempotent on `request_id`).

use crate::error::EngineError;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use weir_core::{RequestEnvelope, ResponseEnvelope};

/// Transient-rejection retry attempts before surfacing `Busy`.
const ROUTE_ATTEMPTS: usize = 3;
const ROUTE_BACKOFF: Duration = Duration::from_millis(1);

/// A bounded FIFO request queue owned by one component.
pub struct Mailbox {
    name: String,
    capacity: usize,
    queue: Mutex<VecDeque<RequestEnvelope>>,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue without blocking; `Busy` when the backlog is at capacity.
    pub fn try_push(&self, envelope: RequestEnvelope) -> Result<(), EngineError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(EngineError::Busy(self.name.clone()));
        }
        queue.push_back(envelope);
        Ok(())
    }

    pub fn pop(&self) -> Option<RequestEnvelope> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct ResponseState {
    /// requester component → responses awaiting pickup
    queues: HashMap<String, VecDeque<ResponseEnvelope>>,
    /// request_id → requester component (set at route time)
    reply_to: HashMap<String, String>,
}

/// Routes requests to component mailboxes and pairs responses back to the
/// requesting component.
pub struct Dispatcher {
    mailboxes: Mutex<HashMap<String, Arc<Mailbox>>>,
    responses: Mutex<ResponseState>,
    wakeup: Condvar,
    capacity: usize,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            responses: Mutex::new(ResponseState::default()),
            wakeup: Condvar::new(),
            capacity,
        }
    }

    /// Register (or fetch) the mailbox for a component.
    pub fn mailbox(&self, component: &str) -> Arc<Mailbox> {
        let mut mailboxes = self.mailboxes.lock();
        mailboxes
            .entry(component.to_string())
            .or_insert_with(|| Arc::new(Mailbox::new(component, self.capacity)))
            .clone()
    }

    /// Route a request to `target`, recording `requester` for the response.
    /// A full mailbox is retried briefly, then surfaced as `Busy`.
    pub fn route(
        &self,
        requester: &str,
        target: &str,
        envelope: RequestEnvelope,
    ) -> Result<(), EngineError> {
        let mailbox = self.mailbox(target);
        let mut last_err = None;
        for attempt in 0..ROUTE_ATTEMPTS {
            match mailbox.try_push(envelope.clone()) {
                Ok(()) => {
                    self.responses
                        .lock()
                        .reply_to
                        .insert(envelope.request_id.clone(), requester.to_string());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        target,
                        attempt,
                        request = %envelope.request_type,
                        "mailbox full, backing off"
                    );
                    last_err = Some(e);
                    std::thread::sleep(ROUTE_BACKOFF);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| EngineError::Busy(target.to_string())))
    }

    /// Deliver a response to whichever component issued the request. A
    /// response with no recorded requester (deadline already expired and
    /// the waiter gave up, or fire-and-forget) is dropped.
    pub fn complete(&self, response: ResponseEnvelope) {
        let mut state = self.responses.lock();
        match state.reply_to.remove(&response.request_id) {
            Some(requester) => {
                state.queues.entry(requester).or_default().push_back(response);
                self.wakeup.notify_all();
            }
            None => {
                tracing::debug!(
                    request_id = %response.request_id,
                    "discarding uncorrelated response"
                );
            }
        }
    }

    /// Dequeue the next response addressed to `component`, waiting up to
    /// `timeout`. Request flows are correlated end-to-end on `request_id`,
    /// so the next response is always the right one for the single
    /// outstanding request of that component.
    pub fn wait_for_response(
        &self,
        component: &str,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, EngineError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.responses.lock();
        loop {
            if let Some(queue) = state.queues.get_mut(component) {
                if let Some(response) = queue.pop_front() {
                    return Ok(response);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::DeadlineExceeded(format!(
                    "response for {component}"
                )));
            }
            let result = self.wakeup.wait_until(&mut state, deadline);
            if result.timed_out() {
                // Loop once more to drain anything that raced the timeout.
                if let Some(response) =
                    state.queues.get_mut(component).and_then(|q| q.pop_front())
                {
                    return Ok(response);
                }
                return Err(EngineError::DeadlineExceeded(format!(
                    "response for {component}"
                )));
            }
        }
    }

    /// Drop the correlation entry for an abandoned request so its eventual
    /// response is discarded instead of queued.
    pub fn abandon(&self, request_id: &str) {
        self.responses.lock().reply_to.remove(request_id);
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
