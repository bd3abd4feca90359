// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`Record`] implementations for the core domain types.

use crate::record::{IndexEntry, Record};
use crate::views;
use weir_core::{
    BufferedMessage, Incident, Job, MessageSubscription, ProcessDefinition, ProcessInstance,
    TimerRecord, Token,
};

impl Record for ProcessDefinition {
    const KIND: &'static str = "process";

    fn key(&self) -> String {
        self.process_key()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        vec![
            IndexEntry::ordered(
                views::PROCESSES_BY_PROCESS_ID,
                self.process_id.clone(),
                self.version as u64,
            ),
            IndexEntry::new(views::PROCESSES_ALL, "all"),
        ]
    }
}

impl Record for ProcessInstance {
    const KIND: &'static str = "instance";

    fn key(&self) -> String {
        self.instance_id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        vec![IndexEntry::new(views::INSTANCES_BY_STATE, self.state.to_string())]
    }
}

impl Record for Token {
    const KIND: &'static str = "token";

    fn key(&self) -> String {
        self.token_id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new(views::TOKENS_BY_INSTANCE, self.process_instance_id.to_string()),
            IndexEntry::new(views::TOKENS_BY_STATE, self.state.to_string()),
        ];
        if let Some(waiting) = &self.waiting_for {
            entries.push(IndexEntry::new(views::TOKENS_BY_WAITING, waiting.clone()));
        }
        entries
    }
}

impl Record for TimerRecord {
    const KIND: &'static str = "timer";

    fn key(&self) -> String {
        self.timer_id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        vec![IndexEntry::ordered(
            views::TIMERS_BY_STATUS,
            self.status.to_string(),
            self.fires_at_ms,
        )]
    }
}

impl Record for Job {
    const KIND: &'static str = "job";

    fn key(&self) -> String {
        self.job_key.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        vec![
            IndexEntry::new(
                views::JOBS_BY_TYPE_STATE,
                views::job_type_state(&self.job_type, &self.state.to_string()),
            ),
            IndexEntry::new(views::JOBS_BY_STATE, self.state.to_string()),
            IndexEntry::new(views::JOBS_BY_INSTANCE, self.process_instance_id.to_string()),
        ]
    }
}

impl Record for MessageSubscription {
    const KIND: &'static str = "subscription";

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        vec![IndexEntry::new(
            views::SUBSCRIPTIONS_BY_SCOPE,
            views::message_scope(&self.tenant_id, &self.message_name, &self.correlation_key),
        )]
    }
}

impl Record for BufferedMessage {
    const KIND: &'static str = "buffered_message";

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        vec![
            IndexEntry::ordered(
                views::BUFFERED_BY_SCOPE,
                views::message_scope(&self.tenant_id, &self.name, &self.correlation_key),
                self.published_at_ms,
            ),
            IndexEntry::new(views::BUFFERED_ALL, "all"),
        ]
    }
}

impl Record for Incident {
    const KIND: &'static str = "incident";

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn index_entries(&self) -> Vec<IndexEntry> {
        vec![
            IndexEntry::new(views::INCIDENTS_BY_STATUS, self.status.to_string()),
            IndexEntry::new(views::INCIDENTS_BY_INSTANCE, self.process_instance_id.to_string()),
        ]
    }
}
