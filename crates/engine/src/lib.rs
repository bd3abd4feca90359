// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! weir-engine: the execution substrate.
//!
//! Components own their state and talk through messages: the hierarchical
//! timing wheel schedules and fires durable timers, the correlator matches
//! messages to subscriptions, the broker hands jobs to workers, the
//! incident store records non-transient failures, and the interpreter
//! advances tokens across deployed process graphs. [`Engine`] is the
//! facade the (out-of-scope) RPC surface talks to.

pub mod broker;
pub mod bus;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod incident;
pub mod interpreter;
pub mod wheel;

pub use broker::{CompleteOutcome, FailOutcome, JobBroker, JobRequest};
pub use bus::{Dispatcher, Mailbox};
pub use config::{EngineConfig, WheelConfig};
pub use correlator::{Correlator, PublishDisposition, PublishReceipt, PublishRequest};
pub use engine::{Engine, EngineStats};
pub use error::EngineError;
pub use incident::{IncidentDraft, IncidentStore, ResolveOutcome};
pub use interpreter::{EngineServices, Interpreter};
pub use wheel::{TimerInfo, TimingWheel};
