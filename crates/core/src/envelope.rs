// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON request/response envelopes for the in-process bus.
//!
//! Every cross-component request is `{type, request_id, payload}`; the
//! matching response is `{type: "<type>_response", request_id, success,
//! result | error}`. Correlation is end-to-end on `request_id`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A correlated request addressed to a component mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Verb and object, e.g. `complete_job`, `fire_timer`.
    #[serde(rename = "type")]
    pub request_type: String,
    pub request_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RequestEnvelope {
    /// Build a request with a fresh random `request_id`.
    pub fn new(request_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            request_type: request_type.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            payload,
        }
    }

    /// Build a request under an explicit `request_id` (idempotent retries).
    pub fn with_id(
        request_type: impl Into<String>,
        request_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            request_type: request_type.into(),
            request_id: request_id.into(),
            payload,
        }
    }

    /// The type tag of the paired response.
    pub fn response_type(&self) -> String {
        format!("{}_response", self.request_type)
    }

    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(s: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// The correlated response to a [`RequestEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub response_type: String,
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(request: &RequestEnvelope, result: serde_json::Value) -> Self {
        Self {
            response_type: request.response_type(),
            request_id: request.request_id.clone(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(request: &RequestEnvelope, error: impl Into<String>) -> Self {
        Self {
            response_type: request.response_type(),
            request_id: request.request_id.clone(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(s: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
