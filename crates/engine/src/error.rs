// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine errors and their mapping onto the external taxonomy.

use thiserror::Error;
use weir_core::ErrorKind;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("deadline exceeded waiting for {0}")]
    DeadlineExceeded(String),

    #[error("mailbox {0} is full")]
    Busy(String),

    #[error("storage failure: {0}")]
    Storage(#[from] weir_storage::StorageError),

    #[error("expression failure: {0}")]
    Expression(#[from] weir_expr::ExprError),

    #[error("timer specification: {0}")]
    TimeSpec(#[from] weir_core::TimeSpecError),

    #[error("internal: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound { entity, id: id.into() }
    }

    /// External taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            EngineError::InvalidArgument(_) | EngineError::TimeSpec(_) => {
                ErrorKind::InvalidArgument
            }
            EngineError::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            EngineError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            EngineError::Busy(_) => ErrorKind::Unavailable,
            EngineError::Expression(_) => ErrorKind::InvalidArgument,
            EngineError::Storage(_) | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
