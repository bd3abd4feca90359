// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage errors.
//!
//! I/O failures are fatal for the operation; callers propagate them and
//! never retry inside the facade.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("corrupt store entry at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}
