// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expression evaluation errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("parse error in {input:?}: {message}")]
    Parse { input: String, message: String },

    /// Navigating into a value with the wrong shape (e.g. `x.field` where
    /// `x` is a number). Distinct from a missing field, which yields null.
    #[error("cannot navigate {segment:?} into {found} value")]
    PathShape { segment: String, found: &'static str },

    #[error("operator {op} not applicable to {found} value")]
    Type { op: &'static str, found: &'static str },

    /// Top-level condition evaluated to a non-boolean, non-null value.
    #[error("condition evaluated to {found}, expected boolean")]
    NotBoolean { found: &'static str },
}
