// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! weir-expr: FEEL-subset expression evaluation.
//!
//! Three syntaxes over a variable map:
//! - `${name}` / `#{name}` — simple substitution (unknown names keep the
//!   literal and log a warning)
//! - `=<expr>` — FEEL-subset expressions
//! - bare identifier paths — treated as FEEL when they parse
//!
//! The FEEL subset: path access, unary `not`, comparisons, `and`/`or` with
//! three-valued null logic. Missing variables and fields evaluate to null;
//! only shape errors (indexing a number, comparing a gateway condition that
//! isn't boolean) surface as errors.

pub mod ast;
pub mod error;
pub mod eval;
pub mod interpolate;
pub mod parser;
pub mod retries;

pub use ast::{CmpOp, Expr, PathSeg};
pub use error::ExprError;
pub use eval::{evaluate, evaluate_condition, evaluate_text};
pub use interpolate::{interpolate_params, substitute};
pub use parser::parse_expression;
pub use retries::parse_retries;
