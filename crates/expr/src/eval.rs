// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expression evaluation with FEEL null semantics.
//!
//! Missing variables and missing map fields evaluate to null. Logic
//! operators are three-valued (Kleene): `true or null → true`,
//! `false and null → false`, everything else involving null stays null.
//! A top-level condition converts null to false.

use crate::ast::{CmpOp, Expr, PathSeg};
use crate::error::ExprError;
use crate::parser::{is_identifier_path, parse_expression};
use weir_core::{Value, VarMap};

/// Evaluate a parsed expression against a variable map.
pub fn evaluate(expr: &Expr, vars: &VarMap) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(segs) => eval_path(segs, vars),
        Expr::Not(inner) => match evaluate(inner, vars)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Null),
            other => Err(ExprError::Type { op: "not", found: other.type_name() }),
        },
        Expr::Compare { op, lhs, rhs } => {
            let l = evaluate(lhs, vars)?;
            let r = evaluate(rhs, vars)?;
            Ok(compare(*op, &l, &r))
        }
        Expr::And(lhs, rhs) => {
            // Kleene and: false dominates null.
            let l = tristate(&evaluate(lhs, vars)?);
            if l == Some(false) {
                return Ok(Value::Bool(false));
            }
            let r = tristate(&evaluate(rhs, vars)?);
            Ok(match (l, r) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            })
        }
        Expr::Or(lhs, rhs) => {
            // Kleene or: true dominates null.
            let l = tristate(&evaluate(lhs, vars)?);
            if l == Some(true) {
                return Ok(Value::Bool(true));
            }
            let r = tristate(&evaluate(rhs, vars)?);
            Ok(match (l, r) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            })
        }
    }
}

/// Evaluate expression text in any of the three accepted syntaxes.
///
/// - `=<expr>` — FEEL
/// - `${name}` / `#{name}` — substitution; unknown names return the
///   original literal (with a warning) rather than failing
/// - bare identifier paths — FEEL
/// - anything else — returned as a literal string
pub fn evaluate_text(text: &str, vars: &VarMap) -> Result<Value, ExprError> {
    let trimmed = text.trim();
    if let Some(body) = trimmed.strip_prefix('=') {
        let expr = parse_expression(body)?;
        return evaluate(&expr, vars);
    }
    if let Some(name) = placeholder_name(trimmed) {
        return Ok(match vars.get(name) {
            Some(v) => v.clone(),
            None => {
                tracing::warn!(name, "unknown variable in placeholder, keeping literal");
                Value::Str(text.to_string())
            }
        });
    }
    if is_identifier_path(trimmed) {
        let expr = parse_expression(trimmed)?;
        return evaluate(&expr, vars);
    }
    Ok(Value::Str(text.to_string()))
}

/// Evaluate a condition to a boolean. Null converts to false at the top
/// level; any other non-boolean result is an error.
pub fn evaluate_condition(text: &str, vars: &VarMap) -> Result<bool, ExprError> {
    match evaluate_text(text, vars)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(ExprError::NotBoolean { found: other.type_name() }),
    }
}

/// `${name}` / `#{name}` → `name`, when the whole input is one placeholder.
fn placeholder_name(s: &str) -> Option<&str> {
    let body = s
        .strip_prefix("${")
        .or_else(|| s.strip_prefix("#{"))?
        .strip_suffix('}')?;
    if body.is_empty() || body.contains(['{', '}']) {
        return None;
    }
    Some(body)
}

fn eval_path(segs: &[PathSeg], vars: &VarMap) -> Result<Value, ExprError> {
    let mut current = match segs.first() {
        Some(PathSeg::Name(head)) => vars.get(head).cloned().unwrap_or(Value::Null),
        // Parser always emits a Name head.
        _ => Value::Null,
    };

    for seg in &segs[1..] {
        current = match seg {
            PathSeg::Name(name) => match &current {
                Value::Map(fields) => fields.get(name).cloned().unwrap_or(Value::Null),
                // Missing data is null; navigating into a scalar is a shape error.
                Value::Null => Value::Null,
                other => {
                    return Err(ExprError::PathShape {
                        segment: name.clone(),
                        found: other.type_name(),
                    })
                }
            },
            PathSeg::Index(idx_expr) => {
                let idx = evaluate(idx_expr, vars)?;
                index_value(&current, &idx)?
            }
        };
    }
    Ok(current)
}

fn index_value(base: &Value, idx: &Value) -> Result<Value, ExprError> {
    match (base, idx) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::List(items), Value::Int(i)) => {
            let i = *i;
            if i < 0 || i as usize >= items.len() {
                Ok(Value::Null)
            } else {
                Ok(items[i as usize].clone())
            }
        }
        (Value::List(_), other) => Err(ExprError::PathShape {
            segment: "[]".to_string(),
            found: other.type_name(),
        }),
        (Value::Map(fields), Value::Str(key)) => {
            Ok(fields.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Map(_), other) => Err(ExprError::PathShape {
            segment: "[]".to_string(),
            found: other.type_name(),
        }),
        (other, _) => Err(ExprError::PathShape {
            segment: "[]".to_string(),
            found: other.type_name(),
        }),
    }
}

/// Boolean view for logic operators: `Some(bool)` for booleans, `None`
/// for null and anything non-boolean.
fn tristate(v: &Value) -> Option<bool> {
    v.as_bool()
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Value {
    match op {
        CmpOp::Eq => Value::Bool(values_equal(l, r)),
        CmpOp::Ne => Value::Bool(!values_equal(l, r)),
        CmpOp::Ge if l.is_null() && r.is_null() => Value::Bool(true),
        CmpOp::Le if l.is_null() && r.is_null() => Value::Bool(true),
        // Any other relational involving null is false.
        _ if l.is_null() || r.is_null() => Value::Bool(false),
        CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => {
            match (numeric(l), numeric(r)) {
                (Some(a), Some(b)) => Value::Bool(match op {
                    CmpOp::Gt => a > b,
                    CmpOp::Lt => a < b,
                    CmpOp::Ge => a >= b,
                    CmpOp::Le => a <= b,
                    CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
                }),
                // Relational ordering is numeric-only in the subset.
                _ => Value::Bool(false),
            }
        }
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    }
}

/// Equality with numeric coercion, falling back to formatted strings.
fn values_equal(l: &Value, r: &Value) -> bool {
    if l.is_null() || r.is_null() {
        return l.is_null() && r.is_null();
    }
    if let (Some(a), Some(b)) = (numeric(l), numeric(r)) {
        return a == b;
    }
    if let (Value::Bool(a), Value::Bool(b)) = (l, r) {
        return a == b;
    }
    l.display_string() == r.display_string()
}

/// Numeric view with string coercion: strings that parse cleanly count.
fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;
