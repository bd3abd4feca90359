// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FEEL-subset abstract syntax tree.
//!
//! `Display` prints a canonical form with minimal parentheses; printing a
//! parsed expression and reparsing it yields the same tree.

use weir_core::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        }
    }
}

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    /// `.name` (or the path head)
    Name(String),
    /// `[expr]` — integer index into lists, key into maps
    Index(Box<Expr>),
}

/// A FEEL-subset expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `a.b[c]` — head name plus navigation segments.
    Path(Vec<PathSeg>),
    Not(Box<Expr>),
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Binding tightness: or(1) < and(2) < compare(3) < not(4) < primary(5).
    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Compare { .. } => 3,
            Expr::Not(..) => 4,
            Expr::Literal(..) | Expr::Path(..) => 5,
        }
    }

    fn fmt_child(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        child: &Expr,
        needs_parens: bool,
    ) -> std::fmt::Result {
        let _ = self;
        if needs_parens {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(v) => fmt_literal(f, v),
            Expr::Path(segs) => {
                for (i, seg) in segs.iter().enumerate() {
                    match seg {
                        PathSeg::Name(name) => {
                            if i > 0 {
                                f.write_str(".")?;
                            }
                            f.write_str(name)?;
                        }
                        PathSeg::Index(idx) => write!(f, "[{idx}]")?,
                    }
                }
                Ok(())
            }
            Expr::Not(inner) => {
                f.write_str("not ")?;
                self.fmt_child(f, inner, inner.precedence() < 4)
            }
            Expr::Compare { op, lhs, rhs } => {
                self.fmt_child(f, lhs, lhs.precedence() < 3)?;
                write!(f, " {} ", op.symbol())?;
                self.fmt_child(f, rhs, rhs.precedence() <= 3)
            }
            Expr::And(lhs, rhs) => {
                self.fmt_child(f, lhs, lhs.precedence() < 2)?;
                f.write_str(" and ")?;
                self.fmt_child(f, rhs, rhs.precedence() <= 2)
            }
            Expr::Or(lhs, rhs) => {
                self.fmt_child(f, lhs, lhs.precedence() < 1)?;
                f.write_str(" or ")?;
                self.fmt_child(f, rhs, rhs.precedence() <= 1)
            }
        }
    }
}

fn fmt_literal(f: &mut std::fmt::Formatter<'_>, v: &Value) -> std::fmt::Result {
    match v {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(i) => write!(f, "{i}"),
        // {:?} keeps the decimal point so floats reparse as floats.
        Value::Float(x) => write!(f, "{x:?}"),
        Value::Str(s) => {
            f.write_str("\"")?;
            for ch in s.chars() {
                match ch {
                    '"' => f.write_str("\\\"")?,
                    '\\' => f.write_str("\\\\")?,
                    other => write!(f, "{other}")?,
                }
            }
            f.write_str("\"")
        }
        // Lists and maps have no literal syntax in the subset; they only
        // appear as evaluation results.
        other => write!(f, "{}", other.to_json()),
    }
}
