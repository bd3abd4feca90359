// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ast::{CmpOp, Expr, PathSeg};
use weir_core::Value;

fn parse(s: &str) -> Expr {
    parse_expression(s).unwrap()
}

#[test]
fn literals() {
    assert_eq!(parse("42"), Expr::Literal(Value::Int(42)));
    assert_eq!(parse("-3"), Expr::Literal(Value::Int(-3)));
    assert_eq!(parse("2.5"), Expr::Literal(Value::Float(2.5)));
    assert_eq!(parse("true"), Expr::Literal(Value::Bool(true)));
    assert_eq!(parse("false"), Expr::Literal(Value::Bool(false)));
    assert_eq!(parse("null"), Expr::Literal(Value::Null));
}

#[test]
fn string_literals_both_quote_styles() {
    assert_eq!(parse(r#""hello""#), Expr::Literal(Value::Str("hello".into())));
    assert_eq!(parse("'hello'"), Expr::Literal(Value::Str("hello".into())));
    assert_eq!(parse(r#""""#), Expr::Literal(Value::Str(String::new())));
    assert_eq!(
        parse(r#""a\"b""#),
        Expr::Literal(Value::Str("a\"b".into()))
    );
}

#[test]
fn simple_path() {
    assert_eq!(parse("x"), Expr::Path(vec![PathSeg::Name("x".into())]));
    assert_eq!(
        parse("order.total"),
        Expr::Path(vec![
            PathSeg::Name("order".into()),
            PathSeg::Name("total".into())
        ])
    );
}

#[test]
fn indexed_path() {
    let expr = parse("items[0].price");
    assert_eq!(
        expr,
        Expr::Path(vec![
            PathSeg::Name("items".into()),
            PathSeg::Index(Box::new(Expr::Literal(Value::Int(0)))),
            PathSeg::Name("price".into()),
        ])
    );
}

#[test]
fn index_accepts_expressions() {
    let expr = parse("m[key]");
    assert_eq!(
        expr,
        Expr::Path(vec![
            PathSeg::Name("m".into()),
            PathSeg::Index(Box::new(Expr::Path(vec![PathSeg::Name("key".into())]))),
        ])
    );
}

#[test]
fn comparison_chain_is_left_associative() {
    // (a == b) == c
    let expr = parse("a == b == c");
    match expr {
        Expr::Compare { op: CmpOp::Eq, lhs, .. } => {
            assert!(matches!(*lhs, Expr::Compare { op: CmpOp::Eq, .. }));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[yare::parameterized(
    eq = { "x == 1", CmpOp::Eq },
    ne = { "x != 1", CmpOp::Ne },
    gt = { "x > 1", CmpOp::Gt },
    lt = { "x < 1", CmpOp::Lt },
    ge = { "x >= 1", CmpOp::Ge },
    le = { "x <= 1", CmpOp::Le },
)]
fn comparison_operators(input: &str, expected: CmpOp) {
    match parse(input) {
        Expr::Compare { op, .. } => assert_eq!(op, expected),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn and_binds_tighter_than_or() {
    // a or (b and c)
    let expr = parse("a or b and c");
    match expr {
        Expr::Or(_, rhs) => assert!(matches!(*rhs, Expr::And(..))),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn not_binds_tighter_than_comparison() {
    // (not a) == b
    let expr = parse("not a == b");
    match expr {
        Expr::Compare { op: CmpOp::Eq, lhs, .. } => {
            assert!(matches!(*lhs, Expr::Not(..)));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn not_is_right_associative() {
    let expr = parse("not not x");
    match expr {
        Expr::Not(inner) => assert!(matches!(*inner, Expr::Not(..))),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn parentheses_override_precedence() {
    // (a or b) and c
    let expr = parse("(a or b) and c");
    match expr {
        Expr::And(lhs, _) => assert!(matches!(*lhs, Expr::Or(..))),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn keywords_do_not_eat_identifiers() {
    // "order" starts with "or" but is one identifier
    assert_eq!(parse("order"), Expr::Path(vec![PathSeg::Name("order".into())]));
    // "android" starts with "and"
    match parse("x and android") {
        Expr::And(_, rhs) => {
            assert_eq!(*rhs, Expr::Path(vec![PathSeg::Name("android".into())]));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[yare::parameterized(
    empty        = { "" },
    dangling_op  = { "x ==" },
    unclosed     = { "(x" },
    bad_index    = { "a[" },
    trailing     = { "x 1" },
    lone_keyword = { "and" },
)]
fn parse_errors(input: &str) {
    assert!(parse_expression(input).is_err());
}

#[test]
fn whitespace_is_insignificant() {
    assert_eq!(parse("  x  ==  1  "), parse("x==1"));
    assert_eq!(parse("not  x"), parse("not x"));
}
