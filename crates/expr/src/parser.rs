// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nom parser for the FEEL subset.
//!
//! Grammar, loosest first:
//! ```text
//! or_expr  = and_expr ("or" and_expr)*
//! and_expr = cmp_expr ("and" cmp_expr)*
//! cmp_expr = unary (("==" | "!=" | ">=" | "<=" | ">" | "<") unary)*
//! unary    = "not" unary | primary
//! primary  = literal | path | "(" or_expr ")"
//! path     = identifier ("." identifier | "[" or_expr "]")*
//! ```
//! All binary operators are left-associative; `not` binds tighter than
//! comparisons.

use crate::ast::{CmpOp, Expr, PathSeg};
use crate::error::ExprError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, recognize, verify};
use nom::multi::many0;
use nom::number::complete::recognize_float;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use weir_core::Value;

const KEYWORDS: &[&str] = &["and", "or", "not", "true", "false", "null"];

/// Parse a complete expression, requiring full input consumption.
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    match all_consuming(delimited(multispace0, or_expr, multispace0))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(e) => Err(ExprError::Parse {
            input: input.to_string(),
            message: e.to_string(),
        }),
    }
}

/// True if the input is a bare identifier path (usable without a `=` prefix).
pub fn is_identifier_path(input: &str) -> bool {
    matches!(
        all_consuming(delimited(multispace0, path, multispace0))(input),
        Ok((_, Expr::Path(_)))
    )
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), and_expr))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, rhs| {
        Expr::Or(Box::new(acc), Box::new(rhs))
    })))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = cmp_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("and")), cmp_expr))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, rhs| {
        Expr::And(Box::new(acc), Box::new(rhs))
    })))
}

fn cmp_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(cmp_op), unary))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, (op, rhs)| Expr::Compare {
        op,
        lhs: Box::new(acc),
        rhs: Box::new(rhs),
    })))
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    // Two-character operators first so ">=" never matches as ">".
    alt((
        map(tag("=="), |_| CmpOp::Eq),
        map(tag("!="), |_| CmpOp::Ne),
        map(tag(">="), |_| CmpOp::Ge),
        map(tag("<="), |_| CmpOp::Le),
        map(tag(">"), |_| CmpOp::Gt),
        map(tag("<"), |_| CmpOp::Lt),
    ))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(keyword("not")), unary), |e| Expr::Not(Box::new(e))),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((
            literal,
            path,
            delimited(ws(char('(')), or_expr, ws(char(')'))),
        )),
    )(input)
}

fn literal(input: &str) -> IResult<&str, Expr> {
    alt((
        map(keyword("true"), |_| Expr::Literal(Value::Bool(true))),
        map(keyword("false"), |_| Expr::Literal(Value::Bool(false))),
        map(keyword("null"), |_| Expr::Literal(Value::Null)),
        string_literal,
        number,
    ))(input)
}

fn path(input: &str) -> IResult<&str, Expr> {
    let (input, head) = identifier(input)?;
    let (input, tail) = many0(alt((
        map(preceded(char('.'), identifier), |name| {
            PathSeg::Name(name.to_string())
        }),
        map(delimited(ws(char('[')), or_expr, ws(char(']'))), |idx| {
            PathSeg::Index(Box::new(idx))
        }),
    )))(input)?;

    let mut segs = Vec::with_capacity(tail.len() + 1);
    segs.push(PathSeg::Name(head.to_string()));
    segs.extend(tail);
    Ok((input, Expr::Path(segs)))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    verify(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        |s: &str| !KEYWORDS.contains(&s),
    )(input)
}

/// Match a keyword without eating a longer identifier ("or" vs "order").
fn keyword(kw: &'static str) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input: &str| {
        let (rest, matched) = tag(kw)(input)?;
        if rest
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        } else {
            Ok((rest, matched))
        }
    }
}

fn number(input: &str) -> IResult<&str, Expr> {
    let (rest, text) = recognize_float(input)?;
    let value = if text.contains(['.', 'e', 'E']) {
        match text.parse::<f64>() {
            Ok(f) => Value::Float(f),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Float,
                )))
            }
        }
    } else {
        match text.parse::<i64>() {
            Ok(i) => Value::Int(i),
            // Magnitude beyond i64: keep it as a float.
            Err(_) => match text.parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => {
                    return Err(nom::Err::Error(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::Digit,
                    )))
                }
            },
        }
    };
    Ok((rest, Expr::Literal(value)))
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    alt((quoted('"'), quoted('\'')))(input)
}

/// Quoted string with `\` escapes. Hand-rolled so empty strings work.
fn quoted(quote: char) -> impl Fn(&str) -> IResult<&str, Expr> {
    move |input: &str| {
        let mut chars = input.char_indices();
        match chars.next() {
            Some((_, c)) if c == quote => {}
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )))
            }
        }
        let mut out = String::new();
        let mut escaped = false;
        for (i, c) in chars {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            if c == '\\' {
                escaped = true;
                continue;
            }
            if c == quote {
                let consumed = i + c.len_utf8();
                return Ok((&input[consumed..], Expr::Literal(Value::Str(out))));
            }
            out.push(c);
        }
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
