// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeMap;
use weir_core::{Value, VarMap};

fn vars(pairs: &[(&str, Value)]) -> VarMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn substitute_both_placeholder_styles() {
    let v = vars(&[("user", Value::Str("ada".into())), ("n", Value::Int(2))]);
    assert_eq!(substitute("hi ${user}, try #{n}", &v), "hi ada, try 2");
}

#[test]
fn substitute_keeps_unknown_placeholders() {
    assert_eq!(substitute("x=${gone}", &VarMap::new()), "x=${gone}");
}

#[test]
fn substitute_unterminated_placeholder_is_verbatim() {
    assert_eq!(substitute("x=${oops", &VarMap::new()), "x=${oops");
}

#[test]
fn substitute_without_placeholders_is_identity() {
    assert_eq!(substitute("plain text", &VarMap::new()), "plain text");
}

#[test]
fn params_substitution_produces_json() {
    let v = vars(&[("orderId", Value::Str("O1".into())), ("amount", Value::Int(9))]);
    let result = interpolate_params(r#"{"id": orderId, "total": amount}"#, &v);
    assert_eq!(
        result,
        Value::Map(BTreeMap::from([
            ("id".to_string(), Value::Str("O1".into())),
            ("total".to_string(), Value::Int(9)),
        ]))
    );
}

#[test]
fn params_keeps_quoted_text_untouched() {
    let v = vars(&[("amount", Value::Int(9))]);
    let result = interpolate_params(r#"{"amount": "amount"}"#, &v);
    assert_eq!(
        result,
        Value::Map(BTreeMap::from([(
            "amount".to_string(),
            Value::Str("amount".into())
        )]))
    );
}

#[test]
fn params_resolves_dotted_paths() {
    let order = Value::Map(BTreeMap::from([("id".to_string(), Value::Str("O1".into()))]));
    let v = vars(&[("order", order)]);
    let result = interpolate_params(r#"{"ref": order.id}"#, &v);
    assert_eq!(
        result,
        Value::Map(BTreeMap::from([("ref".to_string(), Value::Str("O1".into()))]))
    );
}

#[test]
fn params_invalid_json_returns_string() {
    let v = vars(&[("x", Value::Int(1))]);
    let result = interpolate_params("x plus junk {", &v);
    assert_eq!(result, Value::Str("1 plus junk {".into()));
}

#[test]
fn params_json_keywords_survive() {
    let result = interpolate_params(r#"{"ok": true, "gone": null}"#, &VarMap::new());
    assert_eq!(
        result,
        Value::Map(BTreeMap::from([
            ("ok".to_string(), Value::Bool(true)),
            ("gone".to_string(), Value::Null),
        ]))
    );
}

#[test]
fn params_unknown_identifiers_stay_and_fail_json() {
    let result = interpolate_params("unknown_var", &VarMap::new());
    assert_eq!(result, Value::Str("unknown_var".into()));
}
