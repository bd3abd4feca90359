// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! String interpolation for connector parameters.
//!
//! Two layers: `substitute` replaces `${name}` / `#{name}` placeholders
//! inside a string; `interpolate_params` replaces bare identifier paths
//! outside quotes and re-parses the result as JSON when possible.

use weir_core::{Value, VarMap};

/// Replace every `${name}` and `#{name}` occurrence with the variable's
/// display string. Unknown names keep the placeholder and log a warning.
pub fn substitute(text: &str, vars: &VarMap) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = find_placeholder(rest) {
        let (prefix, after_open) = (&rest[..start], &rest[start + 2..]);
        out.push_str(prefix);
        match after_open.find('}') {
            Some(close) => {
                let name = &after_open[..close];
                match vars.get(name) {
                    Some(v) => out.push_str(&v.display_string()),
                    None => {
                        tracing::warn!(name, "unknown variable in placeholder, keeping literal");
                        out.push_str(&rest[start..start + 2 + close + 1]);
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                // Unterminated placeholder: keep the rest verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn find_placeholder(s: &str) -> Option<usize> {
    let dollar = s.find("${");
    let hash = s.find("#{");
    match (dollar, hash) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Interpolate a connector parameter string: bare identifier paths outside
/// quotes are replaced with their variable values (rendered as JSON), then
/// the substituted text is re-parsed as JSON. Returns the parsed value if
/// it is valid JSON, the substituted string otherwise.
pub fn interpolate_params(text: &str, vars: &VarMap) -> Value {
    let substituted = replace_bare_paths(text, vars);
    match serde_json::from_str::<serde_json::Value>(&substituted) {
        Ok(json) => Value::from_json(json),
        Err(_) => Value::Str(substituted),
    }
}

/// Replace identifier-path runs that are not inside quotes and resolve to
/// a known variable. JSON keywords and unknown paths stay untouched.
fn replace_bare_paths(text: &str, vars: &VarMap) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i + c.len_utf8();
                while let Some(&(j, next)) = chars.peek() {
                    if is_path_char(next) {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let path = &text[start..end];
                match resolve_path(path, vars) {
                    Some(v) => out.push_str(&v.to_json().to_string()),
                    None => out.push_str(path),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Resolve `a.b.c` against the variable map. JSON keywords never resolve.
fn resolve_path(path: &str, vars: &VarMap) -> Option<Value> {
    if matches!(path, "true" | "false" | "null") {
        return None;
    }
    let mut parts = path.split('.');
    let head = parts.next()?;
    let mut current = vars.get(head)?.clone();
    for part in parts {
        match current {
            Value::Map(ref fields) => current = fields.get(part)?.clone(),
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
#[path = "interpolate_tests.rs"]
mod tests;
