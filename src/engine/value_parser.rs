//! Token to value conversion.
//!
//! Helper arguments, partial params and the expressions of `{{#if}}` and
//! `{{eval}}` all go through [`parse_value`]. The first rule that matches a
//! token wins:
//!
//! ```text
//! 'quoted' / "quoted"        -> unquoted string
//! + - * /                    -> operator, verbatim
//! true / false (any case)    -> bool
//! 99.9 / -25,6998            -> float
//! 12 / -Infinity             -> int (or float for Infinity)
//! reserved keyword           -> verbatim (`this` is not one: it is a path)
//! context path / @special    -> resolved; strings come back re-quoted
//! anything else              -> verbatim
//! ```

use super::patterns;
use super::resolve::resolve_path;
use super::scope::Scope;
use crate::error::Result;
use crate::value::{Object, Value, format_number};
use once_cell::sync::Lazy;
use std::collections::HashSet;

static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abstract", "arguments", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
        "continue", "debugger", "default", "delete", "do", "double", "else", "enum", "eval", "export",
        "extends", "false", "final", "finally", "float", "for", "function", "goto", "if", "implements",
        "import", "in", "instanceof", "int", "interface", "let", "long", "native", "new", "null", "package",
        "private", "protected", "public", "return", "short", "static", "super", "switch", "synchronized",
        "throw", "throws", "transient", "true", "try", "typeof", "void", "volatile", "while", "with",
        "yield",
    ]
    .into_iter()
    .collect()
});

const OPERATORS: [&str; 4] = ["+", "-", "*", "/"];

pub fn parse_value(token: &str, scope: &Scope<'_>) -> Result<Value> {
    if is_quoted(token) {
        return Ok(Value::Str(unquote(token)));
    }
    if OPERATORS.contains(&token) {
        return Ok(Value::from(token));
    }
    if token.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if token.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }
    if patterns::float_literal().is_match(token) {
        return Ok(token.replace(',', ".").parse::<f64>().map(Value::Float).unwrap_or(Value::Float(f64::NAN)));
    }
    if patterns::int_literal().is_match(token) {
        return Ok(parse_int(token));
    }
    if RESERVED_WORDS.contains(token) {
        return Ok(Value::from(token));
    }
    if scope.special(token).is_some() || patterns::context_path().is_match(token) {
        return Ok(match resolve_path(token, scope)? {
            Value::Str(s) => Value::Str(quote(&s)),
            other => other,
        });
    }
    Ok(Value::from(token))
}

fn parse_int(token: &str) -> Value {
    match token {
        "Infinity" | "+Infinity" => Value::Float(f64::INFINITY),
        "-Infinity" => Value::Float(f64::NEG_INFINITY),
        _ => match token.parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => token.parse::<f64>().map(Value::Float).unwrap_or(Value::Float(f64::NAN)),
        },
    }
}

/// Positional helper arguments: `'a b' 3 name`.
pub fn parse_helper_arguments(text: &str, scope: &Scope<'_>) -> Result<Vec<Value>> {
    split_arguments(text)
        .into_iter()
        .map(|token| {
            let literal = is_quoted(token);
            let value = parse_value(token, scope)?;
            Ok(match value {
                Value::Str(s) if !literal && is_quoted(&s) => Value::Str(unquote(&s)),
                other => other,
            })
        })
        .collect()
}

/// Named params: `title='Hi' count=3 this=user`.
///
/// `this=<expr>` merges the properties of the resolved object. Explicit
/// params always win over merged ones, whatever their order.
pub fn parse_helper_params(text: &str, scope: &Scope<'_>) -> Result<Object> {
    let mut merged = Object::new();
    let mut explicit = Object::new();

    for token in split_arguments(text) {
        let (attr, raw) = match token.split_once('=') {
            Some((attr, raw)) => (attr.trim(), Some(raw.trim())),
            None => (token.trim(), None),
        };
        if attr.is_empty() {
            continue;
        }
        let value = match raw {
            Some(raw) => {
                let literal = is_quoted(raw);
                match parse_value(raw, scope)? {
                    Value::Str(s) if !literal && is_quoted(&s) => Value::Str(unquote(&s)),
                    other => other,
                }
            }
            None => Value::Null,
        };
        if attr == "this" {
            if let Value::Object(props) = value {
                merged.extend(props);
            }
        } else {
            explicit.insert(attr.to_string(), value);
        }
    }

    merged.extend(explicit);
    Ok(merged)
}

/// Replace every path-like token of an expression by its value, leaving
/// string and number literals untouched.
///
/// Collections and functions keep their path text so the evaluator can look
/// them up itself.
pub fn substitute_paths(expr: &str, scope: &Scope<'_>) -> Result<String> {
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;
    while let Some(c) = expr[i..].chars().next() {
        if c == '"' || c == '\'' {
            let end = string_end(expr, i);
            out.push_str(&expr[i..end]);
            i = end;
        } else if c.is_ascii_digit() {
            let end = number_end(expr, i);
            out.push_str(&expr[i..end]);
            i = end;
        } else if starts_path(expr, i) {
            let end = path_end(expr, i);
            out.push_str(&substitute_token(&expr[i..end], scope)?);
            i = end;
        } else {
            out.push(c);
            i += c.len_utf8();
        }
    }
    Ok(out)
}

fn substitute_token(token: &str, scope: &Scope<'_>) -> Result<String> {
    if matches!(token, "NaN" | "undefined") {
        return Ok(token.to_string());
    }
    Ok(match parse_value(token, scope)? {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_number(f),
        Value::Str(s) => s,
        Value::Array(_) | Value::Object(_) | Value::Func(_) => token.to_string(),
    })
}

/// Split on whitespace, keeping quoted runs (escaped quotes included) whole.
pub(crate) fn split_arguments(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;
    while let Some(c) = text[i..].chars().next() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(&text[s..i]);
            }
            i += c.len_utf8();
            continue;
        }
        start.get_or_insert(i);
        if c == '"' || c == '\'' {
            i = string_end(text, i);
        } else {
            i += c.len_utf8();
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

pub(crate) fn is_quoted(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0]
}

/// Strip the surrounding quotes and resolve `\"`, `\'` and `\\`.
pub(crate) fn unquote(token: &str) -> String {
    let inner = &token[1..token.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\'' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Byte offset just past the string literal opening at `start`.
pub(crate) fn string_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let delim = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == delim => return i + 1,
            _ => i += 1,
        }
    }
    s.len()
}

pub(crate) fn number_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    i
}

pub(crate) fn starts_path(s: &str, i: usize) -> bool {
    let rest = &s[i..];
    rest.starts_with("../") || rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '@')
}

/// Byte offset just past the path starting at `start`: identifier segments
/// joined by dots, bracket indices, optional `../` prefix.
pub(crate) fn path_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'@';
    let mut i = start;
    if s[i..].starts_with("../") {
        i += 3;
    }
    loop {
        while i < bytes.len() && ident(bytes[i]) {
            i += 1;
        }
        while i < bytes.len() && bytes[i] == b'[' {
            match s[i..].find(']') {
                Some(close) => i += close + 1,
                None => return i,
            }
        }
        if i + 1 < bytes.len() && bytes[i] == b'.' && ident(bytes[i + 1]) {
            i += 1;
        } else {
            return i;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Value {
        Value::from(json!({"name": "karl", "age": 42, "user": {"first": "Ada", "last": "Lovelace"}, "items": [1, 2]}))
    }

    #[test]
    fn literal_tokens() {
        let d = data();
        let scope = Scope::root(&d);
        assert_eq!(parse_value("true", &scope).unwrap(), Value::Bool(true));
        assert_eq!(parse_value("FALSE", &scope).unwrap(), Value::Bool(false));
        assert_eq!(parse_value("99.9", &scope).unwrap(), Value::Float(99.9));
        assert_eq!(parse_value("-25.6998", &scope).unwrap(), Value::Float(-25.6998));
        assert_eq!(parse_value("3,5", &scope).unwrap(), Value::Float(3.5));
        assert_eq!(parse_value("12", &scope).unwrap(), Value::Int(12));
        assert_eq!(parse_value("-Infinity", &scope).unwrap(), Value::Float(f64::NEG_INFINITY));
        assert_eq!(parse_value("'hello'", &scope).unwrap(), Value::from("hello"));
        assert_eq!(parse_value("\"\"", &scope).unwrap(), Value::from(""));
        assert_eq!(parse_value("*", &scope).unwrap(), Value::from("*"));
        assert_eq!(parse_value("typeof", &scope).unwrap(), Value::from("typeof"));
    }

    #[test]
    fn resolved_strings_are_requoted() {
        let d = data();
        let scope = Scope::root(&d);
        assert_eq!(parse_value("name", &scope).unwrap(), Value::from("\"karl\""));
        assert_eq!(parse_value("age", &scope).unwrap(), Value::Int(42));
        assert_eq!(parse_value("missing", &scope).unwrap(), Value::Null);
        assert_eq!(parse_value("#nope", &scope).unwrap(), Value::from("#nope"));
    }

    #[test]
    fn this_resolves_to_the_scope_data() {
        let d = data();
        let scope = Scope::root(&d);
        assert_eq!(parse_value("this", &scope).unwrap(), d);
        assert_eq!(parse_value("this.age", &scope).unwrap(), Value::Int(42));

        let params = parse_helper_params("this=this", &Scope::root(d.get("user").unwrap())).unwrap();
        assert_eq!(params.get("first"), Some(&Value::from("Ada")));
        let args = parse_helper_arguments("this", &Scope::root(d.get("name").unwrap())).unwrap();
        assert_eq!(args, vec![Value::from("karl")]);
    }

    #[test]
    fn requoting_escapes_quotes() {
        let d = Value::from(json!({"q": "say \"hi\""}));
        assert_eq!(parse_value("q", &Scope::root(&d)).unwrap(), Value::from(r#""say \"hi\"""#));
    }

    #[test]
    fn helper_arguments_keep_quoted_runs() {
        let d = data();
        let args = parse_helper_arguments("'hello big world' name 3 \"it\\\"s\"", &Scope::root(&d)).unwrap();
        assert_eq!(args, vec![Value::from("hello big world"), Value::from("karl"), Value::Int(3), Value::from("it\"s")]);
    }

    #[test]
    fn helper_params_merge_this_and_explicit_wins() {
        let d = data();
        let params = parse_helper_params("last='Byron' this=user title='Dr Who' flag", &Scope::root(&d)).unwrap();
        assert_eq!(params.get("first"), Some(&Value::from("Ada")));
        assert_eq!(params.get("last"), Some(&Value::from("Byron")));
        assert_eq!(params.get("title"), Some(&Value::from("Dr Who")));
        assert_eq!(params.get("flag"), Some(&Value::Null));
    }

    #[test]
    fn expression_substitution() {
        let d = data();
        let scope = Scope::root(&d);
        assert_eq!(substitute_paths("age > 40 && name == 'karl'", &scope).unwrap(), "42 > 40 && \"karl\" == 'karl'");
        assert_eq!(substitute_paths("missing || items", &scope).unwrap(), "null || items");
        assert_eq!(substitute_paths("user.first != \"x y\"", &scope).unwrap(), "\"Ada\" != \"x y\"");
    }
}
