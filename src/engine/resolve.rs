//! Path resolution.
//!
//! Turns a context path (`user.phones[0].number`, `../title`, `this.name`)
//! into a value by walking the scope's data. Resolution never fails on
//! missing data: any absent segment makes the whole path `Null`. The only
//! errors come from computed fields (callables) met along the way.
//!
//! ```text
//! path ──┬─ special table hit (@index, @key)  -> value
//!        ├─ not a context path                -> Null
//!        ├─ "this"                            -> scope data
//!        └─ [../ | this.] seg[.seg]*          -> walk, calling functions
//! ```

use super::patterns;
use super::scope::Scope;
use crate::error::Result;
use crate::value::Value;
use std::borrow::Cow;

/// Resolve `path` against `scope`.
pub fn resolve_path(path: &str, scope: &Scope<'_>) -> Result<Value> {
    if let Some(special) = scope.special(path) {
        return Ok(special.clone());
    }
    if !patterns::context_path().is_match(path) {
        return Ok(Value::Null);
    }
    if path == "this" {
        return Ok(scope.data.clone());
    }

    let (base, rest) = if let Some(rest) = path.strip_prefix("../") {
        match scope.parent_data() {
            Some(parent) => (parent, rest),
            None => return Ok(Value::Null),
        }
    } else if let Some(rest) = path.strip_prefix("this.") {
        (scope.data, rest)
    } else {
        (scope.data, path)
    };

    let mut current: Cow<'_, Value> = Cow::Borrowed(base);
    for segment in split_segments(rest) {
        let (name, indices) = split_indices(segment);
        for key in std::iter::once(name).chain(indices) {
            match lookup(&current, key) {
                Some(next) => current = call_if_function(next, scope)?,
                None => return Ok(Value::Null),
            }
        }
    }
    Ok(current.into_owned())
}

fn lookup<'v>(current: &Cow<'v, Value>, key: &str) -> Option<Cow<'v, Value>> {
    if key == "length" {
        match current.as_ref() {
            Value::Array(items) => return Some(Cow::Owned(Value::from(items.len()))),
            Value::Str(s) => return Some(Cow::Owned(Value::from(s.chars().count()))),
            _ => {}
        }
    }
    match current {
        Cow::Borrowed(v) => v.get(key).map(Cow::Borrowed),
        Cow::Owned(v) => v.get(key).cloned().map(Cow::Owned),
    }
}

fn call_if_function<'v>(value: Cow<'v, Value>, scope: &Scope<'_>) -> Result<Cow<'v, Value>> {
    match value.as_ref() {
        Value::Func(f) => Ok(Cow::Owned(f.call(scope.data, &[])?)),
        _ => Ok(value),
    }
}

/// Split on dots that are not inside brackets.
fn split_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&path[start..]);
    segments
}

/// `phones[0][a]` -> (`phones`, [`0`, `a`]). Quoted indices are unquoted.
fn split_indices(segment: &str) -> (&str, Vec<&str>) {
    let Some(open) = segment.find('[') else {
        return (segment, Vec::new());
    };
    let name = &segment[..open];
    let indices = segment[open..]
        .split('[')
        .filter_map(|part| part.strip_suffix(']'))
        .map(|raw| {
            let raw = raw.trim();
            let quoted = raw.len() >= 2
                && ((raw.starts_with('"') && raw.ends_with('"')) || (raw.starts_with('\'') && raw.ends_with('\'')));
            if quoted { &raw[1..raw.len() - 1] } else { raw }
        })
        .collect();
    (name, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;
    use serde_json::json;

    fn data() -> Value {
        Value::from(json!({
            "name": "karl",
            "user": {
                "phones": [{"number": "555", "array": {"a": 1, "b": 2, "c": 3}}],
                "tags": ["x", "y"]
            }
        }))
    }

    #[test]
    fn this_returns_the_data() {
        let d = data();
        assert_eq!(resolve_path("this", &Scope::root(&d)).unwrap(), d);
    }

    #[test]
    fn missing_paths_are_null() {
        let d = data();
        let scope = Scope::root(&d);
        assert_eq!(resolve_path("missing.path", &scope).unwrap(), Value::Null);
        assert_eq!(resolve_path("name.first", &scope).unwrap(), Value::Null);
        assert_eq!(resolve_path("user.tags[7]", &scope).unwrap(), Value::Null);
    }

    #[test]
    fn nested_bracket_indices() {
        let d = data();
        let scope = Scope::root(&d);
        assert_eq!(resolve_path("user.phones[0].array[a]", &scope).unwrap(), Value::Int(1));
        assert_eq!(resolve_path("user.phones[0].array['c']", &scope).unwrap(), Value::Int(3));
        assert_eq!(resolve_path("this.user.tags[1]", &scope).unwrap(), Value::from("y"));
    }

    #[test]
    fn length_of_arrays_and_strings() {
        let d = data();
        let scope = Scope::root(&d);
        assert_eq!(resolve_path("user.tags.length", &scope).unwrap(), Value::Int(2));
        assert_eq!(resolve_path("name.length", &scope).unwrap(), Value::Int(4));
    }

    #[test]
    fn invalid_grammar_is_null() {
        let d = data();
        assert_eq!(resolve_path("'name'", &Scope::root(&d)).unwrap(), Value::Null);
        assert_eq!(resolve_path("a b", &Scope::root(&d)).unwrap(), Value::Null);
    }

    #[test]
    fn specials_short_circuit() {
        let d = data();
        let mut specials = Object::new();
        specials.insert("@index".into(), Value::Int(4));
        let scope = Scope { data: &d, specials: Some(&specials), parent: None };
        assert_eq!(resolve_path("@index", &scope).unwrap(), Value::Int(4));
    }

    #[test]
    fn parent_prefix_climbs_one_level() {
        let outer = Value::from(json!({"title": "outer"}));
        let inner = Value::from(json!({"title": "inner"}));
        let root = Scope::root(&outer);
        let child = root.child(&inner, None);
        assert_eq!(resolve_path("../title", &child).unwrap(), Value::from("outer"));
        assert_eq!(resolve_path("title", &child).unwrap(), Value::from("inner"));
        assert_eq!(resolve_path("../title", &root).unwrap(), Value::Null);
    }

    #[test]
    fn functions_are_called_with_the_data_as_receiver() {
        let mut obj = Object::new();
        obj.insert("first".into(), Value::from("Karl"));
        obj.insert(
            "greeting".into(),
            Value::func(|this, _| {
                let first = this.get("first").map(Value::to_text).unwrap_or_default();
                Ok(Value::from(json!({"text": format!("hi {first}")})))
            }),
        );
        let d = Value::Object(obj);
        assert_eq!(resolve_path("greeting.text", &Scope::root(&d)).unwrap(), Value::from("hi Karl"));
    }
}
