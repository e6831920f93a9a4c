//! Dynamic data model.
//!
//! Template data is an untyped tree: the markup addresses it with paths and
//! the passes coerce it to text. [`Value`] mirrors a JSON document plus one
//! extra variant, [`Value::Func`], for computed fields and helpers.

use crate::error::Result;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Insertion-ordered mapping used for objects, helper tables and specials.
pub type Object = IndexMap<String, Value>;

type FuncImpl = dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync;

/// A callable stored in data or registered as a helper.
///
/// The first argument is the receiver (the data the call happens against),
/// the slice holds positional arguments.
#[derive(Clone)]
pub struct Callable(Arc<FuncImpl>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Callable(Arc::new(f))
    }

    pub fn call(&self, receiver: &Value, args: &[Value]) -> Result<Value> {
        (self.0)(receiver, args)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<function>")
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Object),
    Func(Callable),
}

impl Value {
    /// Wrap a closure as a [`Value::Func`].
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Value::Func(Callable::new(f))
    }

    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Own property lookup. Arrays accept decimal indices.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(o) => o.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Name of the value's type, as reported in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Func(_) => "function",
        }
    }

    /// JavaScript-like truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Func(_) => true,
        }
    }

    /// Numeric coercion used by arithmetic and relational operators.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    match t {
                        "Infinity" | "+Infinity" => f64::INFINITY,
                        "-Infinity" => f64::NEG_INFINITY,
                        _ => t.parse::<f64>().unwrap_or(f64::NAN),
                    }
                }
            }
            Value::Array(_) | Value::Object(_) | Value::Func(_) => f64::NAN,
        }
    }

    /// Lenient text form used when splicing helper and eval results.
    ///
    /// Null becomes the empty string, arrays are joined with `,` and objects
    /// print as `[object Object]`.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_number(*f),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items.iter().map(Value::to_text).collect::<Vec<_>>().join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Func(_) => "function".to_string(),
        }
    }
}

/// Format a float the way a browser prints numbers: integral values drop the
/// fraction, non-finite values use their JavaScript names.
pub fn format_number(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        i64::try_from(i).map(Value::Int).unwrap_or(Value::Float(i as f64))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Func(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion_keeps_key_order() {
        let v = Value::from(json!({"zeta": 1, "alpha": 2.5, "mid": [true, null]}));
        let keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
        assert_eq!(v.get("alpha"), Some(&Value::Float(2.5)));
        assert_eq!(v.get("mid").and_then(|m| m.get("1")), Some(&Value::Null));
    }

    #[test]
    fn numbers_print_like_a_browser() {
        assert_eq!(format_number(350.0), "350");
        assert_eq!(format_number(99.9), "99.9");
        assert_eq!(format_number(-25.6998), "-25.6998");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::from("").truthy());
        assert!(!Value::Float(f64::NAN).truthy());
        assert!(Value::Array(vec![]).truthy());
        assert!(Value::from(json!({})).truthy());
    }

    #[test]
    fn text_forms() {
        assert_eq!(Value::from(json!([1, "a", 2.5])).to_text(), "1,a,2.5");
        assert_eq!(Value::from(json!({"a": 1})).to_text(), "[object Object]");
        assert_eq!(Value::Null.to_text(), "");
    }

    #[test]
    fn callables_compare_by_identity() {
        let f = Value::func(|_, _| Ok(Value::Null));
        let g = Value::func(|_, _| Ok(Value::Null));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }
}
