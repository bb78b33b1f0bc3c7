use std::fmt;

use serde_json::{Map, Number, Value};

/// The typed result of resolving a placeholder or rendering a template.
///
/// Numbers stay numbers and null stays null until the value is written into
/// a record, at which point it becomes a [`serde_json::Value`].
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    Null,
    Bool(bool),
    /// A geolocation number (latitude, longitude).
    Number(f64),
    /// A literal integer written in a structural template.
    Integer(i64),
    /// A literal integer above `i64::MAX`.
    Unsigned(u64),
    Text(String),
    Array(Vec<ResolvedValue>),
    /// Members in the order they were written.
    Object(Vec<(String, ResolvedValue)>),
}

impl ResolvedValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null)
    }

    /// True for null, and for a non-empty array or object whose leaves are all null.
    pub fn is_deeply_null(&self) -> bool {
        match self {
            ResolvedValue::Null => true,
            ResolvedValue::Array(items) => {
                !items.is_empty() && items.iter().all(ResolvedValue::is_deeply_null)
            }
            ResolvedValue::Object(members) => {
                !members.is_empty() && members.iter().all(|(_, v)| v.is_deeply_null())
            }
            _ => false,
        }
    }

    /// Append the text form used when a value is spliced into a string.
    ///
    /// Null contributes nothing. Floats use their shortest round-trip form
    /// (`37.4192008972168`, `1.0`). Collections are written as compact JSON.
    pub fn write_text(&self, out: &mut String) {
        match self {
            ResolvedValue::Null => {}
            ResolvedValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            ResolvedValue::Number(n) => {
                let mut buf = ryu::Buffer::new();
                out.push_str(buf.format(*n));
            }
            ResolvedValue::Integer(i) => out.push_str(&i.to_string()),
            ResolvedValue::Unsigned(u) => out.push_str(&u.to_string()),
            ResolvedValue::Text(s) => out.push_str(s),
            ResolvedValue::Array(_) | ResolvedValue::Object(_) => {
                out.push_str(&self.to_json().to_string())
            }
        }
    }

    /// Convert into a JSON value for storage in a record.
    ///
    /// Non-finite numbers have no JSON form and become null.
    pub fn to_json(&self) -> Value {
        match self {
            ResolvedValue::Null => Value::Null,
            ResolvedValue::Bool(b) => Value::Bool(*b),
            ResolvedValue::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            ResolvedValue::Integer(i) => Value::Number((*i).into()),
            ResolvedValue::Unsigned(u) => Value::Number((*u).into()),
            ResolvedValue::Text(s) => Value::String(s.clone()),
            ResolvedValue::Array(items) => {
                Value::Array(items.iter().map(ResolvedValue::to_json).collect())
            }
            ResolvedValue::Object(members) => {
                let mut map = Map::with_capacity(members.len());
                for (key, value) in members {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
        }
    }
}

impl From<ResolvedValue> for Value {
    fn from(value: ResolvedValue) -> Self {
        value.to_json()
    }
}

/// Literal JSON from a structural template. Integers keep their integer form.
impl From<&Value> for ResolvedValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ResolvedValue::Null,
            Value::Bool(b) => ResolvedValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ResolvedValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    ResolvedValue::Unsigned(u)
                } else {
                    n.as_f64().map_or(ResolvedValue::Null, ResolvedValue::Number)
                }
            }
            Value::String(s) => ResolvedValue::Text(s.clone()),
            Value::Array(items) => ResolvedValue::Array(items.iter().map(Into::into).collect()),
            Value::Object(map) => ResolvedValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            ),
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_text(&mut out);
        f.write_str(&out)
    }
}
