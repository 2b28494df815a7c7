use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Generic option value carried by a [`Request`](crate::Request).
///
/// Supports all JSON-compatible types. Serialized untagged so that options
/// read the same in JSON bodies, `MsgPack` payloads and query strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object. Uses `BTreeMap` for deterministic serialization order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Parses a query-string parameter into the most specific scalar value.
    ///
    /// `"true"`/`"false"` become booleans, integral strings become integers,
    /// everything else stays a string.
    #[must_use]
    pub fn from_query(raw: &str) -> Self {
        match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => raw
                .parse::<i64>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Int),
        }
    }

    /// Renders the value as a query-string parameter.
    ///
    /// Scalars render bare; arrays and maps render as compact JSON.
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Truthiness used by boolean request options such as `ignore_cache`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "false",
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Returns the inner string slice, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
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

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Authenticated identity that issued a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Certificate name (or other unique identifier) of the requester.
    pub id: String,
    /// Whether the requester presented a verified client certificate.
    pub authenticated: bool,
}

impl Principal {
    /// Creates an authenticated principal for the given certificate name.
    #[must_use]
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authenticated: true,
        }
    }

    /// Creates an anonymous principal, typically identified by its address.
    #[must_use]
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authenticated: false,
        }
    }
}
