/// Structured event records flowing through the pipeline
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{LinkStatsError, Result};

// Export EventBuilder for tests
pub use builder::EventBuilder;

/// Module with event builder for testing
pub mod builder;

/// Maximum nesting accepted when converting JSON input
const MAX_JSON_DEPTH: usize = 64;

/// Trait for events that support key-value selection
pub trait Selector {
    /// Select a value by key from the event
    /// Returns (value, found) where found indicates if the key exists
    fn select(&self, key: &str) -> (Option<Value>, bool);
}

/// Attribute value carried by an event
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// String value - using Arc for cheap cloning
    String(Arc<str>),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// Array of values
    Array(Vec<Value>),
    /// Object mapping keys to values
    Object(HashMap<String, Value>),
    /// Null value
    #[default]
    Null,
}

// Custom Serialize/Deserialize to handle Arc<str> transparently
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Timestamp(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            Value::Array(arr) => arr.serialize(serializer),
            Value::Object(obj) => obj.serialize(serializer),
            Value::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let json_value = JsonValue::deserialize(deserializer)?;
        Ok(Value::from_json(&json_value))
    }
}

impl Value {
    /// Convert a JSON value, returning Null past the nesting limit
    pub fn from_json(json: &JsonValue) -> Self {
        Self::from_json_at_depth(json, 0)
    }

    fn from_json_at_depth(json: &JsonValue, depth: usize) -> Self {
        if depth > MAX_JSON_DEPTH {
            return Value::Null;
        }
        match json {
            JsonValue::String(s) => Value::String(Arc::from(s.as_str())),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    tracing::warn!("Unable to convert JSON number: {:?}", n);
                    Value::Null
                }
            }
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Array(arr) => Value::Array(
                arr.iter()
                    .map(|v| Self::from_json_at_depth(v, depth + 1))
                    .collect(),
            ),
            JsonValue::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json_at_depth(v, depth + 1)))
                    .collect(),
            ),
            JsonValue::Null => Value::Null,
        }
    }

    /// Convert value to string if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert value to integer if possible
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert value to float if possible
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Convert value to timestamp if it is one
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Render a scalar as a grouping key.
    ///
    /// Strings are used as-is; integers, floats and booleans use their display
    /// form. Everything else has no key.
    pub fn as_group_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Name of the value kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Array(arr) => write!(f, "[{} items]", arr.len()),
            Value::Object(obj) => write!(f, "{{{} fields}}", obj.len()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

/// A structured event: an ordered map of attribute names to values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: BTreeMap<String, Value>,
}

impl Event {
    /// Create an empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an event from a JSON object
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        match json {
            JsonValue::Object(obj) => Ok(Self {
                fields: obj
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            }),
            other => Err(LinkStatsError::InvalidEvent(format!(
                "expected a JSON object, found {}",
                json_kind(other)
            ))),
        }
    }

    /// Borrow an attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set an attribute, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Remove an attribute
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Whether the attribute is present
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the event has no attributes
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate attributes in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Turn the attribute into a `Value::Timestamp` where possible.
    ///
    /// RFC 3339 strings and integer or float epoch seconds are converted.
    /// Returns whether the attribute holds a timestamp afterwards.
    pub fn coerce_timestamp(&mut self, key: &str) -> bool {
        let converted = match self.fields.get(key) {
            Some(Value::Timestamp(_)) => return true,
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            Some(Value::Integer(secs)) => Utc.timestamp_opt(*secs, 0).single(),
            Some(Value::Float(secs)) if secs.is_finite() => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9) as u32;
                Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()
            }
            _ => None,
        };
        match converted {
            Some(ts) => {
                self.fields.insert(key.to_string(), Value::Timestamp(ts));
                true
            }
            None => false,
        }
    }
}

impl Selector for Event {
    fn select(&self, key: &str) -> (Option<Value>, bool) {
        match self.fields.get(key) {
            Some(value) => (Some(value.clone()), true),
            None => (None, false),
        }
    }
}

impl FromIterator<(String, Value)> for Event {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_from_json() {
        let event = Event::from_json(&json!({
            "host": "h1",
            "latency": 12.5,
            "status": 200,
            "ok": true
        }))
        .unwrap();

        assert_eq!(event.len(), 4);
        assert_eq!(event.get("host").and_then(Value::as_str), Some("h1"));
        assert_eq!(event.get("latency").and_then(Value::as_float), Some(12.5));
        assert_eq!(event.get("status").and_then(Value::as_int), Some(200));

        let (value, found) = event.select("ok");
        assert!(found);
        assert_eq!(value, Some(Value::Boolean(true)));

        let (value, found) = event.select("missing");
        assert!(!found);
        assert!(value.is_none());
    }

    #[test]
    fn test_event_from_json_rejects_non_object() {
        let err = Event::from_json(&json!([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_deep_json_nesting() {
        let mut json = json!({"value": 1});
        for _ in 0..200 {
            json = json!({"nested": json});
        }

        // Should not overflow; the innermost levels collapse to Null
        let value = Value::from_json(&json);
        assert!(matches!(value, Value::Object(_)));
    }

    #[test]
    fn test_coerce_timestamp() {
        let mut event = Event::new();
        event.insert("rfc", "2024-01-01T00:00:10Z");
        event.insert("epoch", 1_704_067_210i64);
        event.insert("float", 1_704_067_210.5f64);
        event.insert("bad", "yesterday");

        assert!(event.coerce_timestamp("rfc"));
        assert!(event.coerce_timestamp("epoch"));
        assert!(event.coerce_timestamp("float"));
        assert!(!event.coerce_timestamp("bad"));
        assert!(!event.coerce_timestamp("absent"));

        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(event.get("rfc").and_then(Value::as_timestamp), Some(expected));
        assert_eq!(event.get("epoch").and_then(Value::as_timestamp), Some(expected));
        assert_eq!(
            event.get("float").and_then(Value::as_timestamp).map(|ts| ts.timestamp()),
            Some(expected.timestamp())
        );
        assert!(matches!(event.get("bad"), Some(Value::String(_))));
    }

    #[test]
    fn test_coerce_fractional_epoch_keeps_sub_second_part() {
        let mut event = Event::new();
        event.insert("before", -1.5f64);
        event.insert("after", 1.25f64);

        assert!(event.coerce_timestamp("before"));
        assert!(event.coerce_timestamp("after"));
        let millis = |key: &str| event.get(key).and_then(Value::as_timestamp).map(|ts| ts.timestamp_millis());
        assert_eq!(millis("before"), Some(-1_500));
        assert_eq!(millis("after"), Some(1_250));
    }

    #[test]
    fn test_group_key_rendering() {
        assert_eq!(Value::from("a").as_group_key().as_deref(), Some("a"));
        assert_eq!(Value::Integer(7).as_group_key().as_deref(), Some("7"));
        assert_eq!(Value::Boolean(false).as_group_key().as_deref(), Some("false"));
        assert_eq!(Value::Null.as_group_key(), None);
        assert_eq!(Value::Array(vec![]).as_group_key(), None);
        assert_eq!(Value::Timestamp(Utc::now()).as_group_key(), None);
    }

    #[test]
    fn test_timestamp_serializes_as_rfc3339() {
        let mut event = Event::new();
        event.insert("@timestamp", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        event.insert("count", 3i64);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["@timestamp"], json!("2024-01-01T00:00:00+00:00"));
        assert_eq!(json["count"], json!(3));
    }
}
