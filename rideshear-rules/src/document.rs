use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::path::DocumentPath;

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

const SENTINEL_KEY: &str = ".sv";
const SERVER_TIMESTAMP: &str = "timestamp";
const DELETE_FIELD: &str = "delete";

/// Document snapshot handed to the engine by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocumentPath,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn collection_segments(&self) -> &[String] {
        self.path.collection_segments()
    }

    pub fn get(&self, field: &FieldPath) -> Option<&Value> {
        field.locate(&self.fields)
    }
}

/// Dotted field reference (`location.lat`) into a document's fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|segment| !segment.is_empty())
    }

    pub fn locate<'a>(&self, fields: &'a Fields) -> Option<&'a Value> {
        let mut segments = self.segments();
        let mut current = fields.get(segments.next()?)?;
        for segment in segments {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath::new(value)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        FieldPath::new(value)
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write-time sentinels a client may place in a payload.
pub struct FieldValue;

impl FieldValue {
    /// Replaced with the request time when the evaluation context is built.
    pub fn server_timestamp() -> Value {
        sentinel(SERVER_TIMESTAMP)
    }

    /// Removes the field during a merge update.
    pub fn delete() -> Value {
        sentinel(DELETE_FIELD)
    }

    pub fn is_delete(value: &Value) -> bool {
        sentinel_kind(value) == Some(DELETE_FIELD)
    }

    /// RFC 3339 rendering used for timestamp fields.
    pub fn timestamp(at: DateTime<Utc>) -> Value {
        Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

fn sentinel(kind: &str) -> Value {
    let mut map = Map::new();
    map.insert(SENTINEL_KEY.to_string(), Value::String(kind.to_string()));
    Value::Object(map)
}

fn sentinel_kind(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(SENTINEL_KEY)?.as_str(),
        _ => None,
    }
}

/// Replaces server timestamp sentinels (at any depth) with `now`.
pub(crate) fn resolve_server_timestamps(fields: &mut Fields, now: DateTime<Utc>) {
    for value in fields.values_mut() {
        resolve_value(value, now);
    }
}

fn resolve_value(value: &mut Value, now: DateTime<Utc>) {
    if sentinel_kind(value) == Some(SERVER_TIMESTAMP) {
        *value = FieldValue::timestamp(now);
        return;
    }
    match value {
        Value::Object(map) => map.values_mut().for_each(|inner| resolve_value(inner, now)),
        Value::Array(items) => items.iter_mut().for_each(|inner| resolve_value(inner, now)),
        _ => {}
    }
}

/// Equality used by the predicates. Integers compare exactly and any pair
/// involving a float compares by value, so `15` and `15.0` agree. Arrays and
/// objects compare element by element under the same rule.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(lhs), Value::Number(rhs)) => numbers_equal(lhs, rhs),
        (Value::Array(lhs), Value::Array(rhs)) => {
            lhs.len() == rhs.len() && lhs.iter().zip(rhs).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(lhs), Value::Object(rhs)) => {
            lhs.len() == rhs.len()
                && lhs
                    .iter()
                    .all(|(key, l)| rhs.get(key).map_or(false, |r| values_equal(l, r)))
        }
        _ => left == right,
    }
}

fn numbers_equal(lhs: &Number, rhs: &Number) -> bool {
    if lhs.is_f64() || rhs.is_f64() {
        return lhs.as_f64() == rhs.as_f64();
    }
    match (lhs.as_i64(), rhs.as_i64()) {
        (Some(l), Some(r)) => l == r,
        _ => lhs.as_u64().is_some() && lhs.as_u64() == rhs.as_u64(),
    }
}
