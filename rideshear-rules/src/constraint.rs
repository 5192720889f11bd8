use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{values_equal, FieldPath, Fields};

/// Declared type of a required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Any,
    String,
    Number,
    Bool,
    /// RFC 3339 string, as produced for server timestamps.
    Timestamp,
    Map,
    List,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Any => !value.is_null(),
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Timestamp => value
                .as_str()
                .map(|raw| DateTime::parse_from_rfc3339(raw).is_ok())
                .unwrap_or(false),
            FieldType::Map => value.is_object(),
            FieldType::List => value.is_array(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Timestamp => "timestamp",
            FieldType::Map => "map",
            FieldType::List => "list",
        }
    }
}

/// Presence, type and range requirements for one field of a proposed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraint {
    pub field: FieldPath,
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    /// Allowed values. Empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Strings must not be blank.
    #[serde(default)]
    pub non_empty: bool,
    /// When false the constraint only applies if the field is present.
    #[serde(default = "FieldConstraint::default_required")]
    pub required: bool,
}

/// Why a field failed its constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub problem: String,
}

impl FieldConstraint {
    pub fn new(field: impl Into<FieldPath>, kind: FieldType) -> Self {
        Self {
            field: field.into(),
            kind,
            one_of: Vec::new(),
            min: None,
            max: None,
            non_empty: false,
            required: true,
        }
    }

    pub fn string(field: &str) -> Self {
        Self::new(field, FieldType::String)
    }

    pub fn text(field: &str) -> Self {
        Self::new(field, FieldType::String).non_empty()
    }

    pub fn number(field: &str) -> Self {
        Self::new(field, FieldType::Number)
    }

    pub fn timestamp(field: &str) -> Self {
        Self::new(field, FieldType::Timestamp)
    }

    pub fn enumeration(field: &str, values: &[&str]) -> Self {
        Self::new(field, FieldType::String).one_of(values.iter().map(|v| Value::from(*v)))
    }

    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.one_of = values.into_iter().collect();
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn default_required() -> bool {
        true
    }

    pub fn check(&self, fields: &Fields) -> Result<(), Violation> {
        let value = match self.field.locate(fields) {
            Some(value) => value,
            None if self.required => return Err(self.violation("missing")),
            None => return Ok(()),
        };

        if !self.kind.accepts(value) {
            return Err(self.violation(format!("expected {}", self.kind.as_str())));
        }
        if self.non_empty && value.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
            return Err(self.violation("must not be empty"));
        }
        if !self.one_of.is_empty() && !self.one_of.iter().any(|allowed| values_equal(allowed, value)) {
            return Err(self.violation("value not allowed"));
        }
        if let Some(number) = value.as_f64() {
            if self.min.map(|min| number < min).unwrap_or(false) {
                return Err(self.violation("below minimum"));
            }
            if self.max.map(|max| number > max).unwrap_or(false) {
                return Err(self.violation("above maximum"));
            }
        }
        Ok(())
    }

    fn violation(&self, problem: impl Into<String>) -> Violation {
        Violation {
            field: self.field.as_str().to_string(),
            problem: problem.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn enforces_type_enum_and_range() {
        let fare = FieldConstraint::number("estimatedFare").min(0.0);
        assert!(fare.check(&fields(json!({ "estimatedFare": 15.5 }))).is_ok());
        assert_eq!(
            fare.check(&fields(json!({ "estimatedFare": "15.5" }))).unwrap_err().problem,
            "expected number"
        );
        assert!(fare.check(&fields(json!({ "estimatedFare": -1 }))).is_err());

        let status = FieldConstraint::enumeration("status", &["requested", "accepted"]);
        assert!(status.check(&fields(json!({ "status": "requested" }))).is_ok());
        assert!(status.check(&fields(json!({ "status": "invalid-status" }))).is_err());
        assert_eq!(status.check(&fields(json!({}))).unwrap_err().problem, "missing");
    }

    #[test]
    fn optional_fields_are_checked_only_when_present() {
        let created = FieldConstraint::timestamp("createdAt").optional();
        assert!(created.check(&fields(json!({}))).is_ok());
        assert!(created.check(&fields(json!({ "createdAt": "2024-01-01T00:00:00Z" }))).is_ok());
        assert!(created.check(&fields(json!({ "createdAt": "yesterday" }))).is_err());
    }

    #[test]
    fn deserializes_from_policy_documents() {
        let constraint: FieldConstraint = serde_yaml::from_str(
            "field: rideType\ntype: string\none_of: [standard, premium]\n",
        )
        .unwrap();
        assert!(constraint.required);
        assert_eq!(constraint.kind, FieldType::String);
        assert_eq!(constraint.one_of.len(), 2);
    }
}
