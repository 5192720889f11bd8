use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity issuing a request. Built per request and never mutated during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Principal {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl Principal {
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authenticated: true,
            claims: Map::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: Value) -> Self {
        self.claims.insert(name.into(), value);
        self
    }

    pub fn with_claims(mut self, claims: Map<String, Value>) -> Self {
        self.claims.extend(claims);
        self
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// The id usable for ownership comparisons. Anonymous callers own nothing.
    pub fn uid(&self) -> Option<&str> {
        (self.authenticated && !self.id.is_empty()).then_some(self.id.as_str())
    }
}
