use serde::{Deserialize, Serialize};

use crate::operation::OperationKind;
use crate::path::CollectionPattern;
use crate::predicate::Predicate;

/// One access rule: who may perform `operation` on documents matching `pattern`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRule {
    /// `pattern:operation`, used in decisions and audit logs.
    pub id: String,
    pub pattern: CollectionPattern,
    pub operation: OperationKind,
    pub predicate: Predicate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PolicyRule {
    pub fn new(pattern: CollectionPattern, operation: OperationKind, predicate: Predicate) -> Self {
        Self {
            id: format!("{}:{}", pattern, operation),
            pattern,
            operation,
            predicate,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Policy document entry grouping the four operations of one pattern.
/// Operations left out have no rule and therefore fall back to deny.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPolicy {
    #[serde(rename = "match")]
    pub pattern: CollectionPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Predicate>,
}

impl CollectionPolicy {
    pub fn new(pattern: CollectionPattern) -> Self {
        Self {
            pattern,
            description: None,
            create: None,
            read: None,
            update: None,
            delete: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn create(mut self, predicate: Predicate) -> Self {
        self.create = Some(predicate);
        self
    }

    pub fn read(mut self, predicate: Predicate) -> Self {
        self.read = Some(predicate);
        self
    }

    pub fn update(mut self, predicate: Predicate) -> Self {
        self.update = Some(predicate);
        self
    }

    pub fn delete(mut self, predicate: Predicate) -> Self {
        self.delete = Some(predicate);
        self
    }

    /// Flattens into one rule per declared operation.
    pub fn into_rules(self) -> Vec<PolicyRule> {
        let CollectionPolicy {
            pattern,
            description,
            create,
            read,
            update,
            delete,
        } = self;

        [
            (OperationKind::Create, create),
            (OperationKind::Read, read),
            (OperationKind::Update, update),
            (OperationKind::Delete, delete),
        ]
        .into_iter()
        .filter_map(|(operation, predicate)| {
            predicate.map(|predicate| {
                let rule = PolicyRule::new(pattern.clone(), operation, predicate);
                match &description {
                    Some(description) => rule.with_description(description.clone()),
                    None => rule,
                }
            })
        })
        .collect()
    }
}
