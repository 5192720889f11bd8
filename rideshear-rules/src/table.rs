use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::error::RuleError;
use crate::loader::load_policies;
use crate::operation::OperationKind;
use crate::path::{DocumentPath, PathParams};
use crate::rule::{CollectionPolicy, PolicyRule};

/// No rule covers the requested path and operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no policy for {operation} on {path}")]
pub struct PolicyNotFound {
    pub path: String,
    pub operation: OperationKind,
}

/// Immutable rule table. Built once, then shared read-only between
/// concurrent evaluations.
#[derive(Debug, Default, Clone)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    pub fn from_policies(
        policies: impl IntoIterator<Item = CollectionPolicy>,
    ) -> Result<Self, RuleError> {
        policies
            .into_iter()
            .try_fold(Self::builder(), |builder, policy| builder.policy(policy))
            .map(PolicyTableBuilder::build)
    }

    /// Loads policies from the given path (file or directory).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        Self::from_policies(load_policies(path)?)
    }

    /// Borrow the underlying rules, most specific pattern first.
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Finds the rule for `operation` on `path`. The most specific matching
    /// pattern wins; a less specific pattern is never consulted once a more
    /// specific one matched the path, even if it lacks this operation.
    pub fn lookup(
        &self,
        path: &DocumentPath,
        operation: OperationKind,
    ) -> Result<(&PolicyRule, PathParams), PolicyNotFound> {
        let mut owner: Option<&PolicyRule> = None;
        for rule in &self.rules {
            if let Some(current) = owner {
                if rule.pattern.specificity() < current.pattern.specificity() {
                    break;
                }
                if rule.pattern.shape() != current.pattern.shape() {
                    continue;
                }
            }
            let Some(params) = rule.pattern.matches(path) else {
                continue;
            };
            if owner.is_none() {
                debug!(pattern = %rule.pattern, path = %path, "matched policy pattern");
                owner = Some(rule);
            }
            if rule.operation == operation {
                return Ok((rule, params));
            }
        }

        Err(PolicyNotFound {
            path: path.to_string(),
            operation,
        })
    }
}

/// Collects rules and enforces the one-rule-per-(pattern, operation) invariant.
#[derive(Debug, Default)]
pub struct PolicyTableBuilder {
    rules: Vec<PolicyRule>,
    seen: HashSet<(String, OperationKind)>,
}

impl PolicyTableBuilder {
    pub fn rule(mut self, rule: PolicyRule) -> Result<Self, RuleError> {
        if !self.seen.insert((rule.pattern.shape(), rule.operation)) {
            return Err(RuleError::DuplicateRule {
                pattern: rule.pattern.to_string(),
                operation: rule.operation.to_string(),
            });
        }

        let declared: Vec<&str> = rule.pattern.param_names().collect();
        if let Some(unbound) = rule
            .predicate
            .referenced_params()
            .into_iter()
            .find(|param| !declared.contains(param))
        {
            return Err(RuleError::invalid_pattern(
                rule.pattern.as_str(),
                format!("rule {} references unbound parameter `{}`", rule.id, unbound),
            ));
        }

        self.rules.push(rule);
        Ok(self)
    }

    pub fn policy(self, policy: CollectionPolicy) -> Result<Self, RuleError> {
        policy.into_rules().into_iter().try_fold(self, Self::rule)
    }

    pub fn build(mut self) -> PolicyTable {
        self.rules.sort_by(|a, b| {
            b.pattern
                .specificity()
                .cmp(&a.pattern.specificity())
                .then_with(|| a.pattern.shape().cmp(&b.pattern.shape()))
                .then(a.operation.cmp(&b.operation))
        });
        PolicyTable { rules: self.rules }
    }
}
