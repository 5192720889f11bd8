use std::fmt;

use serde::Serialize;

use crate::operation::OperationKind;
use crate::predicate::Failure;

/// Message shown to end callers for every denial.
pub const DENIED_MESSAGE: &str = "operation not permitted";

/// Internal reason attached to a denial. Meant for tests and audit logs,
/// never for the end caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    /// No rule covers the path and operation.
    PolicyNotFound { path: String, operation: OperationKind },
    /// A predicate of the rule evaluated to false.
    PredicateFailed { rule: String, predicate: String },
    /// A required-field constraint rejected the proposed document.
    ValidationFailure {
        rule: String,
        field: String,
        problem: String,
    },
    /// The caller's deadline expired before a decision was reached.
    Timeout { path: String, operation: OperationKind },
}

impl DenyReason {
    pub(crate) fn from_failure(rule: &str, failure: Failure) -> Self {
        match failure {
            Failure::Predicate(predicate) => DenyReason::PredicateFailed {
                rule: rule.to_string(),
                predicate,
            },
            Failure::Validation { field, problem } => DenyReason::ValidationFailure {
                rule: rule.to_string(),
                field,
                problem,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::PolicyNotFound { .. } => "policy_not_found",
            DenyReason::PredicateFailed { .. } => "predicate_failed",
            DenyReason::ValidationFailure { .. } => "validation_failure",
            DenyReason::Timeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::PolicyNotFound { path, operation } => {
                write!(f, "no policy for {operation} on {path}")
            }
            DenyReason::PredicateFailed { rule, predicate } => {
                write!(f, "{rule}: {predicate} failed")
            }
            DenyReason::ValidationFailure {
                rule,
                field,
                problem,
            } => write!(f, "{rule}: field {field} {problem}"),
            DenyReason::Timeout { path, operation } => {
                write!(f, "timeout evaluating {operation} on {path}")
            }
        }
    }
}

/// Final allow/deny outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow { rule: String },
    Deny { reason: DenyReason },
}

impl Decision {
    pub fn deny(reason: DenyReason) -> Self {
        Decision::Deny { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    pub fn reason(&self) -> Option<&DenyReason> {
        match self {
            Decision::Allow { .. } => None,
            Decision::Deny { reason } => Some(reason),
        }
    }

    /// Uniform message safe to return to the end caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            Decision::Allow { .. } => "ok",
            Decision::Deny { .. } => DENIED_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_message_hides_reason() {
        let decision = Decision::deny(DenyReason::PredicateFailed {
            rule: "reports/{reportId}:update".into(),
            predicate: "deny".into(),
        });
        assert!(decision.is_denied());
        assert_eq!(decision.public_message(), DENIED_MESSAGE);
        assert_eq!(decision.reason().map(DenyReason::code), Some("predicate_failed"));
    }
}
