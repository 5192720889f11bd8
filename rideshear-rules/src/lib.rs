//! Access-policy engine for the Rideshear document store.
//!
//! Every read or write against a document path is checked here before the
//! storage engine acts on it. Policies are declared per collection pattern
//! (`rides/{rideId}/messages/{messageId}`) and per operation, either in code
//! (see [`rideshare`]) or as YAML/JSON documents. Anything not explicitly
//! permitted is denied.

mod constraint;
mod context;
mod document;
mod error;
mod evaluator;
pub mod library;
mod loader;
mod operation;
mod outcome;
mod path;
mod predicate;
mod principal;
mod resolver;
pub mod rideshare;
mod rule;
mod service;
mod store;
mod table;

pub use constraint::{FieldConstraint, FieldType, Violation};
pub use context::{ContextBuilder, EvaluationContext, RawRequest, Scope, Snapshot, WriteMode};
pub use document::{Document, FieldPath, FieldValue, Fields};
pub use error::RuleError;
pub use evaluator::Evaluator;
pub use loader::{load_policies, parse_policies};
pub use operation::{Operation, OperationKind};
pub use outcome::{Decision, DenyReason, DENIED_MESSAGE};
pub use path::{CollectionPattern, DocumentPath, PathParams, PathTemplate, Specificity};
pub use predicate::{Failure, Predicate, Verdict};
pub use principal::Principal;
pub use resolver::{DocumentResolver, EmptyResolver, ResolverError};
pub use rule::{CollectionPolicy, PolicyRule};
pub use service::{
    EvaluationRequest, EvaluationResponse, PolicyApiBuilder, PolicyServiceConfig, RuleSummary,
};
pub use store::{InMemoryStore, StoreSnapshot};
pub use table::{PolicyNotFound, PolicyTable, PolicyTableBuilder};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn evaluates_simple_policy() {
        let table = PolicyTable::from_policies([CollectionPolicy::new(
            CollectionPattern::parse("users/{userId}").unwrap(),
        )
        .read(Predicate::principal_matches("userId"))])
        .unwrap();
        let evaluator = Evaluator::new(table);
        let builder = ContextBuilder::new(Arc::new(EmptyResolver));

        let own = RawRequest::new(OperationKind::Read, "users/alice", Principal::authenticated("alice"));
        let decision = evaluator.check(&builder, own).await.unwrap();
        assert_eq!(
            decision,
            Decision::Allow {
                rule: "users/{userId}:read".into()
            }
        );

        let other = RawRequest::new(OperationKind::Read, "users/alice", Principal::authenticated("bob"));
        let decision = evaluator.check(&builder, other).await.unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.public_message(), DENIED_MESSAGE);
    }
}
