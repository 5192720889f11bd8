use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::{ContextBuilder, EvaluationContext, RawRequest, Scope};
use crate::error::RuleError;
use crate::outcome::{Decision, DenyReason};
use crate::predicate::Verdict;
use crate::table::PolicyTable;

/// Decision procedure over a shared, read-only [`PolicyTable`].
///
/// Evaluation never mutates its inputs and keeps no state between calls, so
/// one evaluator can serve any number of concurrent requests and may be used
/// for dry runs.
#[derive(Debug, Clone)]
pub struct Evaluator {
    table: Arc<PolicyTable>,
}

impl Evaluator {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    /// Decides whether the operation described by `ctx` is permitted.
    ///
    /// Returns `Err` only for resolver infrastructure faults; every other
    /// negative outcome is a [`Decision::Deny`].
    pub async fn evaluate(&self, ctx: &EvaluationContext) -> Result<Decision, RuleError> {
        let (rule, params) = match self.table.lookup(ctx.target(), ctx.kind()) {
            Ok(found) => found,
            Err(missing) => {
                warn!(
                    path = %missing.path,
                    operation = %missing.operation,
                    "no policy matched request, denying"
                );
                return Ok(Decision::deny(DenyReason::PolicyNotFound {
                    path: missing.path,
                    operation: missing.operation,
                }));
            }
        };

        let scope = Scope::new(ctx, &params);
        match rule.predicate.evaluate(&scope).await? {
            Verdict::Pass => {
                debug!(rule_id = %rule.id, principal = %ctx.principal().id, "request allowed");
                Ok(Decision::Allow {
                    rule: rule.id.clone(),
                })
            }
            Verdict::Fail(failure) => {
                let reason = DenyReason::from_failure(&rule.id, failure);
                debug!(rule_id = %rule.id, reason = %reason, "request denied");
                Ok(Decision::deny(reason))
            }
        }
    }

    /// [`Evaluator::evaluate`] under a deadline. Running out of time is a
    /// denial, never an allow.
    pub async fn evaluate_within(
        &self,
        ctx: &EvaluationContext,
        timeout: Duration,
    ) -> Result<Decision, RuleError> {
        match tokio::time::timeout(timeout, self.evaluate(ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    path = %ctx.target(),
                    operation = %ctx.kind(),
                    timeout_ms = timeout.as_millis() as u64,
                    "evaluation timed out, denying"
                );
                Ok(Decision::deny(DenyReason::Timeout {
                    path: ctx.target().to_string(),
                    operation: ctx.kind(),
                }))
            }
        }
    }

    /// Builds the context for a raw request and evaluates it.
    pub async fn check(
        &self,
        builder: &ContextBuilder,
        request: RawRequest,
    ) -> Result<Decision, RuleError> {
        let ctx = builder.build(request)?;
        self.evaluate(&ctx).await
    }

    pub async fn check_within(
        &self,
        builder: &ContextBuilder,
        request: RawRequest,
        timeout: Duration,
    ) -> Result<Decision, RuleError> {
        let ctx = builder.build(request)?;
        self.evaluate_within(&ctx, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Fields};
    use crate::operation::OperationKind;
    use crate::path::{CollectionPattern, DocumentPath};
    use crate::predicate::Predicate;
    use crate::principal::Principal;
    use crate::resolver::{DocumentResolver, ResolverError};
    use crate::rule::CollectionPolicy;
    use async_trait::async_trait;

    struct BrokenResolver;

    #[async_trait]
    impl DocumentResolver for BrokenResolver {
        async fn resolve(&self, path: &DocumentPath) -> Result<Option<Document>, ResolverError> {
            Err(ResolverError::new(path, "connection reset"))
        }
    }

    struct StalledResolver;

    #[async_trait]
    impl DocumentResolver for StalledResolver {
        async fn resolve(&self, _path: &DocumentPath) -> Result<Option<Document>, ResolverError> {
            futures::future::pending().await
        }
    }

    fn evaluator() -> Evaluator {
        let table = PolicyTable::from_policies([CollectionPolicy::new(
            CollectionPattern::parse("rides/{rideId}/messages/{messageId}").unwrap(),
        )
        .read(Predicate::participant("rides/{rideId}"))])
        .unwrap();
        Evaluator::new(table)
    }

    #[tokio::test]
    async fn resolver_faults_propagate_as_errors() {
        let builder = ContextBuilder::new(Arc::new(BrokenResolver));
        let request = RawRequest::new(
            OperationKind::Read,
            "rides/r1/messages/m1",
            Principal::authenticated("user1"),
        );

        let err = evaluator().check(&builder, request).await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn unmatched_operation_is_denied_not_failed() {
        let builder = ContextBuilder::new(Arc::new(BrokenResolver));
        let request = RawRequest::new(
            OperationKind::Create,
            "rides/r1/messages/m1",
            Principal::authenticated("user1"),
        )
        .payload(Fields::new());

        let decision = evaluator().check(&builder, request).await.unwrap();
        assert!(matches!(
            decision.reason(),
            Some(DenyReason::PolicyNotFound { operation: OperationKind::Create, .. })
        ));
    }

    #[tokio::test]
    async fn stalled_lookup_is_denied_at_the_deadline() {
        let builder = ContextBuilder::new(Arc::new(StalledResolver));
        let request = RawRequest::new(
            OperationKind::Read,
            "rides/r1/messages/m1",
            Principal::authenticated("user1"),
        );

        let decision = evaluator()
            .check_within(&builder, request, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(matches!(
            decision.reason(),
            Some(DenyReason::Timeout { operation: OperationKind::Read, .. })
        ));
        assert_eq!(decision.reason().map(DenyReason::code), Some("timeout"));
    }
}
