use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraint::FieldConstraint;
use crate::context::{Scope, Snapshot};
use crate::document::FieldPath;
use crate::error::RuleError;
use crate::library;
use crate::path::PathTemplate;

/// Composable access condition attached to a policy rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// Always satisfied.
    Allow,
    /// Never satisfied.
    Deny,
    /// All nested predicates must hold. Stops at the first failure.
    All { conditions: Vec<Predicate> },
    /// Any nested predicate must hold. Stops at the first success.
    Any { conditions: Vec<Predicate> },
    Not { condition: Box<Predicate> },
    IsAuthenticated,
    /// Field equals the caller id. Reads the proposed document on create and
    /// the existing one otherwise, unless `snapshot` pins one.
    IsOwner {
        field: FieldPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<Snapshot>,
    },
    /// Path parameter equals the caller id.
    PrincipalMatchesParam { param: String },
    HasClaim {
        claim: String,
        #[serde(default = "Predicate::default_claim_value")]
        value: Value,
    },
    FieldsUnchanged { fields: Vec<FieldPath> },
    /// The write touches only the listed top-level fields.
    OnlyFieldsChanged { fields: Vec<FieldPath> },
    HasRequiredFields { fields: Vec<FieldConstraint> },
    ValueInSet {
        field: FieldPath,
        values: Vec<Value>,
        #[serde(default)]
        snapshot: Snapshot,
    },
    /// The caller is named in `fields` of the document at `document`.
    IsParticipant {
        document: PathTemplate,
        #[serde(default = "Predicate::default_participant_fields")]
        fields: Vec<FieldPath>,
    },
}

/// Result of evaluating a predicate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(Failure),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    fn from_bool(passed: bool, predicate: &Predicate) -> Self {
        if passed {
            Verdict::Pass
        } else {
            Verdict::Fail(Failure::Predicate(predicate.to_string()))
        }
    }
}

/// First failing leaf of a predicate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Predicate(String),
    Validation { field: String, problem: String },
}

impl Predicate {
    pub fn all(conditions: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::All {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn any(conditions: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Any {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn negate(condition: Predicate) -> Self {
        Predicate::Not {
            condition: Box::new(condition),
        }
    }

    pub fn is_owner(field: &str) -> Self {
        Predicate::IsOwner {
            field: field.into(),
            snapshot: None,
        }
    }

    pub fn owner_on(snapshot: Snapshot, field: &str) -> Self {
        Predicate::IsOwner {
            field: field.into(),
            snapshot: Some(snapshot),
        }
    }

    pub fn principal_matches(param: &str) -> Self {
        Predicate::PrincipalMatchesParam {
            param: param.to_string(),
        }
    }

    pub fn has_claim(claim: &str) -> Self {
        Predicate::HasClaim {
            claim: claim.to_string(),
            value: Self::default_claim_value(),
        }
    }

    pub fn fields_unchanged(fields: &[&str]) -> Self {
        Predicate::FieldsUnchanged {
            fields: fields.iter().map(|field| (*field).into()).collect(),
        }
    }

    pub fn only_fields_changed(fields: &[&str]) -> Self {
        Predicate::OnlyFieldsChanged {
            fields: fields.iter().map(|field| (*field).into()).collect(),
        }
    }

    pub fn required(fields: impl IntoIterator<Item = FieldConstraint>) -> Self {
        Predicate::HasRequiredFields {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn value_in(snapshot: Snapshot, field: &str, values: &[&str]) -> Self {
        Predicate::ValueInSet {
            field: field.into(),
            values: values.iter().map(|value| Value::from(*value)).collect(),
            snapshot,
        }
    }

    pub fn participant(document: &str) -> Self {
        Predicate::IsParticipant {
            document: document.into(),
            fields: Self::default_participant_fields(),
        }
    }

    fn default_claim_value() -> Value {
        Value::Bool(true)
    }

    fn default_participant_fields() -> Vec<FieldPath> {
        vec!["riderId".into(), "driverId".into()]
    }

    /// Path parameters this predicate needs from the matched pattern.
    pub fn referenced_params(&self) -> Vec<&str> {
        match self {
            Predicate::All { conditions } | Predicate::Any { conditions } => conditions
                .iter()
                .flat_map(Predicate::referenced_params)
                .collect(),
            Predicate::Not { condition } => condition.referenced_params(),
            Predicate::PrincipalMatchesParam { param } => vec![param.as_str()],
            Predicate::IsParticipant { document, .. } => document.params().collect(),
            _ => Vec::new(),
        }
    }

    /// Evaluates the tree. Denials come back as [`Verdict::Fail`]; only
    /// resolver infrastructure faults are errors.
    pub fn evaluate<'a>(&'a self, scope: &'a Scope<'a>) -> BoxFuture<'a, Result<Verdict, RuleError>> {
        async move {
            let ctx = scope.ctx;
            let verdict = match self {
                Predicate::Allow => Verdict::Pass,
                Predicate::Deny => Verdict::from_bool(false, self),
                Predicate::All { conditions } => {
                    for condition in conditions {
                        if let Verdict::Fail(failure) = condition.evaluate(scope).await? {
                            return Ok(Verdict::Fail(failure));
                        }
                    }
                    Verdict::Pass
                }
                Predicate::Any { conditions } => {
                    let mut first_failure = None;
                    for condition in conditions {
                        match condition.evaluate(scope).await? {
                            Verdict::Pass => return Ok(Verdict::Pass),
                            Verdict::Fail(failure) => {
                                first_failure.get_or_insert(failure);
                            }
                        }
                    }
                    Verdict::Fail(
                        first_failure.unwrap_or_else(|| Failure::Predicate(self.to_string())),
                    )
                }
                Predicate::Not { condition } => {
                    let inner = condition.evaluate(scope).await?;
                    Verdict::from_bool(!inner.is_pass(), self)
                }
                Predicate::IsAuthenticated => Verdict::from_bool(library::is_authenticated(ctx), self),
                Predicate::IsOwner { field, snapshot } => {
                    Verdict::from_bool(library::is_owner(ctx, field, *snapshot), self)
                }
                Predicate::PrincipalMatchesParam { param } => {
                    Verdict::from_bool(library::principal_matches_param(scope, param), self)
                }
                Predicate::HasClaim { claim, value } => {
                    Verdict::from_bool(library::has_claim(ctx, claim, value), self)
                }
                Predicate::FieldsUnchanged { fields } => {
                    Verdict::from_bool(library::fields_unchanged(ctx, fields), self)
                }
                Predicate::OnlyFieldsChanged { fields } => {
                    Verdict::from_bool(library::only_fields_changed(ctx, fields), self)
                }
                Predicate::HasRequiredFields { fields } => {
                    match library::has_required_fields(ctx, fields) {
                        Ok(()) => Verdict::Pass,
                        Err(violation) => Verdict::Fail(Failure::Validation {
                            field: violation.field,
                            problem: violation.problem,
                        }),
                    }
                }
                Predicate::ValueInSet {
                    field,
                    values,
                    snapshot,
                } => {
                    let document = ctx.snapshot(*snapshot);
                    Verdict::from_bool(library::value_in_set(document, field, values), self)
                }
                Predicate::IsParticipant { document, fields } => {
                    let member = library::is_participant(scope, document, fields).await?;
                    Verdict::from_bool(member, self)
                }
            };
            Ok(verdict)
        }
        .boxed()
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Allow => write!(f, "allow"),
            Predicate::Deny => write!(f, "deny"),
            Predicate::All { conditions } => write!(f, "all({})", join(conditions)),
            Predicate::Any { conditions } => write!(f, "any({})", join(conditions)),
            Predicate::Not { condition } => write!(f, "not({condition})"),
            Predicate::IsAuthenticated => write!(f, "is_authenticated"),
            Predicate::IsOwner {
                field,
                snapshot: None,
            } => write!(f, "is_owner({field})"),
            Predicate::IsOwner {
                field,
                snapshot: Some(Snapshot::Existing),
            } => write!(f, "is_owner(existing.{field})"),
            Predicate::IsOwner {
                field,
                snapshot: Some(Snapshot::Proposed),
            } => write!(f, "is_owner(proposed.{field})"),
            Predicate::PrincipalMatchesParam { param } => write!(f, "principal_matches({param})"),
            Predicate::HasClaim { claim, value } => write!(f, "has_claim({claim}={value})"),
            Predicate::FieldsUnchanged { fields } => write!(f, "fields_unchanged({})", join(fields)),
            Predicate::OnlyFieldsChanged { fields } => {
                write!(f, "only_fields_changed({})", join(fields))
            }
            Predicate::HasRequiredFields { fields } => {
                let names: Vec<&str> = fields.iter().map(|c| c.field.as_str()).collect();
                write!(f, "has_required_fields({})", join(&names))
            }
            Predicate::ValueInSet { field, values, .. } => {
                write!(f, "value_in_set({field}, [{}])", join(values))
            }
            Predicate::IsParticipant { document, .. } => write!(f, "is_participant({document})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextBuilder, EvaluationContext, RawRequest};
    use crate::document::{Document, Fields};
    use crate::operation::OperationKind;
    use crate::path::{DocumentPath, PathParams};
    use crate::principal::Principal;
    use crate::resolver::{DocumentResolver, ResolverError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentResolver for CountingResolver {
        async fn resolve(&self, path: &DocumentPath) -> Result<Option<Document>, ResolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fields = json!({ "riderId": "user1" }).as_object().cloned().unwrap_or_default();
            Ok(Some(Document::new(path.clone(), fields)))
        }
    }

    fn read_ctx(resolver: Arc<CountingResolver>, principal: Principal) -> EvaluationContext {
        ContextBuilder::new(resolver)
            .build(RawRequest::new(
                OperationKind::Read,
                "rides/r1/messages/m1",
                principal,
            ))
            .unwrap()
    }

    fn params() -> PathParams {
        let mut params = PathParams::new();
        params.insert("rideId".into(), "r1".into());
        params
    }

    #[tokio::test]
    async fn conjunction_short_circuits_before_fetching() {
        let resolver = Arc::new(CountingResolver::default());
        let ctx = read_ctx(resolver.clone(), Principal::anonymous());
        let params = params();
        let scope = Scope::new(&ctx, &params);

        let predicate = Predicate::all([Predicate::IsAuthenticated, Predicate::participant("rides/{rideId}")]);
        let verdict = predicate.evaluate(&scope).await.unwrap();

        assert_eq!(verdict, Verdict::Fail(Failure::Predicate("is_authenticated".into())));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disjunction_stops_at_first_success() {
        let resolver = Arc::new(CountingResolver::default());
        let ctx = read_ctx(resolver.clone(), Principal::authenticated("user1"));
        let params = params();
        let scope = Scope::new(&ctx, &params);

        let predicate = Predicate::any([
            Predicate::participant("rides/{rideId}"),
            Predicate::participant("rides/{rideId}"),
        ]);
        assert!(predicate.evaluate(&scope).await.unwrap().is_pass());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_failures_carry_the_field() {
        let ctx = ContextBuilder::new(Arc::new(CountingResolver::default()))
            .build(
                RawRequest::new(OperationKind::Create, "rides/r1", Principal::authenticated("user1"))
                    .payload(Fields::new()),
            )
            .unwrap();
        let params = PathParams::new();
        let scope = Scope::new(&ctx, &params);

        let predicate = Predicate::required([crate::constraint::FieldConstraint::text("pickupAddress")]);
        let verdict = predicate.evaluate(&scope).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Fail(Failure::Validation {
                field: "pickupAddress".into(),
                problem: "missing".into(),
            })
        );
    }

    #[test]
    fn collects_referenced_params() {
        let predicate = Predicate::all([
            Predicate::principal_matches("userId"),
            Predicate::negate(Predicate::participant("rides/{rideId}")),
        ]);
        assert_eq!(predicate.referenced_params(), vec!["userId", "rideId"]);
    }

    #[test]
    fn parses_tagged_yaml() {
        let predicate: Predicate = serde_yaml::from_str(
            "type: all\nconditions:\n  - type: is_authenticated\n  - type: is_participant\n    document: rides/{rideId}\n",
        )
        .unwrap();
        assert_eq!(
            predicate,
            Predicate::all([Predicate::IsAuthenticated, Predicate::participant("rides/{rideId}")])
        );
    }
}
