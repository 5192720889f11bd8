//! Reusable access predicates.
//!
//! Every function is pure over the evaluation context. The only one that
//! reaches outside it is [`is_participant`], which reads through the
//! context's resolver.

use serde_json::Value;

use crate::constraint::{FieldConstraint, Violation};
use crate::context::{EvaluationContext, Scope, Snapshot};
use crate::document::{values_equal, Document, FieldPath};
use crate::path::PathTemplate;
use crate::resolver::ResolverError;

pub fn is_authenticated(ctx: &EvaluationContext) -> bool {
    ctx.principal().authenticated
}

/// `snapshot[field] == principal.id`, defaulting to the owned snapshot.
pub fn is_owner(ctx: &EvaluationContext, field: &FieldPath, snapshot: Option<Snapshot>) -> bool {
    let Some(uid) = ctx.principal().uid() else {
        return false;
    };
    let document = match snapshot {
        Some(which) => ctx.snapshot(which),
        None => ctx.owned_snapshot(),
    };
    document
        .and_then(|document| document.get(field))
        .and_then(Value::as_str)
        .map(|owner| owner == uid)
        .unwrap_or(false)
}

/// The caller's id equals a path parameter, e.g. `users/{userId}`.
pub fn principal_matches_param(scope: &Scope<'_>, param: &str) -> bool {
    match (scope.ctx.principal().uid(), scope.param(param)) {
        (Some(uid), Some(value)) => uid == value,
        _ => false,
    }
}

pub fn has_claim(ctx: &EvaluationContext, claim: &str, expected: &Value) -> bool {
    ctx.principal()
        .claim(claim)
        .map(|actual| values_equal(actual, expected))
        .unwrap_or(false)
}

/// Each field holds the same value (or is absent) in both snapshots.
pub fn fields_unchanged(ctx: &EvaluationContext, fields: &[FieldPath]) -> bool {
    let (Some(existing), Some(proposed)) = (ctx.existing(), ctx.proposed()) else {
        return false;
    };
    fields
        .iter()
        .all(|field| match (existing.get(field), proposed.get(field)) {
            (Some(before), Some(after)) => values_equal(before, after),
            (None, None) => true,
            _ => false,
        })
}

/// Top-level keys added, removed or modified by the write.
pub fn changed_keys(ctx: &EvaluationContext) -> Vec<String> {
    let (Some(existing), Some(proposed)) = (ctx.existing(), ctx.proposed()) else {
        return ctx
            .proposed()
            .map(|doc| doc.fields.keys().cloned().collect())
            .unwrap_or_default();
    };

    let mut changed: Vec<String> = proposed
        .fields
        .iter()
        .filter(|(key, value)| {
            existing
                .fields
                .get(*key)
                .map(|before| !values_equal(before, value))
                .unwrap_or(true)
        })
        .map(|(key, _)| key.clone())
        .collect();
    changed.extend(
        existing
            .fields
            .keys()
            .filter(|key| !proposed.fields.contains_key(*key))
            .cloned(),
    );
    changed.sort();
    changed
}

/// The write touches no top-level key outside `allowed`.
pub fn only_fields_changed(ctx: &EvaluationContext, allowed: &[FieldPath]) -> bool {
    changed_keys(ctx).iter().all(|key| {
        allowed
            .iter()
            .any(|field| field.as_str().split('.').next() == Some(key.as_str()))
    })
}

/// Validates the proposed document, reporting the first violated constraint.
pub fn has_required_fields(
    ctx: &EvaluationContext,
    constraints: &[FieldConstraint],
) -> Result<(), Violation> {
    let Some(proposed) = ctx.proposed() else {
        return Err(Violation {
            field: "*".into(),
            problem: "no proposed document".into(),
        });
    };
    constraints
        .iter()
        .try_for_each(|constraint| constraint.check(&proposed.fields))
}

pub fn value_in_set(document: Option<&Document>, field: &FieldPath, set: &[Value]) -> bool {
    document
        .and_then(|doc| doc.get(field))
        .map(|value| set.iter().any(|candidate| values_equal(candidate, value)))
        .unwrap_or(false)
}

/// Resolves the related document and checks whether the caller is named in
/// one of `fields`. A missing document yields `false`; only resolver faults
/// surface as errors.
pub async fn is_participant(
    scope: &Scope<'_>,
    document: &PathTemplate,
    fields: &[FieldPath],
) -> Result<bool, ResolverError> {
    let Some(uid) = scope.ctx.principal().uid() else {
        return Ok(false);
    };
    let Some(path) = document.render(scope.params) else {
        tracing::debug!(template = %document, "participant lookup path could not be rendered");
        return Ok(false);
    };

    let Some(related) = scope.ctx.resolver().resolve(&path).await? else {
        tracing::debug!(path = %path, "participant lookup found no document");
        return Ok(false);
    };

    Ok(fields.iter().any(|field| {
        related
            .get(field)
            .and_then(Value::as_str)
            .map(|member| member == uid)
            .unwrap_or(false)
    }))
}
