use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{resolve_server_timestamps, Document, FieldValue, Fields};
use crate::error::RuleError;
use crate::operation::{Operation, OperationKind};
use crate::path::{DocumentPath, PathParams};
use crate::principal::Principal;
use crate::resolver::DocumentResolver;

/// Which snapshot of the target a check reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Snapshot {
    Existing,
    #[default]
    Proposed,
}

/// How an update payload combines with the existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Payload fields are layered over the existing document.
    #[default]
    Merge,
    /// Payload replaces the existing document wholesale.
    Replace,
}

/// Request as received from the host before any normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
    pub path: String,
    pub operation: OperationKind,
    #[serde(default)]
    pub principal: Principal,
    /// Stored state of the target, if it exists.
    #[serde(default)]
    pub existing: Option<Fields>,
    /// Fields sent by the client for create/update.
    #[serde(default)]
    pub payload: Option<Fields>,
    #[serde(default)]
    pub mode: WriteMode,
}

impl RawRequest {
    pub fn new(operation: OperationKind, path: impl Into<String>, principal: Principal) -> Self {
        Self {
            path: path.into(),
            operation,
            principal,
            existing: None,
            payload: None,
            mode: WriteMode::default(),
        }
    }

    pub fn existing(mut self, fields: Fields) -> Self {
        self.existing = Some(fields);
        self
    }

    pub fn payload(mut self, fields: Fields) -> Self {
        self.payload = Some(fields);
        self
    }

    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// A create over a stored document is checked as a replacing update.
    pub fn upsert(mut self) -> Self {
        if self.operation == OperationKind::Create && self.existing.is_some() {
            self.operation = OperationKind::Update;
            self.mode = WriteMode::Replace;
        }
        self
    }
}

/// Read-only aggregate handed to predicates.
#[derive(Clone)]
pub struct EvaluationContext {
    principal: Principal,
    operation: Operation,
    existing: Option<Document>,
    proposed: Option<Document>,
    request_time: DateTime<Utc>,
    resolver: Arc<dyn DocumentResolver>,
}

impl EvaluationContext {
    /// Context from already-normalised snapshots.
    pub fn new(
        principal: Principal,
        operation: Operation,
        existing: Option<Document>,
        proposed: Option<Document>,
        resolver: Arc<dyn DocumentResolver>,
    ) -> Self {
        Self {
            principal,
            operation,
            existing,
            proposed,
            request_time: Utc::now(),
            resolver,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind
    }

    pub fn target(&self) -> &DocumentPath {
        &self.operation.target
    }

    pub fn existing(&self) -> Option<&Document> {
        self.existing.as_ref()
    }

    pub fn proposed(&self) -> Option<&Document> {
        self.proposed.as_ref()
    }

    pub fn request_time(&self) -> DateTime<Utc> {
        self.request_time
    }

    pub fn resolver(&self) -> &dyn DocumentResolver {
        self.resolver.as_ref()
    }

    pub fn snapshot(&self, which: Snapshot) -> Option<&Document> {
        match which {
            Snapshot::Existing => self.existing(),
            Snapshot::Proposed => self.proposed(),
        }
    }

    /// The snapshot ownership is judged against: the incoming document on
    /// create, the stored one otherwise.
    pub fn owned_snapshot(&self) -> Option<&Document> {
        match self.operation.kind {
            OperationKind::Create => self.proposed(),
            _ => self.existing(),
        }
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("principal", &self.principal)
            .field("operation", &self.operation)
            .field("existing", &self.existing)
            .field("proposed", &self.proposed)
            .field("request_time", &self.request_time)
            .finish_non_exhaustive()
    }
}

/// Context plus the parameters captured by the matched policy pattern.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub ctx: &'a EvaluationContext,
    pub params: &'a PathParams,
}

impl<'a> Scope<'a> {
    pub fn new(ctx: &'a EvaluationContext, params: &'a PathParams) -> Self {
        Self { ctx, params }
    }

    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Normalises [`RawRequest`]s into [`EvaluationContext`]s.
#[derive(Clone)]
pub struct ContextBuilder {
    resolver: Arc<dyn DocumentResolver>,
    request_time: Option<DateTime<Utc>>,
}

impl ContextBuilder {
    pub fn new(resolver: Arc<dyn DocumentResolver>) -> Self {
        Self {
            resolver,
            request_time: None,
        }
    }

    /// Pins the request time instead of reading the clock per build.
    pub fn at(mut self, request_time: DateTime<Utc>) -> Self {
        self.request_time = Some(request_time);
        self
    }

    pub fn build(&self, request: RawRequest) -> Result<EvaluationContext, RuleError> {
        let target = DocumentPath::parse(&request.path)?;
        let now = self.request_time.unwrap_or_else(Utc::now);
        let kind = request.operation;

        let payload = request.payload.map(|mut fields| {
            resolve_server_timestamps(&mut fields, now);
            fields
        });

        let proposed = match (kind, request.existing.as_ref(), payload) {
            (OperationKind::Create, Some(_), _) => {
                return Err(RuleError::InvalidRequest(format!(
                    "create targets existing document {target}"
                )));
            }
            (OperationKind::Create, None, Some(payload)) => Some(strip_deletes(payload)),
            (OperationKind::Update, None, _) => {
                return Err(RuleError::InvalidRequest(format!(
                    "update targets missing document {target}"
                )));
            }
            (OperationKind::Update, Some(existing), Some(payload)) => Some(match request.mode {
                WriteMode::Merge => merge(existing, payload),
                WriteMode::Replace => strip_deletes(payload),
            }),
            (OperationKind::Create | OperationKind::Update, _, None) => {
                return Err(RuleError::InvalidRequest(format!("{kind} requires a payload")));
            }
            (OperationKind::Read | OperationKind::Delete, _, Some(_)) => {
                return Err(RuleError::InvalidRequest(format!("{kind} does not take a payload")));
            }
            (OperationKind::Read | OperationKind::Delete, _, None) => None,
        };

        let existing = request
            .existing
            .map(|fields| Document::new(target.clone(), fields));
        let proposed = proposed.map(|fields| Document::new(target.clone(), fields));

        Ok(EvaluationContext {
            principal: request.principal,
            operation: Operation::new(kind, target),
            existing,
            proposed,
            request_time: now,
            resolver: self.resolver.clone(),
        })
    }
}

fn merge(existing: &Fields, payload: Fields) -> Fields {
    let mut merged = existing.clone();
    for (key, value) in payload {
        if FieldValue::is_delete(&value) {
            merged.remove(&key);
        } else {
            merged.insert(key, value);
        }
    }
    merged
}

fn strip_deletes(mut payload: Fields) -> Fields {
    payload.retain(|_, value| !FieldValue::is_delete(value));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::EmptyResolver;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    fn builder() -> ContextBuilder {
        ContextBuilder::new(Arc::new(EmptyResolver))
            .at(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap())
    }

    #[test]
    fn update_merges_payload_over_existing() {
        let request = RawRequest::new(
            OperationKind::Update,
            "users/user1",
            Principal::authenticated("user1"),
        )
        .existing(fields(json!({ "name": "John", "userType": "rider", "phone": "1" })))
        .payload(fields(json!({ "name": "Johnny", "phone": FieldValue::delete() })));

        let ctx = builder().build(request).expect("context");
        let proposed = ctx.proposed().expect("proposed snapshot");
        assert_eq!(proposed.fields["name"], json!("Johnny"));
        assert_eq!(proposed.fields["userType"], json!("rider"));
        assert!(!proposed.fields.contains_key("phone"));
        assert_eq!(ctx.existing().map(|d| d.fields["name"].clone()), Some(json!("John")));
    }

    #[test]
    fn create_resolves_server_timestamps() {
        let request = RawRequest::new(OperationKind::Create, "rides/r1", Principal::authenticated("u"))
            .payload(fields(json!({ "requestTime": FieldValue::server_timestamp() })));

        let ctx = builder().build(request).expect("context");
        assert_eq!(
            ctx.proposed().unwrap().fields["requestTime"],
            json!("2024-05-01T08:30:00.000Z")
        );
        assert!(ctx.existing().is_none());
        assert_eq!(ctx.owned_snapshot().map(|d| d.id()), Some("r1"));
    }

    #[test]
    fn upsert_turns_create_over_existing_into_replace() {
        let request = RawRequest::new(OperationKind::Create, "users/user1", Principal::authenticated("user1"))
            .existing(fields(json!({ "name": "John", "phone": "1" })))
            .payload(fields(json!({ "name": "Johnny" })))
            .upsert();
        assert_eq!(request.operation, OperationKind::Update);
        assert_eq!(request.mode, WriteMode::Replace);

        let ctx = builder().build(request).expect("context");
        assert!(!ctx.proposed().unwrap().fields.contains_key("phone"));

        let fresh = RawRequest::new(OperationKind::Create, "users/user2", Principal::authenticated("user2"))
            .payload(Fields::new())
            .upsert();
        assert_eq!(fresh.operation, OperationKind::Create);
    }

    #[test]
    fn rejects_inconsistent_requests() {
        let principal = Principal::authenticated("u");
        let create_over_existing = RawRequest::new(OperationKind::Create, "rides/r1", principal.clone())
            .existing(Fields::new())
            .payload(Fields::new());
        assert!(matches!(builder().build(create_over_existing), Err(RuleError::InvalidRequest(_))));

        let update_missing = RawRequest::new(OperationKind::Update, "rides/r1", principal.clone())
            .payload(Fields::new());
        assert!(matches!(builder().build(update_missing), Err(RuleError::InvalidRequest(_))));

        let odd_path = RawRequest::new(OperationKind::Read, "rides", principal);
        assert!(matches!(builder().build(odd_path), Err(RuleError::InvalidPath { .. })));
    }
}
